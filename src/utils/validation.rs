//! Validation utilities

use crate::traits::*;
use crate::types::*;
use bigdecimal::BigDecimal;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> ReturnsResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(ReturnsError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an amount has no more than two decimal places
pub fn validate_money_scale(amount: &BigDecimal) -> ReturnsResult<()> {
    if *amount != round_money(amount) {
        return Err(ReturnsError::Validation(format!(
            "Amount {amount} has more than two decimal places"
        )));
    }
    Ok(())
}

/// Validate that a reason name is valid
pub fn validate_reason_name(name: &str) -> ReturnsResult<()> {
    if name.trim().is_empty() {
        return Err(ReturnsError::Validation(
            "Reason name cannot be empty".to_string(),
        ));
    }

    if name.chars().count() > 100 {
        return Err(ReturnsError::Validation(
            "Reason name cannot exceed 100 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate free-text notes
pub fn validate_notes(field: &str, notes: &str) -> ReturnsResult<()> {
    if notes.chars().count() > 2000 {
        return Err(ReturnsError::Validation(format!(
            "{field} cannot exceed 2000 characters"
        )));
    }
    Ok(())
}

/// Validate the shape of a store credit code (`SC-` and 8 hex digits)
pub fn validate_credit_code(code: &str) -> ReturnsResult<()> {
    let valid = code
        .strip_prefix("SC-")
        .is_some_and(|rest| rest.len() == 8 && rest.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return Err(ReturnsError::Validation(format!(
            "'{code}' is not a store credit code"
        )));
    }
    Ok(())
}

/// Enhanced reason validator with detailed checks
pub struct EnhancedReasonValidator;

impl ReasonValidator for EnhancedReasonValidator {
    fn validate_reason(&self, reason: &ReturnReason) -> ReturnsResult<()> {
        validate_reason_name(&reason.name)?;
        validate_notes("Reason description", &reason.description)?;
        Ok(())
    }
}

/// Enhanced return validator with detailed checks
pub struct EnhancedReturnValidator;

impl ReturnValidator for EnhancedReturnValidator {
    fn validate_return(&self, ret: &Return) -> ReturnsResult<()> {
        DefaultReturnValidator.validate_return(ret)?;
        validate_notes("Return notes", &ret.notes)?;
        validate_notes("Reason notes", &ret.reason_notes)?;
        Ok(())
    }

    fn validate_item(&self, item: &ReturnItem) -> ReturnsResult<()> {
        DefaultReturnValidator.validate_item(item)?;
        validate_money_scale(&item.unit_price)?;
        validate_money_scale(&item.refund_amount)?;
        validate_notes("Item notes", &item.notes)?;

        if item.product_name.trim().is_empty() {
            return Err(ReturnsError::Validation(
                "Returned item needs a product name".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_money_scale() {
        assert!(validate_money_scale(&BigDecimal::from_str("10.25").unwrap()).is_ok());
        assert!(validate_money_scale(&BigDecimal::from(3)).is_ok());
        assert!(validate_money_scale(&BigDecimal::from_str("10.255").unwrap()).is_err());
    }

    #[test]
    fn test_credit_code_shape() {
        assert!(validate_credit_code("SC-0A1B2C3D").is_ok());
        assert!(validate_credit_code("SC-0A1B2C3").is_err());
        assert!(validate_credit_code("GC-0A1B2C3D").is_err());
        assert!(validate_credit_code("SC-0A1B2C3Z").is_err());
    }

    #[test]
    fn test_reason_name_length() {
        assert!(validate_reason_name("Defective").is_ok());
        assert!(validate_reason_name(&"x".repeat(101)).is_err());
    }
}
