//! Store credit ledger

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;
use crate::utils::validation::{validate_credit_code, validate_positive_amount};

/// Attempts made to find an unused credit code before giving up
const CODE_ATTEMPTS: usize = 16;

/// Manually issued store credit
#[derive(Debug, Clone, PartialEq)]
pub struct CreditRequest {
    pub amount: BigDecimal,
    pub issued_on: NaiveDate,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub notes: String,
}

impl CreditRequest {
    pub fn new(amount: BigDecimal, issued_on: NaiveDate) -> Self {
        Self {
            amount,
            issued_on,
            customer_id: None,
            customer_name: String::new(),
            customer_email: String::new(),
            customer_phone: String::new(),
            notes: String::new(),
        }
    }

    pub fn customer(mut self, customer_id: Option<Uuid>, name: impl Into<String>) -> Self {
        self.customer_id = customer_id;
        self.customer_name = name.into();
        self
    }

    pub fn contact(mut self, email: impl Into<String>, phone: impl Into<String>) -> Self {
        self.customer_email = email.into();
        self.customer_phone = phone.into();
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// Filter for listing store credits
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreditFilter {
    /// Matches code or customer name, case-insensitive
    pub query: Option<String>,
    /// Only active credits with a balance left
    pub active_only: bool,
    pub customer_id: Option<Uuid>,
    pub limit: Option<usize>,
}

/// Balance view of a store credit, as shown at the till
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditLookup {
    pub code: String,
    pub customer_name: String,
    pub original_amount: BigDecimal,
    pub current_amount: BigDecimal,
    pub is_valid: bool,
    pub is_expired: bool,
    pub expires_on: Option<NaiveDate>,
}

/// Ledger of store credit balances
pub struct StoreCreditLedger<S: ReturnsStorage> {
    storage: S,
}

impl<S: ReturnsStorage> StoreCreditLedger<S> {
    /// Create a new store credit ledger
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Generate a code no existing credit uses
    pub async fn generate_code(&self) -> ReturnsResult<String> {
        for _ in 0..CODE_ATTEMPTS {
            let value: u32 = rand::random();
            let code = format!("SC-{value:08X}");
            if self.storage.get_credit_by_code(&code).await?.is_none() {
                return Ok(code);
            }
            debug!(%code, "Credit code already taken");
        }
        Err(ReturnsError::Storage(
            "could not generate a unique store credit code".to_string(),
        ))
    }

    /// Issue credit by hand, outside of any return
    #[instrument(skip(self, request), fields(amount = %request.amount))]
    pub async fn issue(
        &mut self,
        request: CreditRequest,
        expires_on: Option<NaiveDate>,
    ) -> ReturnsResult<StoreCredit> {
        validate_positive_amount(&request.amount)?;

        let code = self.generate_code().await?;
        let mut credit = StoreCredit::new(code, round_money(&request.amount), request.issued_on);
        credit.customer_id = request.customer_id;
        credit.customer_name = request.customer_name.trim().to_string();
        credit.customer_email = request.customer_email.trim().to_string();
        credit.customer_phone = request.customer_phone.trim().to_string();
        credit.notes = request.notes;
        credit.expires_on = expires_on;

        self.storage.save_credit(&credit).await?;
        info!(code = %credit.code, "Issued store credit");

        Ok(credit)
    }

    /// Issue the credit a completed return pays out
    ///
    /// A return gets at most one credit. A credit withdrawn when an earlier
    /// completion of the same return was rolled back is reinstated with the
    /// return's current total instead of minting a second code.
    pub async fn issue_for_return(
        &mut self,
        ret: &Return,
        issued_on: NaiveDate,
        expires_on: Option<NaiveDate>,
    ) -> ReturnsResult<StoreCredit> {
        validate_positive_amount(&ret.total_refund)?;
        if ret.status == ReturnStatus::Completed {
            return Err(ReturnsError::Validation(format!(
                "Store credit was already issued for return {}",
                ret.number
            )));
        }

        if let Some(mut credit) = self.storage.get_credit_for_return(ret.id).await? {
            credit.original_amount = ret.total_refund.clone();
            credit.current_amount = ret.total_refund.clone();
            credit.issued_on = issued_on;
            credit.expires_on = expires_on;
            credit.is_active = true;
            credit.is_deleted = false;
            credit.updated_at = now();
            self.storage.update_credit(&credit).await?;
            info!(code = %credit.code, return_number = %ret.number, amount = %credit.original_amount, "Reinstated store credit for return");
            return Ok(credit);
        }

        let code = self.generate_code().await?;
        let mut credit = StoreCredit::new(code, ret.total_refund.clone(), issued_on);
        credit.customer_id = ret.customer_id;
        credit.customer_name = ret.customer_name.clone().unwrap_or_default();
        credit.return_id = Some(ret.id);
        credit.expires_on = expires_on;
        credit.notes = format!("Created from return {}", ret.number);

        self.storage.save_credit(&credit).await?;
        info!(code = %credit.code, return_number = %ret.number, amount = %credit.original_amount, "Issued store credit for return");

        Ok(credit)
    }

    /// Get a credit by code, returning an error if not found
    ///
    /// Codes are matched case-insensitively; malformed codes are rejected
    /// before storage is consulted.
    pub async fn get_credit(&self, code: &str) -> ReturnsResult<StoreCredit> {
        let code = code.trim().to_uppercase();
        validate_credit_code(&code)?;
        self.storage
            .get_credit_by_code(&code)
            .await?
            .filter(|credit| !credit.is_deleted)
            .ok_or(ReturnsError::StoreCreditNotFound(code))
    }

    /// Get the credit issued for a return, if any
    pub async fn credit_for_return(&self, return_id: Uuid) -> ReturnsResult<Option<StoreCredit>> {
        self.storage.get_credit_for_return(return_id).await
    }

    /// Balance view of a credit on `as_of`
    pub async fn lookup(&self, code: &str, as_of: NaiveDate) -> ReturnsResult<CreditLookup> {
        let credit = self.get_credit(code).await?;
        Ok(CreditLookup {
            is_valid: credit.is_valid(as_of),
            is_expired: credit.is_expired(as_of),
            code: credit.code,
            customer_name: credit.customer_name,
            original_amount: credit.original_amount,
            current_amount: credit.current_amount,
            expires_on: credit.expires_on,
        })
    }

    /// Spend `amount` of a credit on `as_of`
    #[instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn redeem(
        &mut self,
        code: &str,
        amount: &BigDecimal,
        as_of: NaiveDate,
    ) -> ReturnsResult<StoreCredit> {
        validate_positive_amount(amount)?;
        let mut credit = self.get_credit(code).await?;

        if !credit.is_active {
            warn!("Attempt to redeem inactive credit");
            return Err(ReturnsError::CreditUnavailable(format!(
                "{} has been deactivated",
                credit.code
            )));
        }
        if credit.is_expired(as_of) {
            warn!("Attempt to redeem expired credit");
            return Err(ReturnsError::CreditUnavailable(format!(
                "{} expired on {}",
                credit.code,
                credit
                    .expires_on
                    .map(|date| date.to_string())
                    .unwrap_or_default()
            )));
        }

        credit.deduct_credit(amount)?;
        self.storage.update_credit(&credit).await?;
        info!(balance = %credit.current_amount, "Redeemed store credit");

        Ok(credit)
    }

    /// Add `amount` to an active credit
    pub async fn top_up(&mut self, code: &str, amount: &BigDecimal) -> ReturnsResult<StoreCredit> {
        validate_positive_amount(amount)?;
        let mut credit = self.get_credit(code).await?;
        if !credit.is_active {
            return Err(ReturnsError::CreditUnavailable(format!(
                "{} has been deactivated",
                credit.code
            )));
        }

        credit.add_credit(&round_money(amount));
        self.storage.update_credit(&credit).await?;
        Ok(credit)
    }

    /// Stop a credit from being redeemed; the balance is kept for audit
    pub async fn deactivate(&mut self, code: &str) -> ReturnsResult<StoreCredit> {
        let mut credit = self.get_credit(code).await?;
        credit.is_active = false;
        credit.updated_at = now();
        self.storage.update_credit(&credit).await?;
        info!(code = %credit.code, "Deactivated store credit");
        Ok(credit)
    }

    /// List credits, newest first
    pub async fn list(&self, filter: &CreditFilter) -> ReturnsResult<Vec<StoreCredit>> {
        let query = filter
            .query
            .as_ref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());
        let zero = BigDecimal::from(0);

        let mut credits: Vec<StoreCredit> = self
            .storage
            .list_credits()
            .await?
            .into_iter()
            .filter(|credit| !credit.is_deleted)
            .filter(|credit| !filter.active_only || (credit.is_active && credit.current_amount > zero))
            .filter(|credit| {
                filter
                    .customer_id
                    .is_none_or(|customer_id| credit.customer_id == Some(customer_id))
            })
            .filter(|credit| {
                query.as_ref().is_none_or(|q| {
                    credit.code.to_lowercase().contains(q)
                        || credit.customer_name.to_lowercase().contains(q)
                })
            })
            .collect();

        credits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        credits.truncate(filter.limit.unwrap_or(100));
        Ok(credits)
    }

    /// Redeemable balance a customer holds on `as_of`
    pub async fn customer_balance(
        &self,
        customer_id: Uuid,
        as_of: NaiveDate,
    ) -> ReturnsResult<BigDecimal> {
        Ok(self
            .storage
            .list_credits()
            .await?
            .iter()
            .filter(|credit| credit.customer_id == Some(customer_id) && credit.is_valid(as_of))
            .map(|credit| &credit.current_amount)
            .sum())
    }
}
