//! Returns policy settings

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::*;

/// Longest return window accepted, roughly ten years
pub const MAX_RETURN_WINDOW_DAYS: u32 = 3650;

/// Policy settings for the returns module
///
/// Every field has a default, so a partial TOML document such as
///
/// ```toml
/// return_window_days = 14
/// allow_no_receipt = true
/// ```
///
/// is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnsSettings {
    /// Master switch for taking new returns
    pub allow_returns: bool,
    /// Number of days after the sale during which a return is accepted
    pub return_window_days: u32,
    /// Whether refunds may be paid out as store credit
    pub allow_store_credit: bool,
    /// Whether a return must reference its originating sale
    pub require_receipt: bool,
    /// Accept returns without a receipt when refunded as store credit
    pub allow_no_receipt: bool,
    /// Restore stock automatically when a return is completed
    #[serde(alias = "restock_automatically")]
    pub auto_restore_stock: bool,
    /// Days until issued store credit expires, 0 for never
    pub store_credit_expiry_days: u32,
}

impl Default for ReturnsSettings {
    fn default() -> Self {
        Self {
            allow_returns: true,
            return_window_days: 30,
            allow_store_credit: true,
            require_receipt: true,
            allow_no_receipt: false,
            auto_restore_stock: true,
            store_credit_expiry_days: 365,
        }
    }
}

impl ReturnsSettings {
    /// Names accepted by [`ReturnsSettings::apply`]
    pub const SETTING_NAMES: [&'static str; 7] = [
        "allow_returns",
        "return_window_days",
        "allow_store_credit",
        "require_receipt",
        "allow_no_receipt",
        "auto_restore_stock",
        "store_credit_expiry_days",
    ];

    /// Parse settings from a TOML document
    pub fn from_toml_str(source: &str) -> ReturnsResult<Self> {
        let settings: Self =
            toml::from_str(source).map_err(|e| ReturnsError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ReturnsResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ReturnsError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Serialize settings back to TOML
    pub fn to_toml_string(&self) -> ReturnsResult<String> {
        toml::to_string(self).map_err(|e| ReturnsError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ReturnsResult<()> {
        if self.return_window_days > MAX_RETURN_WINDOW_DAYS {
            return Err(ReturnsError::Config(format!(
                "return_window_days cannot exceed {MAX_RETURN_WINDOW_DAYS}"
            )));
        }
        Ok(())
    }

    /// Update a single setting by name from its textual value
    ///
    /// Boolean settings take `"true"` or `"false"`, day counts take a
    /// non-negative integer.
    pub fn apply(&mut self, name: &str, value: &str) -> ReturnsResult<()> {
        let value = value.trim();
        match name {
            "allow_returns" => self.allow_returns = parse_flag(name, value)?,
            "allow_store_credit" => self.allow_store_credit = parse_flag(name, value)?,
            "require_receipt" => self.require_receipt = parse_flag(name, value)?,
            "allow_no_receipt" => self.allow_no_receipt = parse_flag(name, value)?,
            "auto_restore_stock" | "restock_automatically" => {
                self.auto_restore_stock = parse_flag(name, value)?
            }
            "return_window_days" => {
                let days = parse_days(name, value)?;
                if days > MAX_RETURN_WINDOW_DAYS {
                    return Err(ReturnsError::Config(format!(
                        "return_window_days cannot exceed {MAX_RETURN_WINDOW_DAYS}"
                    )));
                }
                self.return_window_days = days;
            }
            "store_credit_expiry_days" => self.store_credit_expiry_days = parse_days(name, value)?,
            _ => {
                return Err(ReturnsError::Config(format!("unknown setting: {name}")));
            }
        }
        Ok(())
    }

    /// Whether a return without an originating sale is acceptable for `method`
    pub fn accepts_without_receipt(&self, method: RefundMethod) -> bool {
        if method == RefundMethod::Original {
            return false;
        }
        if !self.require_receipt {
            return true;
        }
        self.allow_no_receipt && method == RefundMethod::StoreCredit
    }

    /// Expiry day for store credit issued on `issued_on`
    pub fn credit_expiry(&self, issued_on: chrono::NaiveDate) -> Option<chrono::NaiveDate> {
        if self.store_credit_expiry_days == 0 {
            return None;
        }
        issued_on.checked_add_days(chrono::Days::new(u64::from(self.store_credit_expiry_days)))
    }
}

fn parse_flag(name: &str, value: &str) -> ReturnsResult<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ReturnsError::Config(format!(
            "{name} expects true or false, got '{value}'"
        ))),
    }
}

fn parse_days(name: &str, value: &str) -> ReturnsResult<u32> {
    value
        .parse::<u32>()
        .map_err(|_| ReturnsError::Config(format!("{name} expects a number of days, got '{value}'")))
}
