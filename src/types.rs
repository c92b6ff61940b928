//! Core types and data structures for the returns system

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Number of decimal places kept on derived money values
pub const MONEY_SCALE: i64 = 2;

/// Default tax rate percentage applied to items without a sale line
pub const DEFAULT_TAX_RATE: i64 = 21;

/// Round a money amount to two decimal places, half away from zero
pub fn round_money(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(MONEY_SCALE, RoundingMode::HalfUp)
}

pub(crate) fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

/// Lifecycle status of a return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    /// Created and still editable
    #[default]
    Pending,
    /// Accepted by staff, waiting to be refunded
    Approved,
    /// Refused by staff
    Rejected,
    /// Refund processed and stock reconciled
    Completed,
    /// Withdrawn before completion
    Cancelled,
}

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Rejected, completed and cancelled returns never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Cancelled)
    }

    /// Whether the workflow allows moving from this status to `next`
    pub fn can_transition_to(&self, next: ReturnStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::Cancelled)
                | (Self::Approved, Self::Completed)
                | (Self::Approved, Self::Cancelled)
        )
    }

    /// Whether items of a return in this status still count against the sale
    pub fn holds_quantity(&self) -> bool {
        !matches!(self, Self::Rejected | Self::Cancelled)
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnStatus {
    type Err = ReturnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ReturnsError::Validation(format!(
                "invalid return status: {s}"
            ))),
        }
    }
}

/// How the customer gets their money back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefundMethod {
    /// Back to the payment method used on the original sale
    #[default]
    Original,
    /// Cash out of the drawer
    Cash,
    /// Balance on a store credit code
    StoreCredit,
}

impl RefundMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Cash => "cash",
            Self::StoreCredit => "store_credit",
        }
    }
}

impl fmt::Display for RefundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefundMethod {
    type Err = ReturnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(Self::Original),
            "cash" => Ok(Self::Cash),
            "store_credit" => Ok(Self::StoreCredit),
            _ => Err(ReturnsError::Validation(format!(
                "invalid refund method: {s}"
            ))),
        }
    }
}

/// Physical condition of a returned item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    /// New or unopened
    New,
    /// Used but in sellable condition
    #[default]
    Good,
    Damaged,
    Defective,
}

impl ItemCondition {
    /// New and good items can go back on the shelf
    pub fn is_resellable(&self) -> bool {
        matches!(self, Self::New | Self::Good)
    }
}

/// Predefined reason for a product return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnReason {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Whether returning with this reason restores stock
    pub restocks_inventory: bool,
    /// Whether the return must carry reason notes
    pub requires_note: bool,
    pub sort_order: u32,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ReturnReason {
    /// Create a new active reason that restocks inventory
    pub fn new(name: String) -> Self {
        let now = now();
        Self {
            id: Uuid::new_v4(),
            name,
            description: String::new(),
            restocks_inventory: true,
            requires_note: false,
            sort_order: 0,
            is_active: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A product return, optionally linked to the sale it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Return {
    pub id: Uuid,
    /// Human-facing number, `RET-YYYYMMDD-NNNN`
    pub number: String,
    pub sale_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    /// Snapshot of the customer name when the return was taken
    pub customer_name: Option<String>,
    /// Employee who took the return
    pub employee_id: Option<Uuid>,
    pub reason_id: Option<Uuid>,
    pub reason_notes: String,
    pub status: ReturnStatus,
    /// Day the customer brought the goods back
    pub date: NaiveDate,
    pub subtotal: BigDecimal,
    /// Tax included in the refund
    pub tax_amount: BigDecimal,
    pub total_refund: BigDecimal,
    pub refund_method: RefundMethod,
    pub notes: String,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub is_deleted: bool,
    pub deleted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Return {
    /// Create a new pending return with zero totals
    pub fn new(number: String, date: NaiveDate, refund_method: RefundMethod) -> Self {
        let now = now();
        Self {
            id: Uuid::new_v4(),
            number,
            sale_id: None,
            customer_id: None,
            customer_name: None,
            employee_id: None,
            reason_id: None,
            reason_notes: String::new(),
            status: ReturnStatus::Pending,
            date,
            subtotal: BigDecimal::from(0),
            tax_amount: BigDecimal::from(0),
            total_refund: BigDecimal::from(0),
            refund_method,
            notes: String::new(),
            approved_by: None,
            approved_at: None,
            completed_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting transitions the workflow does not allow
    pub fn transition(&mut self, next: ReturnStatus) -> ReturnsResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ReturnsError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now();
        Ok(())
    }

    /// Error unless the return is still pending and editable
    pub fn ensure_pending(&self) -> ReturnsResult<()> {
        if self.status != ReturnStatus::Pending {
            return Err(ReturnsError::Validation(format!(
                "Return {} is {} and can no longer be edited",
                self.number, self.status
            )));
        }
        Ok(())
    }
}

/// Individual line within a return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub id: Uuid,
    pub return_id: Uuid,
    pub sale_item_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    /// Snapshot of the product name at time of return
    pub product_name: String,
    pub product_sku: String,
    pub quantity: u32,
    pub unit_price: BigDecimal,
    /// Tax rate percentage included in the price (e.g. 21 for 21%)
    pub tax_rate: BigDecimal,
    pub refund_amount: BigDecimal,
    pub condition: ItemCondition,
    /// Return the item to inventory stock
    pub restock: bool,
    pub notes: String,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ReturnItem {
    /// Full value of the line before any adjustment
    pub fn line_value(&self) -> BigDecimal {
        &self.unit_price * BigDecimal::from(self.quantity)
    }

    /// Tax contained in the refund amount, rounded to cents
    pub fn included_tax(&self) -> BigDecimal {
        included_tax(&self.refund_amount, &self.tax_rate)
    }
}

/// Tax portion of a tax-inclusive `gross` amount at `rate` percent
pub fn included_tax(gross: &BigDecimal, rate: &BigDecimal) -> BigDecimal {
    if *rate <= BigDecimal::from(0) {
        return BigDecimal::from(0);
    }
    let divisor = BigDecimal::from(100) + rate;
    round_money(&(gross * rate / divisor))
}

/// Store credit issued via a return or manually
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreCredit {
    pub id: Uuid,
    /// Redeemable code, `SC-` followed by 8 uppercase hex digits
    pub code: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub original_amount: BigDecimal,
    pub current_amount: BigDecimal,
    /// Return this credit was issued for, if any
    pub return_id: Option<Uuid>,
    pub issued_on: NaiveDate,
    pub expires_on: Option<NaiveDate>,
    pub is_active: bool,
    pub notes: String,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl StoreCredit {
    /// Create a new active credit with its full amount available
    pub fn new(code: String, amount: BigDecimal, issued_on: NaiveDate) -> Self {
        let now = now();
        Self {
            id: Uuid::new_v4(),
            code,
            customer_id: None,
            customer_name: String::new(),
            customer_email: String::new(),
            customer_phone: String::new(),
            original_amount: amount.clone(),
            current_amount: amount,
            return_id: None,
            issued_on,
            expires_on: None,
            is_active: true,
            notes: String::new(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_credit(&mut self, amount: &BigDecimal) {
        self.current_amount += amount;
        self.updated_at = now();
    }

    /// Take `amount` off the balance
    pub fn deduct_credit(&mut self, amount: &BigDecimal) -> ReturnsResult<()> {
        if *amount > self.current_amount {
            return Err(ReturnsError::InsufficientCredit {
                available: self.current_amount.clone(),
                requested: amount.clone(),
            });
        }
        self.current_amount -= amount;
        self.updated_at = now();
        Ok(())
    }

    /// A credit expires at the end of its expiry day
    pub fn is_expired(&self, as_of: NaiveDate) -> bool {
        self.expires_on.is_some_and(|expires| as_of > expires)
    }

    pub fn is_valid(&self, as_of: NaiveDate) -> bool {
        self.is_active
            && !self.is_deleted
            && !self.is_expired(as_of)
            && self.current_amount > BigDecimal::from(0)
    }
}

/// Ledger entry written when a return is refunded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub return_id: Uuid,
    pub return_number: String,
    pub sale_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub method: RefundMethod,
    pub amount: BigDecimal,
    pub tax_amount: BigDecimal,
    /// Code of the credit issued when the method is store credit
    pub store_credit_code: Option<String>,
    pub recorded_at: NaiveDateTime,
}

/// Quantity put back into inventory for one return item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub return_id: Uuid,
    pub return_item_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    /// Return number the movement is booked against
    pub reference: String,
    pub recorded_at: NaiveDateTime,
}

/// Originating sale as seen by the returns module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub number: String,
    pub date: NaiveDate,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub total: BigDecimal,
    pub items: Vec<SaleItem>,
}

impl Sale {
    pub fn item(&self, sale_item_id: Uuid) -> Option<&SaleItem> {
        self.items.iter().find(|item| item.id == sale_item_id)
    }
}

/// Line of an originating sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub product_sku: String,
    pub quantity: u32,
    pub unit_price: BigDecimal,
    pub tax_rate: BigDecimal,
}

/// Product information provided by the inventory module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
}

/// Notifications emitted while processing returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReturnEvent {
    /// A sale was refunded, partially or in full
    SaleRefunded {
        sale_id: Uuid,
        return_id: Uuid,
        amount: BigDecimal,
        partial: bool,
    },
    /// Returned items were restocked
    StockChanged {
        product_id: Uuid,
        quantity: u32,
        return_id: Uuid,
    },
}

/// Errors that can occur while processing returns
#[derive(Debug, thiserror::Error)]
pub enum ReturnsError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Return policy violation: {0}")]
    Policy(String),
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: ReturnStatus, to: ReturnStatus },
    #[error("Return not found: {0}")]
    ReturnNotFound(String),
    #[error("Return item not found: {0}")]
    ItemNotFound(String),
    #[error("Return reason not found: {0}")]
    ReasonNotFound(String),
    #[error("Sale not found: {0}")]
    SaleNotFound(String),
    #[error("Sale item not found: {0}")]
    SaleItemNotFound(String),
    #[error("Store credit not found: {0}")]
    StoreCreditNotFound(String),
    #[error("Insufficient store credit: available {available}, requested {requested}")]
    InsufficientCredit {
        available: BigDecimal,
        requested: BigDecimal,
    },
    #[error("Store credit unavailable: {0}")]
    CreditUnavailable(String),
    #[error("Inventory error: {0}")]
    Inventory(String),
    #[error("Hook rejected refund: {0}")]
    Hook(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for returns operations
pub type ReturnsResult<T> = Result<T, ReturnsError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn money(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[test]
    fn test_status_transitions() {
        assert!(ReturnStatus::Pending.can_transition_to(ReturnStatus::Approved));
        assert!(ReturnStatus::Approved.can_transition_to(ReturnStatus::Completed));
        assert!(!ReturnStatus::Pending.can_transition_to(ReturnStatus::Completed));
        assert!(!ReturnStatus::Completed.can_transition_to(ReturnStatus::Cancelled));
        assert!(!ReturnStatus::Rejected.can_transition_to(ReturnStatus::Approved));
        assert!(ReturnStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_return_transition_rejects_skipping_approval() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut ret = Return::new("RET-20240301-0001".to_string(), date, RefundMethod::Cash);

        let err = ret.transition(ReturnStatus::Completed).unwrap_err();
        assert!(matches!(
            err,
            ReturnsError::InvalidTransition {
                from: ReturnStatus::Pending,
                to: ReturnStatus::Completed
            }
        ));
        assert_eq!(ret.status, ReturnStatus::Pending);
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        assert_eq!("store_credit".parse::<RefundMethod>().unwrap(), RefundMethod::StoreCredit);
        assert_eq!(ReturnStatus::Approved.to_string(), "approved");
        assert!("refunded".parse::<ReturnStatus>().is_err());
    }

    #[test]
    fn test_included_tax() {
        assert_eq!(included_tax(&money("12.10"), &money("21")), money("2.10"));
        assert_eq!(included_tax(&money("10.00"), &money("0")), money("0"));
        // 9.99 * 21 / 121 = 1.7338...
        assert_eq!(included_tax(&money("9.99"), &money("21")), money("1.73"));
    }

    #[test]
    fn test_store_credit_deduction() {
        let issued = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut credit = StoreCredit::new("SC-0000ABCD".to_string(), money("50.00"), issued);

        credit.deduct_credit(&money("20.00")).unwrap();
        assert_eq!(credit.current_amount, money("30.00"));

        let err = credit.deduct_credit(&money("30.01")).unwrap_err();
        assert!(matches!(err, ReturnsError::InsufficientCredit { .. }));
        assert_eq!(credit.current_amount, money("30.00"));

        credit.add_credit(&money("5.00"));
        assert_eq!(credit.current_amount, money("35.00"));
        assert_eq!(credit.original_amount, money("50.00"));
    }

    #[test]
    fn test_store_credit_expiry() {
        let issued = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut credit = StoreCredit::new("SC-0000ABCD".to_string(), money("10"), issued);
        credit.expires_on = NaiveDate::from_ymd_opt(2024, 12, 31);

        assert!(!credit.is_expired(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()));
        assert!(credit.is_expired(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
        assert!(credit.is_valid(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));

        credit.deduct_credit(&money("10")).unwrap();
        assert!(!credit.is_valid(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));
    }
}
