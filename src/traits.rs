//! Traits for storage abstraction and the modules the returns core talks to

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::ReturnsSettings;
use crate::types::*;

/// Storage abstraction for the returns system
///
/// This trait allows the returns core to work with any storage backend
/// (PostgreSQL, SQLite, in-memory, etc.) by implementing these methods.
/// Soft-deleted records are still returned; callers filter them.
#[async_trait]
pub trait ReturnsStorage: Send + Sync {
    /// Get the stored settings, if any were saved
    async fn get_settings(&self) -> ReturnsResult<Option<ReturnsSettings>>;

    /// Save settings
    async fn save_settings(&mut self, settings: &ReturnsSettings) -> ReturnsResult<()>;

    /// Save a return reason
    async fn save_reason(&mut self, reason: &ReturnReason) -> ReturnsResult<()>;

    /// Get a return reason by ID
    async fn get_reason(&self, reason_id: Uuid) -> ReturnsResult<Option<ReturnReason>>;

    /// List all return reasons
    async fn list_reasons(&self) -> ReturnsResult<Vec<ReturnReason>>;

    /// Update an existing return reason
    async fn update_reason(&mut self, reason: &ReturnReason) -> ReturnsResult<()>;

    /// Save a new return
    async fn save_return(&mut self, ret: &Return) -> ReturnsResult<()>;

    /// Get a return by ID
    async fn get_return(&self, return_id: Uuid) -> ReturnsResult<Option<Return>>;

    /// Get a return by its number
    async fn get_return_by_number(&self, number: &str) -> ReturnsResult<Option<Return>>;

    /// List all returns
    async fn list_returns(&self) -> ReturnsResult<Vec<Return>>;

    /// Update an existing return
    async fn update_return(&mut self, ret: &Return) -> ReturnsResult<()>;

    /// Save a return item
    async fn save_item(&mut self, item: &ReturnItem) -> ReturnsResult<()>;

    /// Get a return item by ID
    async fn get_item(&self, item_id: Uuid) -> ReturnsResult<Option<ReturnItem>>;

    /// List the items of a return
    async fn list_items(&self, return_id: Uuid) -> ReturnsResult<Vec<ReturnItem>>;

    /// List every return item referencing a sale line
    async fn list_items_for_sale_item(&self, sale_item_id: Uuid)
        -> ReturnsResult<Vec<ReturnItem>>;

    /// Update an existing return item
    async fn update_item(&mut self, item: &ReturnItem) -> ReturnsResult<()>;

    /// Save a new store credit
    async fn save_credit(&mut self, credit: &StoreCredit) -> ReturnsResult<()>;

    /// Get a store credit by its code
    async fn get_credit_by_code(&self, code: &str) -> ReturnsResult<Option<StoreCredit>>;

    /// Get the store credit issued for a return
    async fn get_credit_for_return(&self, return_id: Uuid)
        -> ReturnsResult<Option<StoreCredit>>;

    /// List all store credits
    async fn list_credits(&self) -> ReturnsResult<Vec<StoreCredit>>;

    /// Update an existing store credit
    async fn update_credit(&mut self, credit: &StoreCredit) -> ReturnsResult<()>;

    /// Record a refund ledger entry
    async fn save_refund(&mut self, refund: &Refund) -> ReturnsResult<()>;

    /// List all refund ledger entries
    async fn list_refunds(&self) -> ReturnsResult<Vec<Refund>>;

    /// Remove a refund entry whose completion was rolled back
    async fn delete_refund(&mut self, refund_id: Uuid) -> ReturnsResult<()>;

    /// Record a stock movement
    async fn save_stock_movement(&mut self, movement: &StockMovement) -> ReturnsResult<()>;

    /// List stock movements booked for a return
    async fn list_stock_movements(&self, return_id: Uuid) -> ReturnsResult<Vec<StockMovement>>;

    /// Remove a stock movement whose adjustment was taken back
    async fn delete_stock_movement(&mut self, movement_id: Uuid) -> ReturnsResult<()>;
}

/// Read access to the sales module
#[async_trait]
pub trait SalesLookup: Send + Sync {
    /// Get an originating sale with its lines
    async fn get_sale(&self, sale_id: Uuid) -> ReturnsResult<Option<Sale>>;
}

/// Access to the inventory module
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Get product details used to snapshot return items
    async fn get_product(&self, product_id: Uuid) -> ReturnsResult<Option<Product>>;

    /// Adjust on-hand stock by `delta` units, booked against `reference`
    async fn adjust_stock(&self, product_id: Uuid, delta: i64, reference: &str)
        -> ReturnsResult<()>;
}

/// Extension points around refund processing
///
/// All methods have no-op defaults.
pub trait ReturnHooks: Send + Sync {
    /// Called before a refund is processed; an error aborts completion
    fn before_refund(&self, _ret: &Return, _items: &[ReturnItem]) -> ReturnsResult<()> {
        Ok(())
    }

    /// Called after a refund completed
    fn after_refund(&self, _ret: &Return, _refund: &Refund) {}

    /// Receives every event emitted by the returns core
    fn on_event(&self, _event: &ReturnEvent) {}
}

/// Hooks that do nothing
pub struct NoopHooks;

impl ReturnHooks for NoopHooks {}

/// Trait for implementing custom return reason validation rules
pub trait ReasonValidator: Send + Sync {
    /// Validate a reason before saving
    fn validate_reason(&self, reason: &ReturnReason) -> ReturnsResult<()>;
}

/// Trait for implementing custom return validation rules
pub trait ReturnValidator: Send + Sync {
    /// Validate a return header before saving
    fn validate_return(&self, ret: &Return) -> ReturnsResult<()>;

    /// Validate a return item before saving
    fn validate_item(&self, item: &ReturnItem) -> ReturnsResult<()>;
}

/// Default reason validator with basic rules
pub struct DefaultReasonValidator;

impl ReasonValidator for DefaultReasonValidator {
    fn validate_reason(&self, reason: &ReturnReason) -> ReturnsResult<()> {
        if reason.name.trim().is_empty() {
            return Err(ReturnsError::Validation(
                "Reason name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default return validator enforcing the item invariants
pub struct DefaultReturnValidator;

impl ReturnValidator for DefaultReturnValidator {
    fn validate_return(&self, ret: &Return) -> ReturnsResult<()> {
        if ret.number.trim().is_empty() {
            return Err(ReturnsError::Validation(
                "Return number cannot be empty".to_string(),
            ));
        }
        if ret.total_refund < bigdecimal::BigDecimal::from(0) {
            return Err(ReturnsError::Validation(
                "Total refund cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_item(&self, item: &ReturnItem) -> ReturnsResult<()> {
        let zero = bigdecimal::BigDecimal::from(0);

        if item.quantity == 0 {
            return Err(ReturnsError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }
        if item.unit_price < zero {
            return Err(ReturnsError::Validation(
                "Unit price cannot be negative".to_string(),
            ));
        }
        if item.refund_amount < zero {
            return Err(ReturnsError::Validation(
                "Refund amount cannot be negative".to_string(),
            ));
        }
        if item.refund_amount > item.line_value() {
            return Err(ReturnsError::Validation(format!(
                "Refund amount {} exceeds line value {}",
                item.refund_amount,
                item.line_value()
            )));
        }
        if item.tax_rate < zero || item.tax_rate > bigdecimal::BigDecimal::from(100) {
            return Err(ReturnsError::Validation(
                "Tax rate must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }
}
