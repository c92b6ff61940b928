//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::config::ReturnsSettings;
use crate::traits::*;
use crate::types::*;

type Table<T> = Arc<RwLock<HashMap<Uuid, T>>>;

/// In-memory storage implementation for testing and development
///
/// Clones share the same underlying tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    settings: Arc<RwLock<Option<ReturnsSettings>>>,
    reasons: Table<ReturnReason>,
    returns: Table<Return>,
    items: Table<ReturnItem>,
    credits: Table<StoreCredit>,
    refunds: Table<Refund>,
    movements: Table<StockMovement>,
    failures: Arc<RwLock<Vec<String>>>,
}

fn read<T>(lock: &RwLock<T>) -> ReturnsResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| ReturnsError::Storage("storage lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> ReturnsResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| ReturnsError::Storage("storage lock poisoned".to_string()))
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> ReturnsResult<()> {
        *write(&self.settings)? = None;
        write(&self.reasons)?.clear();
        write(&self.returns)?.clear();
        write(&self.items)?.clear();
        write(&self.credits)?.clear();
        write(&self.refunds)?.clear();
        write(&self.movements)?.clear();
        write(&self.failures)?.clear();
        Ok(())
    }

    /// Make the next call of the named write operation fail
    ///
    /// Supported names are `update_return`, `save_credit`, `update_credit`,
    /// `save_refund` and `save_stock_movement`.
    pub fn fail_next(&self, operation: &str) -> ReturnsResult<()> {
        write(&self.failures)?.push(operation.to_string());
        Ok(())
    }

    fn check_failure(&self, operation: &str) -> ReturnsResult<()> {
        let mut failures = write(&self.failures)?;
        if let Some(index) = failures.iter().position(|name| name == operation) {
            failures.remove(index);
            return Err(ReturnsError::Storage(format!("{operation} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl ReturnsStorage for MemoryStorage {
    async fn get_settings(&self) -> ReturnsResult<Option<ReturnsSettings>> {
        Ok(read(&self.settings)?.clone())
    }

    async fn save_settings(&mut self, settings: &ReturnsSettings) -> ReturnsResult<()> {
        *write(&self.settings)? = Some(settings.clone());
        Ok(())
    }

    async fn save_reason(&mut self, reason: &ReturnReason) -> ReturnsResult<()> {
        write(&self.reasons)?.insert(reason.id, reason.clone());
        Ok(())
    }

    async fn get_reason(&self, reason_id: Uuid) -> ReturnsResult<Option<ReturnReason>> {
        Ok(read(&self.reasons)?.get(&reason_id).cloned())
    }

    async fn list_reasons(&self) -> ReturnsResult<Vec<ReturnReason>> {
        Ok(read(&self.reasons)?.values().cloned().collect())
    }

    async fn update_reason(&mut self, reason: &ReturnReason) -> ReturnsResult<()> {
        let mut reasons = write(&self.reasons)?;
        if !reasons.contains_key(&reason.id) {
            return Err(ReturnsError::ReasonNotFound(reason.id.to_string()));
        }
        reasons.insert(reason.id, reason.clone());
        Ok(())
    }

    async fn save_return(&mut self, ret: &Return) -> ReturnsResult<()> {
        let mut returns = write(&self.returns)?;
        if returns
            .values()
            .any(|other| other.id != ret.id && other.number == ret.number)
        {
            return Err(ReturnsError::Storage(format!(
                "duplicate return number {}",
                ret.number
            )));
        }
        returns.insert(ret.id, ret.clone());
        Ok(())
    }

    async fn get_return(&self, return_id: Uuid) -> ReturnsResult<Option<Return>> {
        Ok(read(&self.returns)?.get(&return_id).cloned())
    }

    async fn get_return_by_number(&self, number: &str) -> ReturnsResult<Option<Return>> {
        Ok(read(&self.returns)?
            .values()
            .find(|ret| ret.number == number)
            .cloned())
    }

    async fn list_returns(&self) -> ReturnsResult<Vec<Return>> {
        Ok(read(&self.returns)?.values().cloned().collect())
    }

    async fn update_return(&mut self, ret: &Return) -> ReturnsResult<()> {
        self.check_failure("update_return")?;
        let mut returns = write(&self.returns)?;
        if !returns.contains_key(&ret.id) {
            return Err(ReturnsError::ReturnNotFound(ret.id.to_string()));
        }
        returns.insert(ret.id, ret.clone());
        Ok(())
    }

    async fn save_item(&mut self, item: &ReturnItem) -> ReturnsResult<()> {
        write(&self.items)?.insert(item.id, item.clone());
        Ok(())
    }

    async fn get_item(&self, item_id: Uuid) -> ReturnsResult<Option<ReturnItem>> {
        Ok(read(&self.items)?.get(&item_id).cloned())
    }

    async fn list_items(&self, return_id: Uuid) -> ReturnsResult<Vec<ReturnItem>> {
        let mut items: Vec<ReturnItem> = read(&self.items)?
            .values()
            .filter(|item| item.return_id == return_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.created_at);
        Ok(items)
    }

    async fn list_items_for_sale_item(
        &self,
        sale_item_id: Uuid,
    ) -> ReturnsResult<Vec<ReturnItem>> {
        Ok(read(&self.items)?
            .values()
            .filter(|item| item.sale_item_id == Some(sale_item_id))
            .cloned()
            .collect())
    }

    async fn update_item(&mut self, item: &ReturnItem) -> ReturnsResult<()> {
        let mut items = write(&self.items)?;
        if !items.contains_key(&item.id) {
            return Err(ReturnsError::ItemNotFound(item.id.to_string()));
        }
        items.insert(item.id, item.clone());
        Ok(())
    }

    async fn save_credit(&mut self, credit: &StoreCredit) -> ReturnsResult<()> {
        self.check_failure("save_credit")?;
        let mut credits = write(&self.credits)?;
        if credits
            .values()
            .any(|other| other.id != credit.id && other.code == credit.code)
        {
            return Err(ReturnsError::Storage(format!(
                "duplicate store credit code {}",
                credit.code
            )));
        }
        credits.insert(credit.id, credit.clone());
        Ok(())
    }

    async fn get_credit_by_code(&self, code: &str) -> ReturnsResult<Option<StoreCredit>> {
        Ok(read(&self.credits)?
            .values()
            .find(|credit| credit.code == code)
            .cloned())
    }

    async fn get_credit_for_return(
        &self,
        return_id: Uuid,
    ) -> ReturnsResult<Option<StoreCredit>> {
        Ok(read(&self.credits)?
            .values()
            .find(|credit| credit.return_id == Some(return_id))
            .cloned())
    }

    async fn list_credits(&self) -> ReturnsResult<Vec<StoreCredit>> {
        Ok(read(&self.credits)?.values().cloned().collect())
    }

    async fn update_credit(&mut self, credit: &StoreCredit) -> ReturnsResult<()> {
        self.check_failure("update_credit")?;
        let mut credits = write(&self.credits)?;
        if !credits.contains_key(&credit.id) {
            return Err(ReturnsError::StoreCreditNotFound(credit.code.clone()));
        }
        credits.insert(credit.id, credit.clone());
        Ok(())
    }

    async fn save_refund(&mut self, refund: &Refund) -> ReturnsResult<()> {
        self.check_failure("save_refund")?;
        write(&self.refunds)?.insert(refund.id, refund.clone());
        Ok(())
    }

    async fn list_refunds(&self) -> ReturnsResult<Vec<Refund>> {
        Ok(read(&self.refunds)?.values().cloned().collect())
    }

    async fn delete_refund(&mut self, refund_id: Uuid) -> ReturnsResult<()> {
        write(&self.refunds)?.remove(&refund_id);
        Ok(())
    }

    async fn save_stock_movement(&mut self, movement: &StockMovement) -> ReturnsResult<()> {
        self.check_failure("save_stock_movement")?;
        write(&self.movements)?.insert(movement.id, movement.clone());
        Ok(())
    }

    async fn list_stock_movements(&self, return_id: Uuid) -> ReturnsResult<Vec<StockMovement>> {
        Ok(read(&self.movements)?
            .values()
            .filter(|movement| movement.return_id == return_id)
            .cloned()
            .collect())
    }

    async fn delete_stock_movement(&mut self, movement_id: Uuid) -> ReturnsResult<()> {
        write(&self.movements)?.remove(&movement_id);
        Ok(())
    }
}
