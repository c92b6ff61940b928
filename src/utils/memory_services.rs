//! In-memory sales, inventory and hook implementations for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;

/// Sales lookup backed by a map of sales
#[derive(Debug, Clone, Default)]
pub struct MemorySales {
    sales: Arc<RwLock<HashMap<Uuid, Sale>>>,
}

impl MemorySales {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sale so returns can reference it
    pub fn insert(&self, sale: Sale) -> ReturnsResult<()> {
        self.sales
            .write()
            .map_err(|_| ReturnsError::Storage("sales lock poisoned".to_string()))?
            .insert(sale.id, sale);
        Ok(())
    }
}

#[async_trait]
impl SalesLookup for MemorySales {
    async fn get_sale(&self, sale_id: Uuid) -> ReturnsResult<Option<Sale>> {
        Ok(self
            .sales
            .read()
            .map_err(|_| ReturnsError::Storage("sales lock poisoned".to_string()))?
            .get(&sale_id)
            .cloned())
    }
}

#[derive(Debug, Default)]
struct InventoryState {
    products: HashMap<Uuid, Product>,
    on_hand: HashMap<Uuid, i64>,
    failing: Option<Uuid>,
}

/// Inventory that keeps on-hand quantities in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryInventory {
    state: Arc<RwLock<InventoryState>>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> ReturnsResult<std::sync::RwLockWriteGuard<'_, InventoryState>> {
        self.state
            .write()
            .map_err(|_| ReturnsError::Inventory("inventory lock poisoned".to_string()))
    }

    /// Register a product with an initial on-hand quantity
    pub fn add_product(&self, product: Product, on_hand: i64) -> ReturnsResult<()> {
        let mut state = self.lock()?;
        state.on_hand.insert(product.id, on_hand);
        state.products.insert(product.id, product);
        Ok(())
    }

    /// Current on-hand quantity of a product
    pub fn on_hand(&self, product_id: Uuid) -> ReturnsResult<i64> {
        Ok(self.lock()?.on_hand.get(&product_id).copied().unwrap_or(0))
    }

    /// Make every adjustment of `product_id` fail, for exercising rollbacks
    pub fn fail_adjustments_for(&self, product_id: Option<Uuid>) -> ReturnsResult<()> {
        self.lock()?.failing = product_id;
        Ok(())
    }
}

#[async_trait]
impl Inventory for MemoryInventory {
    async fn get_product(&self, product_id: Uuid) -> ReturnsResult<Option<Product>> {
        Ok(self.lock()?.products.get(&product_id).cloned())
    }

    async fn adjust_stock(
        &self,
        product_id: Uuid,
        delta: i64,
        reference: &str,
    ) -> ReturnsResult<()> {
        let mut state = self.lock()?;
        if state.failing == Some(product_id) {
            return Err(ReturnsError::Inventory(format!(
                "stock adjustment rejected for product {product_id}"
            )));
        }
        *state.on_hand.entry(product_id).or_insert(0) += delta;
        debug!(%product_id, delta, reference, "Adjusted stock");
        Ok(())
    }
}

/// Hooks that record every event, optionally vetoing refunds
#[derive(Debug, Clone, Default)]
pub struct RecordingHooks {
    events: Arc<Mutex<Vec<ReturnEvent>>>,
    refunded: Arc<Mutex<Vec<String>>>,
    veto: Option<String>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks whose `before_refund` always fails with `message`
    pub fn vetoing(message: impl Into<String>) -> Self {
        Self {
            veto: Some(message.into()),
            ..Self::default()
        }
    }

    /// Events received so far
    pub fn events(&self) -> Vec<ReturnEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Numbers of returns that went through `after_refund`
    pub fn refunded_returns(&self) -> Vec<String> {
        self.refunded
            .lock()
            .map(|numbers| numbers.clone())
            .unwrap_or_default()
    }
}

impl ReturnHooks for RecordingHooks {
    fn before_refund(&self, _ret: &Return, _items: &[ReturnItem]) -> ReturnsResult<()> {
        match &self.veto {
            Some(message) => Err(ReturnsError::Hook(message.clone())),
            None => Ok(()),
        }
    }

    fn after_refund(&self, ret: &Return, _refund: &Refund) {
        if let Ok(mut refunded) = self.refunded.lock() {
            refunded.push(ret.number.clone());
        }
    }

    fn on_event(&self, event: &ReturnEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
