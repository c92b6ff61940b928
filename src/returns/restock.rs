//! Restoring returned quantities to inventory

use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;

/// Books returned items back into inventory
pub struct StockRestorer<S: ReturnsStorage> {
    storage: S,
    inventory: Arc<dyn Inventory>,
}

impl<S: ReturnsStorage> StockRestorer<S> {
    /// Create a new stock restorer
    pub fn new(storage: S, inventory: Arc<dyn Inventory>) -> Self {
        Self { storage, inventory }
    }

    /// Items that should go back on the shelf and have not been restocked yet
    pub fn plan<'a>(
        items: &'a [ReturnItem],
        reason: Option<&ReturnReason>,
        already_restocked: &[StockMovement],
    ) -> Vec<&'a ReturnItem> {
        if reason.is_some_and(|reason| !reason.restocks_inventory) {
            return Vec::new();
        }
        items
            .iter()
            .filter(|item| !item.is_deleted && item.restock && item.product_id.is_some())
            .filter(|item| {
                !already_restocked
                    .iter()
                    .any(|movement| movement.return_item_id == item.id)
            })
            .collect()
    }

    /// Restock the eligible items of a return and record the movements
    #[instrument(skip(self, ret, items), fields(return_number = %ret.number))]
    pub async fn restore(
        &mut self,
        ret: &Return,
        items: &[ReturnItem],
    ) -> ReturnsResult<Vec<StockMovement>> {
        let applied = self.apply(ret, items).await?;
        if let Err(e) = self.record(&applied).await {
            self.revert(&applied).await;
            return Err(e);
        }
        Ok(applied)
    }

    /// Adjust inventory for the eligible items without recording anything
    ///
    /// All adjustments of one pass succeed together: when the inventory
    /// rejects one, the adjustments already applied are reversed. Recorded
    /// movements only count as restocked once the return is completed.
    pub async fn apply(
        &self,
        ret: &Return,
        items: &[ReturnItem],
    ) -> ReturnsResult<Vec<StockMovement>> {
        let reason = match ret.reason_id {
            Some(reason_id) => self.storage.get_reason(reason_id).await?,
            None => None,
        };
        let already = if ret.status == ReturnStatus::Completed {
            self.storage.list_stock_movements(ret.id).await?
        } else {
            Vec::new()
        };
        let planned = Self::plan(items, reason.as_ref(), &already);

        let mut applied: Vec<StockMovement> = Vec::with_capacity(planned.len());
        for item in planned {
            let Some(product_id) = item.product_id else {
                continue;
            };
            let movement = StockMovement {
                id: Uuid::new_v4(),
                return_id: ret.id,
                return_item_id: item.id,
                product_id,
                quantity: item.quantity,
                reference: ret.number.clone(),
                recorded_at: now(),
            };

            if let Err(e) = self
                .inventory
                .adjust_stock(product_id, i64::from(item.quantity), &ret.number)
                .await
            {
                warn!(error = %e, %product_id, "Restock failed, reverting this pass");
                self.revert(&applied).await;
                return Err(e);
            }
            applied.push(movement);
        }
        Ok(applied)
    }

    /// Persist movements whose adjustments were applied
    ///
    /// Either every movement is stored or, on failure, none of them stays.
    pub async fn record(&mut self, movements: &[StockMovement]) -> ReturnsResult<()> {
        for (saved, movement) in movements.iter().enumerate() {
            if let Err(e) = self.storage.save_stock_movement(movement).await {
                warn!(error = %e, "Could not record stock movement");
                self.forget(&movements[..saved]).await;
                return Err(e);
            }
        }
        if !movements.is_empty() {
            info!(movements = movements.len(), "Restored returned stock");
        }
        Ok(())
    }

    /// Delete recorded movements whose adjustments are being taken back
    pub async fn forget(&mut self, movements: &[StockMovement]) {
        for movement in movements {
            if let Err(e) = self.storage.delete_stock_movement(movement.id).await {
                error!(error = %e, movement = %movement.id, "Could not delete stock movement");
            }
        }
    }

    /// Take back adjustments made for `movements`
    ///
    /// Failures are logged; there is nothing further to compensate with.
    pub async fn revert(&self, movements: &[StockMovement]) {
        for movement in movements.iter().rev() {
            if let Err(e) = self
                .inventory
                .adjust_stock(
                    movement.product_id,
                    -i64::from(movement.quantity),
                    &movement.reference,
                )
                .await
            {
                error!(
                    error = %e,
                    product_id = %movement.product_id,
                    quantity = movement.quantity,
                    "Could not revert stock adjustment"
                );
            }
        }
    }

    /// Stock movements recorded for a return
    pub async fn movements(&self, return_id: Uuid) -> ReturnsResult<Vec<StockMovement>> {
        self.storage.list_stock_movements(return_id).await
    }
}
