//! Returns desk that orchestrates intake, refunds, restocking and store credit

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ReturnsSettings;
use crate::returns::{
    CreditFilter, CreditLookup, CreditRequest, ReasonManager, ReasonRequest, RefundEngine,
    ReturnFilter, ReturnIntake, ReturnItemRequest, ReturnRequest, StockRestorer,
    StoreCreditLedger,
};
use crate::traits::*;
use crate::types::*;

/// Everything a completed return produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub return_record: Return,
    pub refund: Refund,
    pub store_credit: Option<StoreCredit>,
    pub stock_movements: Vec<StockMovement>,
}

/// Dashboard figures for the returns desk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsSummary {
    pub total_returns: usize,
    pub pending_returns: usize,
    pub approved_returns: usize,
    pub completed_returns: usize,
    pub total_refunded: BigDecimal,
    pub recent_returns: Vec<Return>,
}

/// Refund ledger entries with their totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundReport {
    pub refunds: Vec<Refund>,
    pub refund_count: usize,
    pub total_refunded: BigDecimal,
}

/// Main returns system that orchestrates all return operations
///
/// One desk serves one hub; hubs are kept apart by giving each desk its own
/// storage.
pub struct ReturnsDesk<S: ReturnsStorage> {
    reason_manager: ReasonManager<S>,
    intake: ReturnIntake<S>,
    refund_engine: RefundEngine<S>,
    restorer: StockRestorer<S>,
    credit_ledger: StoreCreditLedger<S>,
    hooks: Arc<dyn ReturnHooks>,
}

impl<S: ReturnsStorage + Clone> ReturnsDesk<S> {
    /// Create a new desk with the given storage and collaborators
    pub fn new(storage: S, sales: Arc<dyn SalesLookup>, inventory: Arc<dyn Inventory>) -> Self {
        Self::with_validators(
            storage,
            sales,
            inventory,
            Box::new(DefaultReasonValidator),
            Box::new(DefaultReturnValidator),
        )
    }

    /// Create a new desk with custom validators
    pub fn with_validators(
        storage: S,
        sales: Arc<dyn SalesLookup>,
        inventory: Arc<dyn Inventory>,
        reason_validator: Box<dyn ReasonValidator>,
        return_validator: Box<dyn ReturnValidator>,
    ) -> Self {
        Self {
            reason_manager: ReasonManager::with_validator(storage.clone(), reason_validator),
            intake: ReturnIntake::with_validator(
                storage.clone(),
                sales,
                inventory.clone(),
                return_validator,
            ),
            refund_engine: RefundEngine::new(storage.clone()),
            restorer: StockRestorer::new(storage.clone(), inventory),
            credit_ledger: StoreCreditLedger::new(storage),
            hooks: Arc::new(NoopHooks),
        }
    }

    /// Replace the hooks notified around refunds
    pub fn with_hooks(mut self, hooks: Arc<dyn ReturnHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    // Settings
    /// Current settings, defaults when none were saved
    pub async fn settings(&self) -> ReturnsResult<ReturnsSettings> {
        self.intake.settings().await
    }

    /// Validate and store new settings
    pub async fn update_settings(&mut self, settings: &ReturnsSettings) -> ReturnsResult<()> {
        settings.validate()?;
        self.intake.storage.save_settings(settings).await?;
        info!(?settings, "Updated returns settings");
        Ok(())
    }

    /// Change a single setting by name
    pub async fn apply_setting(&mut self, name: &str, value: &str) -> ReturnsResult<ReturnsSettings> {
        let mut settings = self.settings().await?;
        settings.apply(name, value)?;
        self.update_settings(&settings).await?;
        Ok(settings)
    }

    // Reason operations
    /// Create a new return reason
    pub async fn create_reason(&mut self, request: ReasonRequest) -> ReturnsResult<ReturnReason> {
        self.reason_manager.create_reason(request).await
    }

    /// Get a reason by ID
    pub async fn get_reason(&self, reason_id: Uuid) -> ReturnsResult<Option<ReturnReason>> {
        self.reason_manager.get_reason(reason_id).await
    }

    /// List reasons in display order
    pub async fn list_reasons(&self, include_inactive: bool) -> ReturnsResult<Vec<ReturnReason>> {
        self.reason_manager.list_reasons(include_inactive).await
    }

    /// Update a reason
    pub async fn update_reason(
        &mut self,
        reason_id: Uuid,
        request: ReasonRequest,
    ) -> ReturnsResult<ReturnReason> {
        self.reason_manager.update_reason(reason_id, request).await
    }

    /// Delete a reason
    pub async fn delete_reason(&mut self, reason_id: Uuid) -> ReturnsResult<()> {
        self.reason_manager.delete_reason(reason_id).await
    }

    /// Seed the reasons most stores start with
    pub async fn setup_standard_reasons(
        &mut self,
    ) -> ReturnsResult<HashMap<String, ReturnReason>> {
        crate::returns::reason::utils::create_standard_reasons(&mut self.reason_manager).await
    }

    // Return operations
    /// Open a new pending return
    pub async fn create_return(&mut self, request: ReturnRequest) -> ReturnsResult<Return> {
        self.intake.create_return(request).await
    }

    /// Replace the header of a pending return
    pub async fn update_return(
        &mut self,
        return_id: Uuid,
        request: ReturnRequest,
    ) -> ReturnsResult<Return> {
        self.intake.update_return(return_id, request).await
    }

    /// Delete a return that has not been refunded
    pub async fn delete_return(&mut self, return_id: Uuid) -> ReturnsResult<()> {
        self.intake.delete_return(return_id).await
    }

    /// Get a return by ID
    pub async fn get_return(&self, return_id: Uuid) -> ReturnsResult<Option<Return>> {
        self.intake.get_return(return_id).await
    }

    /// Get a return by number
    pub async fn get_return_by_number(&self, number: &str) -> ReturnsResult<Option<Return>> {
        self.intake.get_return_by_number(number).await
    }

    /// Live items of a return
    pub async fn return_items(&self, return_id: Uuid) -> ReturnsResult<Vec<ReturnItem>> {
        self.intake.return_items(return_id).await
    }

    /// Add an item to a pending return
    pub async fn add_item(
        &mut self,
        return_id: Uuid,
        request: ReturnItemRequest,
    ) -> ReturnsResult<ReturnItem> {
        self.intake.add_item(return_id, request).await
    }

    /// Remove an item from a pending return
    pub async fn remove_item(&mut self, return_id: Uuid, item_id: Uuid) -> ReturnsResult<()> {
        self.intake.remove_item(return_id, item_id).await
    }

    /// List returns matching a filter
    pub async fn list_returns(&self, filter: &ReturnFilter) -> ReturnsResult<Vec<Return>> {
        self.intake.list_returns(filter).await
    }

    /// Refund recorded for a return, once completed
    pub async fn refund_for_return(&self, return_id: Uuid) -> ReturnsResult<Option<Refund>> {
        self.refund_engine.refund_for_return(return_id).await
    }

    /// Stock movements recorded for a return
    pub async fn stock_movements(&self, return_id: Uuid) -> ReturnsResult<Vec<StockMovement>> {
        self.restorer.movements(return_id).await
    }

    // Workflow
    /// Approve a pending return for refund
    #[instrument(skip(self))]
    pub async fn approve_return(
        &mut self,
        return_id: Uuid,
        approved_by: Uuid,
    ) -> ReturnsResult<Return> {
        let mut ret = self.intake.get_return_required(return_id).await?;
        ret.transition(ReturnStatus::Approved)?;

        if self.intake.return_items(return_id).await?.is_empty() {
            return Err(ReturnsError::Validation(format!(
                "Return {} has no items to approve",
                ret.number
            )));
        }

        ret.approved_by = Some(approved_by);
        ret.approved_at = Some(now());
        self.intake.storage.update_return(&ret).await?;
        info!(return_number = %ret.number, "Approved return");
        Ok(ret)
    }

    /// Reject a pending return
    pub async fn reject_return(&mut self, return_id: Uuid) -> ReturnsResult<Return> {
        self.move_to(return_id, ReturnStatus::Rejected).await
    }

    /// Cancel a return that has not been refunded
    pub async fn cancel_return(&mut self, return_id: Uuid) -> ReturnsResult<Return> {
        self.move_to(return_id, ReturnStatus::Cancelled).await
    }

    /// Refund an approved return
    ///
    /// Stock is restored first when automatic restocking is on, then store
    /// credit is issued for store credit refunds, the return is saved as
    /// completed and the refund and stock movements are recorded. If any of
    /// that fails, every step is taken back: the return is saved as approved
    /// again, recorded entries are removed, issued credit is withdrawn and
    /// the stock adjustments are reversed, so the completion can be retried.
    #[instrument(skip(self))]
    pub async fn complete_return(
        &mut self,
        return_id: Uuid,
        completed_on: NaiveDate,
    ) -> ReturnsResult<CompletionReport> {
        let mut ret = self.intake.get_return_required(return_id).await?;
        if !ret.status.can_transition_to(ReturnStatus::Completed) {
            return Err(ReturnsError::InvalidTransition {
                from: ret.status,
                to: ReturnStatus::Completed,
            });
        }

        let settings = self.settings().await?;
        if ret.refund_method == RefundMethod::StoreCredit && !settings.allow_store_credit {
            return Err(ReturnsError::Policy(
                "Refunds as store credit are disabled".to_string(),
            ));
        }

        let items = self.intake.return_items(return_id).await?;
        let sale = match ret.sale_id {
            Some(sale_id) => Some(self.intake.get_sale_required(sale_id).await?),
            None => None,
        };
        let partial = match &sale {
            Some(sale) => Some(self.refund_engine.check_sale_limit(&ret, sale).await?),
            None => None,
        };

        if let Err(e) = self.hooks.before_refund(&ret, &items) {
            warn!(return_number = %ret.number, error = %e, "Refund vetoed");
            return Err(e);
        }

        let movements = if settings.auto_restore_stock {
            self.restorer.apply(&ret, &items).await?
        } else {
            Vec::new()
        };

        let store_credit = match self.issue_credit(&ret, &settings, completed_on).await {
            Ok(store_credit) => store_credit,
            Err(e) => {
                warn!(return_number = %ret.number, error = %e, "Could not issue store credit, reverting stock");
                self.restorer.revert(&movements).await;
                return Err(e);
            }
        };

        let approved = ret.clone();
        let code = store_credit.as_ref().map(|credit| credit.code.clone());
        let refund = match self.settle(&mut ret, code, &movements).await {
            Ok(refund) => refund,
            Err(e) => {
                warn!(return_number = %ret.number, error = %e, "Completion failed, rolling back");
                self.roll_back(&approved, store_credit.as_ref(), &movements).await;
                return Err(e);
            }
        };

        for movement in &movements {
            self.hooks.on_event(&ReturnEvent::StockChanged {
                product_id: movement.product_id,
                quantity: movement.quantity,
                return_id: ret.id,
            });
        }
        if let (Some(sale_id), Some(partial)) = (ret.sale_id, partial) {
            self.hooks.on_event(&ReturnEvent::SaleRefunded {
                sale_id,
                return_id: ret.id,
                amount: refund.amount.clone(),
                partial,
            });
        }
        self.hooks.after_refund(&ret, &refund);

        info!(
            return_number = %ret.number,
            method = %ret.refund_method,
            amount = %ret.total_refund,
            restocked = movements.len(),
            "Completed return"
        );

        Ok(CompletionReport {
            return_record: ret,
            refund,
            store_credit,
            stock_movements: movements,
        })
    }

    /// Restock a completed return by hand
    ///
    /// Items restocked before are skipped, so this is safe to repeat.
    #[instrument(skip(self))]
    pub async fn restock_return(&mut self, return_id: Uuid) -> ReturnsResult<Vec<StockMovement>> {
        let ret = self.intake.get_return_required(return_id).await?;
        if ret.status != ReturnStatus::Completed {
            return Err(ReturnsError::Validation(format!(
                "Return {} is {}; only completed returns can be restocked",
                ret.number, ret.status
            )));
        }

        let items = self.intake.return_items(return_id).await?;
        let movements = self.restorer.restore(&ret, &items).await?;
        for movement in &movements {
            self.hooks.on_event(&ReturnEvent::StockChanged {
                product_id: movement.product_id,
                quantity: movement.quantity,
                return_id: ret.id,
            });
        }
        Ok(movements)
    }

    // Store credit operations
    /// Issue store credit outside of a return
    pub async fn issue_store_credit(&mut self, request: CreditRequest) -> ReturnsResult<StoreCredit> {
        let settings = self.settings().await?;
        if !settings.allow_store_credit {
            return Err(ReturnsError::Policy("Store credit is disabled".to_string()));
        }
        let expires_on = settings.credit_expiry(request.issued_on);
        self.credit_ledger.issue(request, expires_on).await
    }

    /// Balance view of a credit
    pub async fn lookup_credit(&self, code: &str, as_of: NaiveDate) -> ReturnsResult<CreditLookup> {
        self.credit_ledger.lookup(code, as_of).await
    }

    /// Spend part of a credit
    pub async fn redeem_credit(
        &mut self,
        code: &str,
        amount: &BigDecimal,
        as_of: NaiveDate,
    ) -> ReturnsResult<StoreCredit> {
        self.credit_ledger.redeem(code, amount, as_of).await
    }

    /// Add to a credit balance
    pub async fn top_up_credit(
        &mut self,
        code: &str,
        amount: &BigDecimal,
    ) -> ReturnsResult<StoreCredit> {
        self.credit_ledger.top_up(code, amount).await
    }

    /// Stop a credit from being redeemed
    pub async fn deactivate_credit(&mut self, code: &str) -> ReturnsResult<StoreCredit> {
        self.credit_ledger.deactivate(code).await
    }

    /// List credits matching a filter
    pub async fn list_credits(&self, filter: &CreditFilter) -> ReturnsResult<Vec<StoreCredit>> {
        self.credit_ledger.list(filter).await
    }

    /// Credit issued for a return, if any
    pub async fn store_credit_for_return(
        &self,
        return_id: Uuid,
    ) -> ReturnsResult<Option<StoreCredit>> {
        self.credit_ledger.credit_for_return(return_id).await
    }

    /// Redeemable balance across a customer's credits
    pub async fn customer_credit_balance(
        &self,
        customer_id: Uuid,
        as_of: NaiveDate,
    ) -> ReturnsResult<BigDecimal> {
        self.credit_ledger.customer_balance(customer_id, as_of).await
    }

    // Reporting
    /// Dashboard figures
    pub async fn summary(&self) -> ReturnsResult<ReturnsSummary> {
        let all = ReturnFilter {
            limit: Some(usize::MAX),
            ..ReturnFilter::default()
        };
        let returns = self.intake.list_returns(&all).await?;
        let count = |status: ReturnStatus| returns.iter().filter(|r| r.status == status).count();

        let total_refunded: BigDecimal = self
            .refund_engine
            .list_refunds(None)
            .await?
            .iter()
            .map(|refund| &refund.amount)
            .sum();

        Ok(ReturnsSummary {
            total_returns: returns.len(),
            pending_returns: count(ReturnStatus::Pending),
            approved_returns: count(ReturnStatus::Approved),
            completed_returns: count(ReturnStatus::Completed),
            total_refunded,
            recent_returns: returns.iter().take(10).cloned().collect(),
        })
    }

    /// Refund ledger entries, optionally matching a return number
    pub async fn refunds(&self, query: Option<&str>) -> ReturnsResult<RefundReport> {
        let refunds = self.refund_engine.list_refunds(query).await?;
        let total_refunded: BigDecimal = refunds.iter().map(|refund| &refund.amount).sum();
        Ok(RefundReport {
            refund_count: refunds.len(),
            total_refunded,
            refunds,
        })
    }

    async fn move_to(&mut self, return_id: Uuid, next: ReturnStatus) -> ReturnsResult<Return> {
        let mut ret = self.intake.get_return_required(return_id).await?;
        ret.transition(next)?;
        self.intake.storage.update_return(&ret).await?;
        info!(return_number = %ret.number, status = %ret.status, "Return status changed");
        Ok(ret)
    }

    /// Credit a store credit refund pays out, if any
    async fn issue_credit(
        &mut self,
        ret: &Return,
        settings: &ReturnsSettings,
        completed_on: NaiveDate,
    ) -> ReturnsResult<Option<StoreCredit>> {
        if ret.refund_method != RefundMethod::StoreCredit || ret.total_refund <= BigDecimal::from(0) {
            return Ok(None);
        }
        let expires_on = settings.credit_expiry(completed_on);
        let credit = self
            .credit_ledger
            .issue_for_return(ret, completed_on, expires_on)
            .await?;
        Ok(Some(credit))
    }

    /// Mark the return completed, then record its refund and movements
    async fn settle(
        &mut self,
        ret: &mut Return,
        store_credit_code: Option<String>,
        movements: &[StockMovement],
    ) -> ReturnsResult<Refund> {
        ret.transition(ReturnStatus::Completed)?;
        ret.completed_at = Some(now());
        self.intake.storage.update_return(ret).await?;

        let refund = self.refund_engine.record_refund(ret, store_credit_code).await?;
        if let Err(e) = self.restorer.record(movements).await {
            if let Err(undo) = self.refund_engine.remove_refund(&refund).await {
                error!(return_number = %ret.number, error = %undo, "Could not withdraw refund entry");
            }
            return Err(e);
        }
        Ok(refund)
    }

    /// Put an interrupted completion back to where it started
    async fn roll_back(
        &mut self,
        approved: &Return,
        store_credit: Option<&StoreCredit>,
        movements: &[StockMovement],
    ) {
        if let Err(e) = self.intake.storage.update_return(approved).await {
            error!(return_number = %approved.number, error = %e, "Could not restore approved return");
        }
        if let Some(credit) = store_credit {
            if let Err(e) = self.credit_ledger.deactivate(&credit.code).await {
                warn!(code = %credit.code, error = %e, "Could not withdraw store credit");
            }
        }
        self.restorer.revert(movements).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{MemoryInventory, MemorySales, MemoryStorage, RecordingHooks};
    use std::str::FromStr;

    fn money(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn day(month: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, d).unwrap()
    }

    struct Fixture {
        desk: ReturnsDesk<MemoryStorage>,
        storage: MemoryStorage,
        inventory: MemoryInventory,
        hooks: RecordingHooks,
        sale: Sale,
        product: Product,
    }

    fn fixture() -> Fixture {
        let sales = MemorySales::new();
        let inventory = MemoryInventory::new();
        let hooks = RecordingHooks::new();
        let product = Product {
            id: Uuid::new_v4(),
            name: "Kettle".to_string(),
            sku: "KET-1".to_string(),
        };
        inventory.add_product(product.clone(), 5).unwrap();

        let sale = Sale {
            id: Uuid::new_v4(),
            number: "S-0100".to_string(),
            date: day(3, 1),
            customer_id: Some(Uuid::new_v4()),
            customer_name: Some("Ana".to_string()),
            total: money("24.20"),
            items: vec![SaleItem {
                id: Uuid::new_v4(),
                product_id: Some(product.id),
                product_name: product.name.clone(),
                product_sku: product.sku.clone(),
                quantity: 2,
                unit_price: money("12.10"),
                tax_rate: money("21"),
            }],
        };
        sales.insert(sale.clone()).unwrap();

        let storage = MemoryStorage::new();
        let desk = ReturnsDesk::new(
            storage.clone(),
            Arc::new(sales),
            Arc::new(inventory.clone()),
        )
        .with_hooks(Arc::new(hooks.clone()));

        Fixture {
            desk,
            storage,
            inventory,
            hooks,
            sale,
            product,
        }
    }

    async fn approved_return(f: &mut Fixture, method: RefundMethod, quantity: u32) -> Return {
        let ret = f
            .desk
            .create_return(
                ReturnRequest::new(day(3, 10))
                    .sale(f.sale.id)
                    .refund_method(method),
            )
            .await
            .unwrap();
        f.desk
            .add_item(
                ret.id,
                ReturnItemRequest::from_sale_item(f.sale.items[0].id, quantity),
            )
            .await
            .unwrap();
        f.desk.approve_return(ret.id, Uuid::new_v4()).await.unwrap()
    }

    #[tokio::test]
    async fn test_complete_cash_return() {
        let mut f = fixture();
        let ret = approved_return(&mut f, RefundMethod::Cash, 1).await;
        assert!(ret.approved_at.is_some());

        let report = f.desk.complete_return(ret.id, day(3, 10)).await.unwrap();
        assert_eq!(report.return_record.status, ReturnStatus::Completed);
        assert_eq!(report.refund.amount, money("12.10"));
        assert_eq!(report.refund.tax_amount, money("2.10"));
        assert!(report.store_credit.is_none());
        assert_eq!(report.stock_movements.len(), 1);
        assert_eq!(f.inventory.on_hand(f.product.id).unwrap(), 6);

        let events = f.hooks.events();
        assert!(events.contains(&ReturnEvent::SaleRefunded {
            sale_id: f.sale.id,
            return_id: ret.id,
            amount: money("12.10"),
            partial: true,
        }));
        assert_eq!(f.hooks.refunded_returns(), vec![ret.number.clone()]);

        let again = f.desk.complete_return(ret.id, day(3, 11)).await;
        assert!(matches!(
            again,
            Err(ReturnsError::InvalidTransition {
                from: ReturnStatus::Completed,
                to: ReturnStatus::Completed
            })
        ));
    }

    #[tokio::test]
    async fn test_store_credit_return_issues_credit() {
        let mut f = fixture();
        let ret = approved_return(&mut f, RefundMethod::StoreCredit, 2).await;

        let report = f.desk.complete_return(ret.id, day(3, 12)).await.unwrap();
        let credit = report.store_credit.unwrap();
        assert_eq!(credit.current_amount, money("24.20"));
        assert_eq!(credit.expires_on, Some(day(3, 12) + chrono::Days::new(365)));
        assert_eq!(report.refund.store_credit_code, Some(credit.code.clone()));
        assert_eq!(credit.customer_name, "Ana");

        let fully_refunded = f.hooks.events().into_iter().any(|event| {
            matches!(event, ReturnEvent::SaleRefunded { partial: false, .. })
        });
        assert!(fully_refunded);
    }

    #[tokio::test]
    async fn test_pending_cannot_complete_and_empty_cannot_approve() {
        let mut f = fixture();
        let ret = f
            .desk
            .create_return(ReturnRequest::new(day(3, 10)).sale(f.sale.id))
            .await
            .unwrap();

        let early = f.desk.complete_return(ret.id, day(3, 10)).await;
        assert!(matches!(early, Err(ReturnsError::InvalidTransition { .. })));

        let empty = f.desk.approve_return(ret.id, Uuid::new_v4()).await;
        assert!(matches!(empty, Err(ReturnsError::Validation(_))));

        let rejected = f.desk.reject_return(ret.id).await.unwrap();
        assert_eq!(rejected.status, ReturnStatus::Rejected);
        assert!(f.desk.cancel_return(ret.id).await.is_err());
    }

    #[tokio::test]
    async fn test_vetoed_refund_leaves_return_approved() {
        let mut f = fixture();
        f.desk = f
            .desk
            .with_hooks(Arc::new(RecordingHooks::vetoing("till is closed")));
        let ret = approved_return(&mut f, RefundMethod::Cash, 1).await;

        let result = f.desk.complete_return(ret.id, day(3, 10)).await;
        assert!(matches!(result, Err(ReturnsError::Hook(_))));

        let ret = f.desk.get_return(ret.id).await.unwrap().unwrap();
        assert_eq!(ret.status, ReturnStatus::Approved);
        assert_eq!(f.inventory.on_hand(f.product.id).unwrap(), 5);
        assert!(f.desk.refund_for_return(ret.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inventory_failure_keeps_return_approved() {
        let mut f = fixture();
        let ret = approved_return(&mut f, RefundMethod::Cash, 1).await;
        f.inventory
            .fail_adjustments_for(Some(f.product.id))
            .unwrap();

        let result = f.desk.complete_return(ret.id, day(3, 10)).await;
        assert!(matches!(result, Err(ReturnsError::Inventory(_))));
        let ret = f.desk.get_return(ret.id).await.unwrap().unwrap();
        assert_eq!(ret.status, ReturnStatus::Approved);
        assert!(f.desk.refunds(None).await.unwrap().refunds.is_empty());
    }

    #[tokio::test]
    async fn test_manual_restock_when_auto_restore_is_off() {
        let mut f = fixture();
        f.desk
            .apply_setting("restock_automatically", "false")
            .await
            .unwrap();
        let ret = approved_return(&mut f, RefundMethod::Cash, 2).await;

        let report = f.desk.complete_return(ret.id, day(3, 10)).await.unwrap();
        assert!(report.stock_movements.is_empty());
        assert_eq!(f.inventory.on_hand(f.product.id).unwrap(), 5);

        let movements = f.desk.restock_return(ret.id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(f.inventory.on_hand(f.product.id).unwrap(), 7);
        assert!(f.desk.restock_return(ret.id).await.unwrap().is_empty());
        assert_eq!(f.inventory.on_hand(f.product.id).unwrap(), 7);
    }

    #[tokio::test]
    async fn test_summary_and_refund_report() {
        let mut f = fixture();
        let done = approved_return(&mut f, RefundMethod::Cash, 1).await;
        f.desk.complete_return(done.id, day(3, 10)).await.unwrap();
        f.desk
            .create_return(ReturnRequest::new(day(3, 11)).sale(f.sale.id))
            .await
            .unwrap();

        let summary = f.desk.summary().await.unwrap();
        assert_eq!(summary.total_returns, 2);
        assert_eq!(summary.pending_returns, 1);
        assert_eq!(summary.completed_returns, 1);
        assert_eq!(summary.total_refunded, money("12.10"));
        assert_eq!(summary.recent_returns[0].date, day(3, 11));

        let report = f.desk.refunds(Some(&done.number)).await.unwrap();
        assert_eq!(report.refund_count, 1);
        assert_eq!(report.total_refunded, money("12.10"));
    }

    #[tokio::test]
    async fn test_settings_errors_are_reported() {
        let mut f = fixture();
        assert!(matches!(
            f.desk.apply_setting("return_window_days", "soon").await,
            Err(ReturnsError::Config(_))
        ));
        let settings = f.desk.apply_setting("return_window_days", "14").await.unwrap();
        assert_eq!(settings.return_window_days, 14);
        assert_eq!(f.desk.settings().await.unwrap().return_window_days, 14);
    }

    #[tokio::test]
    async fn test_failed_return_save_can_be_retried() {
        let mut f = fixture();
        let ret = approved_return(&mut f, RefundMethod::Cash, 2).await;

        f.storage.fail_next("update_return").unwrap();
        let failed = f.desk.complete_return(ret.id, day(3, 10)).await;
        assert!(matches!(failed, Err(ReturnsError::Storage(_))));

        let stored = f.desk.get_return(ret.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReturnStatus::Approved);
        assert!(stored.completed_at.is_none());
        assert_eq!(f.inventory.on_hand(f.product.id).unwrap(), 5);
        assert!(f.desk.refunds(None).await.unwrap().refunds.is_empty());
        assert!(f.desk.stock_movements(ret.id).await.unwrap().is_empty());
        assert!(f.hooks.refunded_returns().is_empty());

        let report = f.desk.complete_return(ret.id, day(3, 10)).await.unwrap();
        assert_eq!(report.return_record.status, ReturnStatus::Completed);
        assert_eq!(report.refund.amount, money("24.20"));
        assert_eq!(f.inventory.on_hand(f.product.id).unwrap(), 7);
        assert_eq!(f.desk.refunds(None).await.unwrap().refund_count, 1);
        assert_eq!(f.desk.stock_movements(ret.id).await.unwrap().len(), 1);
        assert_eq!(f.storage.list_refunds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_refund_write_withdraws_store_credit() {
        let mut f = fixture();
        let ret = approved_return(&mut f, RefundMethod::StoreCredit, 2).await;

        f.storage.fail_next("save_refund").unwrap();
        let failed = f.desk.complete_return(ret.id, day(3, 12)).await;
        assert!(matches!(failed, Err(ReturnsError::Storage(_))));

        let withdrawn = f.desk.store_credit_for_return(ret.id).await.unwrap().unwrap();
        assert!(!withdrawn.is_active);
        assert_eq!(
            f.desk.get_return(ret.id).await.unwrap().unwrap().status,
            ReturnStatus::Approved
        );
        assert_eq!(f.inventory.on_hand(f.product.id).unwrap(), 5);
        assert_eq!(
            f.desk.customer_credit_balance(f.sale.customer_id.unwrap(), day(3, 12)).await.unwrap(),
            BigDecimal::from(0)
        );

        let report = f.desk.complete_return(ret.id, day(3, 12)).await.unwrap();
        let credit = report.store_credit.unwrap();
        assert_eq!(credit.code, withdrawn.code);
        assert!(credit.is_active);
        assert_eq!(credit.current_amount, money("24.20"));
        assert_eq!(report.refund.store_credit_code, Some(credit.code.clone()));
        assert_eq!(f.inventory.on_hand(f.product.id).unwrap(), 7);
        assert_eq!(
            f.desk.list_credits(&CreditFilter::default()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_movement_write_removes_refund() {
        let mut f = fixture();
        let ret = approved_return(&mut f, RefundMethod::Cash, 1).await;

        f.storage.fail_next("save_stock_movement").unwrap();
        let failed = f.desk.complete_return(ret.id, day(3, 10)).await;
        assert!(matches!(failed, Err(ReturnsError::Storage(_))));
        assert!(f.storage.list_refunds().await.unwrap().is_empty());
        assert!(f.desk.stock_movements(ret.id).await.unwrap().is_empty());
        assert_eq!(f.inventory.on_hand(f.product.id).unwrap(), 5);
        assert_eq!(
            f.desk.get_return(ret.id).await.unwrap().unwrap().status,
            ReturnStatus::Approved
        );

        let report = f.desk.complete_return(ret.id, day(3, 10)).await.unwrap();
        assert_eq!(report.stock_movements.len(), 1);
        assert_eq!(f.inventory.on_hand(f.product.id).unwrap(), 6);
        assert_eq!(f.desk.refund_for_return(ret.id).await.unwrap().unwrap().id, report.refund.id);
    }
}
