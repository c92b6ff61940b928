//! Refund calculation and the refund ledger

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::traits::*;
use crate::types::*;

/// Totals of a return computed from its items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundQuote {
    pub subtotal: BigDecimal,
    /// Tax included in the subtotal
    pub tax_amount: BigDecimal,
    pub total_refund: BigDecimal,
}

impl RefundQuote {
    /// Compute the refund for the live items of a return
    ///
    /// Refund amounts are tax inclusive, so the total refund equals the
    /// subtotal and the tax amount is the portion already contained in it.
    pub fn from_items(items: &[ReturnItem]) -> Self {
        let live = items.iter().filter(|item| !item.is_deleted);
        let (subtotal, tax_amount) = live.fold(
            (BigDecimal::from(0), BigDecimal::from(0)),
            |(subtotal, tax), item| (subtotal + &item.refund_amount, tax + item.included_tax()),
        );
        Self {
            total_refund: subtotal.clone(),
            subtotal,
            tax_amount,
        }
    }

    /// Write the totals onto a return header
    pub fn apply_to(&self, ret: &mut Return) {
        ret.subtotal = self.subtotal.clone();
        ret.tax_amount = self.tax_amount.clone();
        ret.total_refund = self.total_refund.clone();
        ret.updated_at = now();
    }
}

/// Refund ledger with per-sale limits
pub struct RefundEngine<S: ReturnsStorage> {
    storage: S,
}

impl<S: ReturnsStorage> RefundEngine<S> {
    /// Create a new refund engine
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Refund entries whose return is completed
    ///
    /// An entry left behind by an interrupted completion does not count.
    async fn settled_refunds(&self) -> ReturnsResult<Vec<Refund>> {
        let mut settled = Vec::new();
        for refund in self.storage.list_refunds().await? {
            let completed = self
                .storage
                .get_return(refund.return_id)
                .await?
                .is_some_and(|ret| ret.status == ReturnStatus::Completed);
            if completed {
                settled.push(refund);
            } else {
                debug!(return_number = %refund.return_number, "Ignoring refund of unsettled return");
            }
        }
        Ok(settled)
    }

    /// Amount already refunded against a sale
    pub async fn refunded_for_sale(&self, sale_id: Uuid) -> ReturnsResult<BigDecimal> {
        Ok(self
            .settled_refunds()
            .await?
            .iter()
            .filter(|refund| refund.sale_id == Some(sale_id))
            .map(|refund| &refund.amount)
            .sum())
    }

    /// Check that refunding `ret` keeps the sale within its total
    ///
    /// Returns whether the sale remains partially refunded afterwards.
    #[instrument(skip(self, ret, sale), fields(return_number = %ret.number, sale = %sale.number))]
    pub async fn check_sale_limit(&self, ret: &Return, sale: &Sale) -> ReturnsResult<bool> {
        let already = self.refunded_for_sale(sale.id).await?;
        let after = &already + &ret.total_refund;

        if after > sale.total {
            warn!(%already, refund = %ret.total_refund, total = %sale.total, "Refund exceeds sale total");
            return Err(ReturnsError::Policy(format!(
                "Refunding {} would exceed sale {} total of {} ({} already refunded)",
                ret.total_refund, sale.number, sale.total, already
            )));
        }

        debug!(%already, %after, "Sale refund limit checked");
        Ok(after < sale.total)
    }

    /// Record the ledger entry for a completed return
    pub async fn record_refund(
        &mut self,
        ret: &Return,
        store_credit_code: Option<String>,
    ) -> ReturnsResult<Refund> {
        let refund = Refund {
            id: Uuid::new_v4(),
            return_id: ret.id,
            return_number: ret.number.clone(),
            sale_id: ret.sale_id,
            customer_id: ret.customer_id,
            method: ret.refund_method,
            amount: ret.total_refund.clone(),
            tax_amount: ret.tax_amount.clone(),
            store_credit_code,
            recorded_at: now(),
        };

        self.storage.save_refund(&refund).await?;
        info!(
            return_number = %refund.return_number,
            method = %refund.method,
            amount = %refund.amount,
            "Recorded refund"
        );

        Ok(refund)
    }

    /// Withdraw a refund entry after its completion was rolled back
    pub async fn remove_refund(&mut self, refund: &Refund) -> ReturnsResult<()> {
        self.storage.delete_refund(refund.id).await?;
        warn!(return_number = %refund.return_number, amount = %refund.amount, "Withdrew refund entry");
        Ok(())
    }

    /// Get the refund recorded for a return
    pub async fn refund_for_return(&self, return_id: Uuid) -> ReturnsResult<Option<Refund>> {
        Ok(self
            .settled_refunds()
            .await?
            .into_iter()
            .find(|refund| refund.return_id == return_id))
    }

    /// List refunds, newest first, optionally matching a return number
    pub async fn list_refunds(&self, query: Option<&str>) -> ReturnsResult<Vec<Refund>> {
        let query = query.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());
        let mut refunds: Vec<Refund> = self
            .settled_refunds()
            .await?
            .into_iter()
            .filter(|refund| {
                query
                    .as_ref()
                    .is_none_or(|q| refund.return_number.to_lowercase().contains(q))
            })
            .collect();
        refunds.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(refunds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn money(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn item(refund: &str, rate: &str) -> ReturnItem {
        let now = now();
        ReturnItem {
            id: Uuid::new_v4(),
            return_id: Uuid::new_v4(),
            sale_item_id: None,
            product_id: None,
            product_name: "Mug".to_string(),
            product_sku: "MUG-1".to_string(),
            quantity: 1,
            unit_price: money(refund),
            tax_rate: money(rate),
            refund_amount: money(refund),
            condition: ItemCondition::Good,
            restock: true,
            notes: String::new(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_quote_sums_live_items() {
        let mut removed = item("100.00", "21");
        removed.is_deleted = true;
        let items = vec![item("12.10", "21"), item("10.00", "0"), removed];

        let quote = RefundQuote::from_items(&items);
        assert_eq!(quote.subtotal, money("22.10"));
        assert_eq!(quote.total_refund, money("22.10"));
        assert_eq!(quote.tax_amount, money("2.10"));
    }

    #[test]
    fn test_quote_of_nothing_is_zero() {
        let quote = RefundQuote::from_items(&[]);
        assert_eq!(quote.total_refund, BigDecimal::from(0));
    }

    #[tokio::test]
    async fn test_sale_limit() {
        let mut engine = RefundEngine::new(MemoryStorage::new());
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let sale = Sale {
            id: Uuid::new_v4(),
            number: "S-1".to_string(),
            date,
            customer_id: None,
            customer_name: None,
            total: money("50.00"),
            items: Vec::new(),
        };

        let mut first = Return::new("RET-20240301-0001".to_string(), date, RefundMethod::Cash);
        first.sale_id = Some(sale.id);
        first.total_refund = money("30.00");
        first.status = ReturnStatus::Completed;
        assert!(engine.check_sale_limit(&first, &sale).await.unwrap());
        engine.storage.save_return(&first).await.unwrap();
        engine.record_refund(&first, None).await.unwrap();

        let mut second = Return::new("RET-20240301-0002".to_string(), date, RefundMethod::Cash);
        second.sale_id = Some(sale.id);
        second.total_refund = money("20.01");
        assert!(matches!(
            engine.check_sale_limit(&second, &sale).await,
            Err(ReturnsError::Policy(_))
        ));

        second.total_refund = money("20.00");
        assert!(!engine.check_sale_limit(&second, &sale).await.unwrap());
        assert_eq!(engine.refunded_for_sale(sale.id).await.unwrap(), money("30.00"));

        let listed = engine.list_refunds(Some("0001")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(engine.refund_for_return(first.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unsettled_refunds_are_not_counted() {
        let mut engine = RefundEngine::new(MemoryStorage::new());
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let sale_id = Uuid::new_v4();

        let mut ret = Return::new("RET-20240301-0001".to_string(), date, RefundMethod::Cash);
        ret.sale_id = Some(sale_id);
        ret.total_refund = money("12.00");
        ret.status = ReturnStatus::Approved;
        engine.storage.save_return(&ret).await.unwrap();

        let refund = engine.record_refund(&ret, None).await.unwrap();
        assert_eq!(engine.refunded_for_sale(sale_id).await.unwrap(), BigDecimal::from(0));
        assert!(engine.list_refunds(None).await.unwrap().is_empty());
        assert!(engine.refund_for_return(ret.id).await.unwrap().is_none());

        ret.status = ReturnStatus::Completed;
        engine.storage.update_return(&ret).await.unwrap();
        assert_eq!(engine.refunded_for_sale(sale_id).await.unwrap(), money("12.00"));

        engine.remove_refund(&refund).await.unwrap();
        assert!(engine.storage.list_refunds().await.unwrap().is_empty());
    }
}
