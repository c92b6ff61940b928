//! Return intake: validating requests against the originating sale and policy

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::ReturnsSettings;
use crate::returns::refund::RefundQuote;
use crate::traits::*;
use crate::types::*;

/// Header of a return as entered at the till
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnRequest {
    /// Day the goods are brought back
    pub date: NaiveDate,
    pub sale_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub employee_id: Option<Uuid>,
    pub reason_id: Option<Uuid>,
    pub reason_notes: String,
    pub refund_method: RefundMethod,
    pub notes: String,
}

impl ReturnRequest {
    /// Create a request refunding to the original payment method
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            sale_id: None,
            customer_id: None,
            customer_name: None,
            employee_id: None,
            reason_id: None,
            reason_notes: String::new(),
            refund_method: RefundMethod::Original,
            notes: String::new(),
        }
    }

    /// Link the return to its originating sale
    pub fn sale(mut self, sale_id: Uuid) -> Self {
        self.sale_id = Some(sale_id);
        self
    }

    pub fn customer(mut self, customer_id: Option<Uuid>, name: impl Into<String>) -> Self {
        self.customer_id = customer_id;
        self.customer_name = Some(name.into());
        self
    }

    pub fn employee(mut self, employee_id: Uuid) -> Self {
        self.employee_id = Some(employee_id);
        self
    }

    pub fn reason(mut self, reason_id: Uuid, notes: impl Into<String>) -> Self {
        self.reason_id = Some(reason_id);
        self.reason_notes = notes.into();
        self
    }

    pub fn refund_method(mut self, method: RefundMethod) -> Self {
        self.refund_method = method;
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// A line to add to a return
///
/// Lines taken from a sale copy product, price and tax from the sale line;
/// free lines need a product and a unit price.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnItemRequest {
    pub sale_item_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub product_name: Option<String>,
    pub product_sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Option<BigDecimal>,
    pub tax_rate: Option<BigDecimal>,
    /// Overrides unit price × quantity, e.g. to withhold a restocking fee
    pub refund_amount: Option<BigDecimal>,
    pub condition: ItemCondition,
    /// Overrides the default of restocking resellable items
    pub restock: Option<bool>,
    pub notes: String,
}

impl ReturnItemRequest {
    /// Return `quantity` units of a sale line
    pub fn from_sale_item(sale_item_id: Uuid, quantity: u32) -> Self {
        Self {
            sale_item_id: Some(sale_item_id),
            product_id: None,
            product_name: None,
            product_sku: None,
            quantity,
            unit_price: None,
            tax_rate: None,
            refund_amount: None,
            condition: ItemCondition::default(),
            restock: None,
            notes: String::new(),
        }
    }

    /// Return `quantity` units of a product sold without a receipt
    pub fn product(product_id: Uuid, quantity: u32, unit_price: BigDecimal) -> Self {
        Self {
            sale_item_id: None,
            product_id: Some(product_id),
            unit_price: Some(unit_price),
            ..Self::from_sale_item(Uuid::nil(), quantity)
        }
    }

    pub fn name(mut self, name: impl Into<String>, sku: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self.product_sku = Some(sku.into());
        self
    }

    pub fn tax_rate(mut self, rate: BigDecimal) -> Self {
        self.tax_rate = Some(rate);
        self
    }

    pub fn refund_amount(mut self, amount: BigDecimal) -> Self {
        self.refund_amount = Some(amount);
        self
    }

    pub fn condition(mut self, condition: ItemCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn restock(mut self, restock: bool) -> Self {
        self.restock = Some(restock);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// Filter for listing returns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnFilter {
    /// Matches number, customer name or reason notes, case-insensitive
    pub query: Option<String>,
    pub status: Option<ReturnStatus>,
    pub refund_method: Option<RefundMethod>,
    pub limit: Option<usize>,
}

/// Intake of returns and their items
pub struct ReturnIntake<S: ReturnsStorage> {
    pub(crate) storage: S,
    sales: Arc<dyn SalesLookup>,
    inventory: Arc<dyn Inventory>,
    validator: Box<dyn ReturnValidator>,
}

impl<S: ReturnsStorage> ReturnIntake<S> {
    /// Create a new intake
    pub fn new(storage: S, sales: Arc<dyn SalesLookup>, inventory: Arc<dyn Inventory>) -> Self {
        Self::with_validator(storage, sales, inventory, Box::new(DefaultReturnValidator))
    }

    /// Create a new intake with custom validator
    pub fn with_validator(
        storage: S,
        sales: Arc<dyn SalesLookup>,
        inventory: Arc<dyn Inventory>,
        validator: Box<dyn ReturnValidator>,
    ) -> Self {
        Self {
            storage,
            sales,
            inventory,
            validator,
        }
    }

    /// Current settings, falling back to defaults
    pub async fn settings(&self) -> ReturnsResult<ReturnsSettings> {
        Ok(self.storage.get_settings().await?.unwrap_or_default())
    }

    /// Get a sale, returning an error if the sales module does not know it
    pub async fn get_sale_required(&self, sale_id: Uuid) -> ReturnsResult<Sale> {
        self.sales
            .get_sale(sale_id)
            .await?
            .ok_or_else(|| ReturnsError::SaleNotFound(sale_id.to_string()))
    }

    /// Open a new pending return
    #[instrument(skip(self, request), fields(date = %request.date, sale = ?request.sale_id))]
    pub async fn create_return(&mut self, request: ReturnRequest) -> ReturnsResult<Return> {
        let settings = self.settings().await?;
        let sale = self.check_request(&settings, &request).await?;

        let number = self.next_number(request.date).await?;
        let mut ret = Return::new(number, request.date, request.refund_method);
        Self::apply_request(&mut ret, request, sale.as_ref());

        self.validator.validate_return(&ret)?;
        self.storage.save_return(&ret).await?;
        info!(return_number = %ret.number, method = %ret.refund_method, "Opened return");

        Ok(ret)
    }

    /// Replace the header of a pending return
    #[instrument(skip(self, request))]
    pub async fn update_return(
        &mut self,
        return_id: Uuid,
        request: ReturnRequest,
    ) -> ReturnsResult<Return> {
        let mut ret = self.get_return_required(return_id).await?;
        ret.ensure_pending()?;

        if request.sale_id != ret.sale_id && !self.return_items(return_id).await?.is_empty() {
            return Err(ReturnsError::Validation(format!(
                "Return {} already has items; remove them before changing the sale",
                ret.number
            )));
        }

        let settings = self.settings().await?;
        let sale = self.check_request(&settings, &request).await?;

        ret.date = request.date;
        ret.refund_method = request.refund_method;
        Self::apply_request(&mut ret, request, sale.as_ref());
        ret.updated_at = now();

        self.validator.validate_return(&ret)?;
        self.storage.update_return(&ret).await?;
        Ok(ret)
    }

    /// Soft-delete a return that has not been refunded
    pub async fn delete_return(&mut self, return_id: Uuid) -> ReturnsResult<()> {
        let mut ret = self.get_return_required(return_id).await?;
        if ret.status == ReturnStatus::Completed {
            return Err(ReturnsError::Validation(format!(
                "Return {} has been refunded and cannot be deleted",
                ret.number
            )));
        }

        let now = now();
        ret.is_deleted = true;
        ret.deleted_at = Some(now);
        ret.updated_at = now;
        self.storage.update_return(&ret).await?;
        info!(return_number = %ret.number, "Deleted return");
        Ok(())
    }

    /// Get a return by ID, skipping deleted ones
    pub async fn get_return(&self, return_id: Uuid) -> ReturnsResult<Option<Return>> {
        Ok(self
            .storage
            .get_return(return_id)
            .await?
            .filter(|ret| !ret.is_deleted))
    }

    /// Get a return by ID, returning an error if not found
    pub async fn get_return_required(&self, return_id: Uuid) -> ReturnsResult<Return> {
        self.get_return(return_id)
            .await?
            .ok_or_else(|| ReturnsError::ReturnNotFound(return_id.to_string()))
    }

    /// Get a return by its number
    pub async fn get_return_by_number(&self, number: &str) -> ReturnsResult<Option<Return>> {
        Ok(self
            .storage
            .get_return_by_number(number.trim())
            .await?
            .filter(|ret| !ret.is_deleted))
    }

    /// Live items of a return
    pub async fn return_items(&self, return_id: Uuid) -> ReturnsResult<Vec<ReturnItem>> {
        Ok(self
            .storage
            .list_items(return_id)
            .await?
            .into_iter()
            .filter(|item| !item.is_deleted)
            .collect())
    }

    /// List returns, newest first
    pub async fn list_returns(&self, filter: &ReturnFilter) -> ReturnsResult<Vec<Return>> {
        let query = filter
            .query
            .as_ref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());

        let mut returns: Vec<Return> = self
            .storage
            .list_returns()
            .await?
            .into_iter()
            .filter(|ret| !ret.is_deleted)
            .filter(|ret| filter.status.is_none_or(|status| ret.status == status))
            .filter(|ret| {
                filter
                    .refund_method
                    .is_none_or(|method| ret.refund_method == method)
            })
            .filter(|ret| {
                query.as_ref().is_none_or(|q| {
                    ret.number.to_lowercase().contains(q)
                        || ret
                            .customer_name
                            .as_ref()
                            .is_some_and(|name| name.to_lowercase().contains(q))
                        || ret.reason_notes.to_lowercase().contains(q)
                })
            })
            .collect();

        returns.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.number.cmp(&a.number))
        });
        returns.truncate(filter.limit.unwrap_or(100));
        Ok(returns)
    }

    /// Add a line to a pending return
    #[instrument(skip(self, request), fields(quantity = request.quantity))]
    pub async fn add_item(
        &mut self,
        return_id: Uuid,
        request: ReturnItemRequest,
    ) -> ReturnsResult<ReturnItem> {
        let mut ret = self.get_return_required(return_id).await?;
        ret.ensure_pending()?;

        if request.quantity == 0 {
            return Err(ReturnsError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let item = match request.sale_item_id {
            Some(sale_item_id) => self.item_from_sale(&ret, sale_item_id, request).await?,
            None => self.item_from_product(&ret, request).await?,
        };

        self.validator.validate_item(&item)?;
        self.storage.save_item(&item).await?;
        self.recalculate(&mut ret).await?;

        debug!(
            return_number = %ret.number,
            product = %item.product_name,
            refund = %item.refund_amount,
            "Added item to return"
        );
        Ok(item)
    }

    /// Remove a line from a pending return
    pub async fn remove_item(&mut self, return_id: Uuid, item_id: Uuid) -> ReturnsResult<()> {
        let mut ret = self.get_return_required(return_id).await?;
        ret.ensure_pending()?;

        let mut item = self
            .storage
            .get_item(item_id)
            .await?
            .filter(|item| item.return_id == return_id && !item.is_deleted)
            .ok_or_else(|| ReturnsError::ItemNotFound(item_id.to_string()))?;

        item.is_deleted = true;
        item.updated_at = now();
        self.storage.update_item(&item).await?;
        self.recalculate(&mut ret).await?;
        Ok(())
    }

    /// Recompute and store the totals of a return from its items
    pub async fn recalculate(&mut self, ret: &mut Return) -> ReturnsResult<RefundQuote> {
        let items = self.return_items(ret.id).await?;
        let quote = RefundQuote::from_items(&items);
        quote.apply_to(ret);

        self.validator.validate_return(ret)?;
        self.storage.update_return(ret).await?;
        Ok(quote)
    }

    /// Units of a sale line held by live returns other than `excluding`
    pub async fn returned_quantity(
        &self,
        sale_item_id: Uuid,
        excluding: Option<Uuid>,
    ) -> ReturnsResult<u32> {
        let mut total = 0;
        for item in self.storage.list_items_for_sale_item(sale_item_id).await? {
            if item.is_deleted || Some(item.return_id) == excluding {
                continue;
            }
            let holds = self
                .storage
                .get_return(item.return_id)
                .await?
                .is_some_and(|ret| !ret.is_deleted && ret.status.holds_quantity());
            if holds {
                total += item.quantity;
            }
        }
        Ok(total)
    }

    /// Check a request against policy and return the originating sale
    async fn check_request(
        &self,
        settings: &ReturnsSettings,
        request: &ReturnRequest,
    ) -> ReturnsResult<Option<Sale>> {
        if !settings.allow_returns {
            warn!("Returns are disabled");
            return Err(ReturnsError::Policy("Returns are not accepted".to_string()));
        }

        if request.refund_method == RefundMethod::StoreCredit && !settings.allow_store_credit {
            return Err(ReturnsError::Policy(
                "Refunds as store credit are disabled".to_string(),
            ));
        }

        let sale = match request.sale_id {
            Some(sale_id) => {
                let sale = self.get_sale_required(sale_id).await?;
                Self::check_window(settings, &sale, request.date)?;
                Some(sale)
            }
            None => {
                if !settings.accepts_without_receipt(request.refund_method) {
                    warn!(method = %request.refund_method, "Return without receipt refused");
                    return Err(ReturnsError::Policy(format!(
                        "A receipt is required for {} refunds",
                        request.refund_method
                    )));
                }
                None
            }
        };

        if let Some(reason_id) = request.reason_id {
            let reason = self
                .storage
                .get_reason(reason_id)
                .await?
                .filter(|reason| !reason.is_deleted)
                .ok_or_else(|| ReturnsError::ReasonNotFound(reason_id.to_string()))?;
            if !reason.is_active {
                return Err(ReturnsError::Validation(format!(
                    "Return reason '{}' is no longer in use",
                    reason.name
                )));
            }
            if reason.requires_note && request.reason_notes.trim().is_empty() {
                return Err(ReturnsError::Validation(format!(
                    "Return reason '{}' requires a note",
                    reason.name
                )));
            }
        }

        Ok(sale)
    }

    /// The return day must fall within the window after the sale
    fn check_window(
        settings: &ReturnsSettings,
        sale: &Sale,
        date: NaiveDate,
    ) -> ReturnsResult<()> {
        let elapsed = (date - sale.date).num_days();
        if elapsed < 0 {
            return Err(ReturnsError::Validation(format!(
                "Return date {date} is before sale {} on {}",
                sale.number, sale.date
            )));
        }
        if elapsed > i64::from(settings.return_window_days) {
            warn!(elapsed, window = settings.return_window_days, "Return window passed");
            return Err(ReturnsError::Policy(format!(
                "Sale {} is {elapsed} days old; returns are accepted for {} days",
                sale.number, settings.return_window_days
            )));
        }
        Ok(())
    }

    fn apply_request(ret: &mut Return, request: ReturnRequest, sale: Option<&Sale>) {
        ret.sale_id = request.sale_id;
        ret.customer_id = request
            .customer_id
            .or_else(|| sale.and_then(|sale| sale.customer_id));
        ret.customer_name = request
            .customer_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .or_else(|| sale.and_then(|sale| sale.customer_name.clone()));
        ret.employee_id = request.employee_id;
        ret.reason_id = request.reason_id;
        ret.reason_notes = request.reason_notes.trim().to_string();
        ret.notes = request.notes;
    }

    /// Next `RET-YYYYMMDD-NNNN` number for `date`
    async fn next_number(&self, date: NaiveDate) -> ReturnsResult<String> {
        let prefix = format!("RET-{}", date.format("%Y%m%d"));
        let last = self
            .storage
            .list_returns()
            .await?
            .into_iter()
            .filter(|ret| ret.number.starts_with(&prefix))
            .filter_map(|ret| {
                ret.number
                    .rsplit('-')
                    .next()
                    .and_then(|seq| seq.parse::<u32>().ok())
            })
            .max()
            .unwrap_or(0);
        Ok(format!("{prefix}-{:04}", last + 1))
    }

    async fn item_from_sale(
        &self,
        ret: &Return,
        sale_item_id: Uuid,
        request: ReturnItemRequest,
    ) -> ReturnsResult<ReturnItem> {
        let sale_id = ret.sale_id.ok_or_else(|| {
            ReturnsError::Validation(format!(
                "Return {} is not linked to a sale",
                ret.number
            ))
        })?;
        let sale = self.get_sale_required(sale_id).await?;
        let line = sale
            .item(sale_item_id)
            .ok_or_else(|| ReturnsError::SaleItemNotFound(sale_item_id.to_string()))?;

        let returned = self.returned_quantity(sale_item_id, None).await?;
        let available = line.quantity.saturating_sub(returned);
        if request.quantity > available {
            return Err(ReturnsError::Validation(format!(
                "Only {available} of {} '{}' can still be returned",
                line.quantity, line.product_name
            )));
        }

        let mut item = Self::new_item(ret, &request, round_money(&line.unit_price));
        item.sale_item_id = Some(line.id);
        item.product_id = line.product_id;
        item.product_name = line.product_name.clone();
        item.product_sku = line.product_sku.clone();
        item.tax_rate = line.tax_rate.clone();
        item.refund_amount = request
            .refund_amount
            .map(|amount| round_money(&amount))
            .unwrap_or_else(|| round_money(&item.line_value()));
        Ok(item)
    }

    async fn item_from_product(
        &self,
        ret: &Return,
        request: ReturnItemRequest,
    ) -> ReturnsResult<ReturnItem> {
        let product_id = request.product_id.ok_or_else(|| {
            ReturnsError::Validation("A returned item needs a sale line or a product".to_string())
        })?;
        let unit_price = request.unit_price.clone().ok_or_else(|| {
            ReturnsError::Validation("A unit price is required without a sale line".to_string())
        })?;
        let product = self.inventory.get_product(product_id).await?;

        let mut item = Self::new_item(ret, &request, round_money(&unit_price));
        item.product_id = Some(product_id);
        item.product_name = request
            .product_name
            .or_else(|| product.as_ref().map(|p| p.name.clone()))
            .unwrap_or_default();
        item.product_sku = request
            .product_sku
            .or_else(|| product.as_ref().map(|p| p.sku.clone()))
            .unwrap_or_default();
        item.tax_rate = request
            .tax_rate
            .unwrap_or_else(|| BigDecimal::from(DEFAULT_TAX_RATE));
        item.refund_amount = request
            .refund_amount
            .map(|amount| round_money(&amount))
            .unwrap_or_else(|| round_money(&item.line_value()));

        if item.product_name.trim().is_empty() {
            return Err(ReturnsError::Validation(format!(
                "Product {product_id} is unknown; give the item a name"
            )));
        }
        Ok(item)
    }

    fn new_item(ret: &Return, request: &ReturnItemRequest, unit_price: BigDecimal) -> ReturnItem {
        let now = now();
        ReturnItem {
            id: Uuid::new_v4(),
            return_id: ret.id,
            sale_item_id: None,
            product_id: None,
            product_name: String::new(),
            product_sku: String::new(),
            quantity: request.quantity,
            unit_price,
            tax_rate: BigDecimal::from(DEFAULT_TAX_RATE),
            refund_amount: BigDecimal::from(0),
            condition: request.condition,
            restock: request
                .restock
                .unwrap_or_else(|| request.condition.is_resellable()),
            notes: request.notes.clone(),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{MemoryInventory, MemorySales, MemoryStorage};
    use std::str::FromStr;

    fn money(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn day(month: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, d).unwrap()
    }

    struct Fixture {
        intake: ReturnIntake<MemoryStorage>,
        storage: MemoryStorage,
        sales: MemorySales,
        sale: Sale,
    }

    fn fixture() -> Fixture {
        let storage = MemoryStorage::new();
        let sales = MemorySales::new();
        let sale = Sale {
            id: Uuid::new_v4(),
            number: "S-0042".to_string(),
            date: day(3, 1),
            customer_id: Some(Uuid::new_v4()),
            customer_name: Some("Marta".to_string()),
            total: money("36.30"),
            items: vec![SaleItem {
                id: Uuid::new_v4(),
                product_id: Some(Uuid::new_v4()),
                product_name: "Teapot".to_string(),
                product_sku: "TEA-1".to_string(),
                quantity: 3,
                unit_price: money("12.10"),
                tax_rate: money("21"),
            }],
        };
        sales.insert(sale.clone()).unwrap();

        let intake = ReturnIntake::new(
            storage.clone(),
            Arc::new(sales.clone()),
            Arc::new(MemoryInventory::new()),
        );
        Fixture {
            intake,
            storage,
            sales,
            sale,
        }
    }

    #[tokio::test]
    async fn test_window_boundaries() {
        let mut f = fixture();

        let on_last_day = f
            .intake
            .create_return(ReturnRequest::new(day(3, 31)).sale(f.sale.id))
            .await
            .unwrap();
        assert_eq!(on_last_day.number, "RET-20240331-0001");
        assert_eq!(on_last_day.customer_name.as_deref(), Some("Marta"));
        assert_eq!(on_last_day.customer_id, f.sale.customer_id);

        let too_late = f
            .intake
            .create_return(ReturnRequest::new(day(4, 1)).sale(f.sale.id))
            .await;
        assert!(matches!(too_late, Err(ReturnsError::Policy(_))));

        let before_sale = f
            .intake
            .create_return(ReturnRequest::new(day(2, 28)).sale(f.sale.id))
            .await;
        assert!(matches!(before_sale, Err(ReturnsError::Validation(_))));
    }

    #[tokio::test]
    async fn test_numbers_increment_per_day() {
        let mut f = fixture();
        let first = f
            .intake
            .create_return(ReturnRequest::new(day(3, 5)).sale(f.sale.id))
            .await
            .unwrap();
        let second = f
            .intake
            .create_return(ReturnRequest::new(day(3, 5)).sale(f.sale.id))
            .await
            .unwrap();
        let next_day = f
            .intake
            .create_return(ReturnRequest::new(day(3, 6)).sale(f.sale.id))
            .await
            .unwrap();

        assert_eq!(first.number, "RET-20240305-0001");
        assert_eq!(second.number, "RET-20240305-0002");
        assert_eq!(next_day.number, "RET-20240306-0001");
    }

    #[tokio::test]
    async fn test_receipt_policy() {
        let mut f = fixture();

        let refused = f
            .intake
            .create_return(ReturnRequest::new(day(3, 5)).refund_method(RefundMethod::StoreCredit))
            .await;
        assert!(matches!(refused, Err(ReturnsError::Policy(_))));

        let mut settings = ReturnsSettings::default();
        settings.allow_no_receipt = true;
        f.storage.save_settings(&settings).await.unwrap();

        let accepted = f
            .intake
            .create_return(ReturnRequest::new(day(3, 5)).refund_method(RefundMethod::StoreCredit))
            .await
            .unwrap();
        assert_eq!(accepted.sale_id, None);

        let cash = f
            .intake
            .create_return(ReturnRequest::new(day(3, 5)).refund_method(RefundMethod::Cash))
            .await;
        assert!(matches!(cash, Err(ReturnsError::Policy(_))));
    }

    #[tokio::test]
    async fn test_unknown_sale() {
        let mut f = fixture();
        let result = f
            .intake
            .create_return(ReturnRequest::new(day(3, 5)).sale(Uuid::new_v4()))
            .await;
        assert!(matches!(result, Err(ReturnsError::SaleNotFound(_))));
    }

    #[tokio::test]
    async fn test_sale_item_snapshot_and_totals() {
        let mut f = fixture();
        let ret = f
            .intake
            .create_return(ReturnRequest::new(day(3, 5)).sale(f.sale.id))
            .await
            .unwrap();
        let line = f.sale.items[0].clone();

        let item = f
            .intake
            .add_item(ret.id, ReturnItemRequest::from_sale_item(line.id, 2))
            .await
            .unwrap();
        assert_eq!(item.product_name, "Teapot");
        assert_eq!(item.refund_amount, money("24.20"));
        assert!(item.restock);

        let ret = f.intake.get_return_required(ret.id).await.unwrap();
        assert_eq!(ret.subtotal, money("24.20"));
        assert_eq!(ret.total_refund, money("24.20"));
        assert_eq!(ret.tax_amount, money("4.20"));

        // Only one teapot left to return
        let over = f
            .intake
            .add_item(ret.id, ReturnItemRequest::from_sale_item(line.id, 2))
            .await;
        assert!(matches!(over, Err(ReturnsError::Validation(_))));

        f.intake.remove_item(ret.id, item.id).await.unwrap();
        let ret = f.intake.get_return_required(ret.id).await.unwrap();
        assert_eq!(ret.total_refund, BigDecimal::from(0));
        assert_eq!(f.intake.returned_quantity(line.id, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refund_override_cannot_exceed_line_value() {
        let mut f = fixture();
        let ret = f
            .intake
            .create_return(ReturnRequest::new(day(3, 5)).sale(f.sale.id))
            .await
            .unwrap();
        let line_id = f.sale.items[0].id;

        let fee_withheld = f
            .intake
            .add_item(
                ret.id,
                ReturnItemRequest::from_sale_item(line_id, 1).refund_amount(money("10.00")),
            )
            .await
            .unwrap();
        assert_eq!(fee_withheld.refund_amount, money("10.00"));

        let inflated = f
            .intake
            .add_item(
                ret.id,
                ReturnItemRequest::from_sale_item(line_id, 1).refund_amount(money("12.11")),
            )
            .await;
        assert!(matches!(inflated, Err(ReturnsError::Validation(_))));
    }

    #[tokio::test]
    async fn test_damaged_items_are_not_restocked_by_default() {
        let mut f = fixture();
        let ret = f
            .intake
            .create_return(ReturnRequest::new(day(3, 5)).sale(f.sale.id))
            .await
            .unwrap();
        let item = f
            .intake
            .add_item(
                ret.id,
                ReturnItemRequest::from_sale_item(f.sale.items[0].id, 1)
                    .condition(ItemCondition::Damaged),
            )
            .await
            .unwrap();
        assert!(!item.restock);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let mut f = fixture();
        f.intake
            .create_return(
                ReturnRequest::new(day(3, 5))
                    .sale(f.sale.id)
                    .refund_method(RefundMethod::Cash)
                    .customer(None, "Jordi"),
            )
            .await
            .unwrap();
        let deleted = f
            .intake
            .create_return(ReturnRequest::new(day(3, 6)).sale(f.sale.id))
            .await
            .unwrap();
        f.intake.delete_return(deleted.id).await.unwrap();

        let all = f.intake.list_returns(&ReturnFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);

        let by_name = ReturnFilter {
            query: Some("jordi".to_string()),
            ..ReturnFilter::default()
        };
        assert_eq!(f.intake.list_returns(&by_name).await.unwrap().len(), 1);

        let by_method = ReturnFilter {
            refund_method: Some(RefundMethod::StoreCredit),
            ..ReturnFilter::default()
        };
        assert!(f.intake.list_returns(&by_method).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_removing_item_recalculates_totals() {
        let mut f = fixture();
        let ret = f
            .intake
            .create_return(ReturnRequest::new(day(3, 5)).sale(f.sale.id))
            .await
            .unwrap();
        let line = f.sale.items[0].id;
        let single = f
            .intake
            .add_item(ret.id, ReturnItemRequest::from_sale_item(line, 1))
            .await
            .unwrap();
        f.intake
            .add_item(ret.id, ReturnItemRequest::from_sale_item(line, 2))
            .await
            .unwrap();
        let before = f.intake.get_return_required(ret.id).await.unwrap();
        assert_eq!(before.total_refund, money("36.30"));

        f.intake.remove_item(ret.id, single.id).await.unwrap();
        let after = f.intake.get_return_required(ret.id).await.unwrap();
        assert_eq!(after.subtotal, money("24.20"));
        assert_eq!(after.tax_amount, money("4.20"));
        assert_eq!(after.total_refund, money("24.20"));
        assert_eq!(f.intake.return_items(ret.id).await.unwrap().len(), 1);

        assert!(matches!(
            f.intake.remove_item(ret.id, single.id).await,
            Err(ReturnsError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sale_price_with_extra_precision_is_rounded() {
        let mut f = fixture();
        let sale = Sale {
            id: Uuid::new_v4(),
            number: "S-0043".to_string(),
            date: day(3, 1),
            customer_id: None,
            customer_name: None,
            total: money("3.34"),
            items: vec![SaleItem {
                id: Uuid::new_v4(),
                product_id: None,
                product_name: "Tea sample".to_string(),
                product_sku: "TEA-S".to_string(),
                quantity: 1,
                unit_price: money("3.335"),
                tax_rate: money("21"),
            }],
        };
        f.sales.insert(sale.clone()).unwrap();

        let ret = f
            .intake
            .create_return(ReturnRequest::new(day(3, 5)).sale(sale.id))
            .await
            .unwrap();
        let item = f
            .intake
            .add_item(ret.id, ReturnItemRequest::from_sale_item(sale.items[0].id, 1))
            .await
            .unwrap();
        assert_eq!(item.unit_price, money("3.34"));
        assert_eq!(item.refund_amount, money("3.34"));
        assert_eq!(
            f.intake.get_return_required(ret.id).await.unwrap().total_refund,
            money("3.34")
        );
    }
}
