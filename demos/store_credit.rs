//! Store credit example: returns without receipt and credit redemption

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use returns_core::utils::{MemoryInventory, MemorySales, MemoryStorage};
use returns_core::{
    CreditFilter, CreditRequest, Product, RefundMethod, ReturnItemRequest, ReturnRequest,
    ReturnsDesk, ReturnsSettings,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const SETTINGS: &str = r#"
return_window_days = 14
allow_no_receipt = true
store_credit_expiry_days = 180
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🎟️  Returns Core - Store Credit Example\n");

    let inventory = MemoryInventory::new();
    let scarf = Product {
        id: Uuid::new_v4(),
        name: "Wool scarf".to_string(),
        sku: "ACC-318".to_string(),
    };
    inventory.add_product(scarf.clone(), 2)?;

    let mut desk = ReturnsDesk::new(
        MemoryStorage::new(),
        Arc::new(MemorySales::new()),
        Arc::new(inventory.clone()),
    );

    // Policy comes from TOML
    let settings = ReturnsSettings::from_toml_str(SETTINGS)?;
    desk.update_settings(&settings).await?;
    println!("⚙️  Settings: {}", settings.to_toml_string()?.replace('\n', "; "));
    println!();

    // 1. A gift returned without a receipt becomes store credit
    let today = NaiveDate::from_ymd_opt(2024, 12, 28).unwrap();
    let customer = Uuid::new_v4();
    let ret = desk
        .create_return(
            ReturnRequest::new(today)
                .customer(Some(customer), "Oriol Mas")
                .refund_method(RefundMethod::StoreCredit)
                .notes("Unwanted gift"),
        )
        .await?;
    desk.add_item(
        ret.id,
        ReturnItemRequest::product(scarf.id, 1, BigDecimal::from_str("24.95")?),
    )
    .await?;
    desk.approve_return(ret.id, Uuid::new_v4()).await?;
    let report = desk.complete_return(ret.id, today).await?;

    let credit = report.store_credit.ok_or("no store credit issued")?;
    println!(
        "💳 Issued {} worth {} (expires {})",
        credit.code,
        credit.current_amount,
        credit
            .expires_on
            .map(|date| date.to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    println!("  Scarves on hand: {}\n", inventory.on_hand(scarf.id)?);

    // 2. Goodwill credit issued by hand
    let goodwill = desk
        .issue_store_credit(
            CreditRequest::new(BigDecimal::from(10), today)
                .customer(Some(customer), "Oriol Mas")
                .contact("oriol@example.com", "")
                .notes("Late delivery"),
        )
        .await?;
    println!("💳 Issued goodwill credit {}", goodwill.code);

    // 3. Spend part of it
    let spend_on = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
    let after = desk
        .redeem_credit(&credit.code, &BigDecimal::from_str("14.95")?, spend_on)
        .await?;
    println!("🛒 Redeemed 14.95, {} left on {}", after.current_amount, after.code);

    match desk
        .redeem_credit(&credit.code, &BigDecimal::from(50), spend_on)
        .await
    {
        Ok(_) => println!("  ✗ Overdraft was accepted"),
        Err(e) => println!("  ✓ Overdraft refused: {e}"),
    }
    println!();

    // 4. Balances
    let lookup = desk.lookup_credit(&credit.code, spend_on).await?;
    println!(
        "🔎 {}: {} of {} (valid: {})",
        lookup.code, lookup.current_amount, lookup.original_amount, lookup.is_valid
    );
    println!(
        "👤 Customer balance: {}",
        desk.customer_credit_balance(customer, spend_on).await?
    );

    let filter = CreditFilter {
        customer_id: Some(customer),
        ..CreditFilter::default()
    };
    for credit in desk.list_credits(&filter).await? {
        println!("  - {} {} {}", credit.code, credit.current_amount, credit.notes);
    }

    Ok(())
}
