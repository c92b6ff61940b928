//! Basic returns desk usage example

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use returns_core::utils::{MemoryInventory, MemorySales, MemoryStorage};
use returns_core::{
    ItemCondition, Product, ReturnFilter, ReturnItemRequest, ReturnRequest, ReturnsDesk, Sale,
    SaleItem,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    println!("🧾 Returns Core - Basic Returns Example\n");

    // Collaborators the desk talks to: sales history and inventory
    let sales = MemorySales::new();
    let inventory = MemoryInventory::new();

    let headphones = Product {
        id: Uuid::new_v4(),
        name: "Wireless headphones".to_string(),
        sku: "AUD-220".to_string(),
    };
    let cable = Product {
        id: Uuid::new_v4(),
        name: "USB-C cable".to_string(),
        sku: "CBL-010".to_string(),
    };
    inventory.add_product(headphones.clone(), 8)?;
    inventory.add_product(cable.clone(), 40)?;

    let sale = Sale {
        id: Uuid::new_v4(),
        number: "T-000981".to_string(),
        date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        customer_id: Some(Uuid::new_v4()),
        customer_name: Some("Nora Puig".to_string()),
        total: BigDecimal::from_str("96.80")?,
        items: vec![
            SaleItem {
                id: Uuid::new_v4(),
                product_id: Some(headphones.id),
                product_name: headphones.name.clone(),
                product_sku: headphones.sku.clone(),
                quantity: 1,
                unit_price: BigDecimal::from_str("84.70")?,
                tax_rate: BigDecimal::from(21),
            },
            SaleItem {
                id: Uuid::new_v4(),
                product_id: Some(cable.id),
                product_name: cable.name.clone(),
                product_sku: cable.sku.clone(),
                quantity: 1,
                unit_price: BigDecimal::from_str("12.10")?,
                tax_rate: BigDecimal::from(21),
            },
        ],
    };
    sales.insert(sale.clone())?;

    let mut desk = ReturnsDesk::new(
        MemoryStorage::new(),
        Arc::new(sales),
        Arc::new(inventory.clone()),
    );

    // 1. Seed the reason catalogue
    println!("📋 Setting up return reasons...");
    let reasons = desk.setup_standard_reasons().await?;
    for reason in desk.list_reasons(false).await? {
        println!(
            "  ✓ {} (restocks: {}, note required: {})",
            reason.name, reason.restocks_inventory, reason.requires_note
        );
    }
    println!();

    // 2. Customer brings the headphones back
    println!("📦 Taking in a return...\n");
    let ret = desk
        .create_return(
            ReturnRequest::new(NaiveDate::from_ymd_opt(2024, 5, 20).unwrap())
                .sale(sale.id)
                .reason(reasons["changed_mind"].id, "Prefers over-ear")
                .notes("Box opened, all accessories present"),
        )
        .await?;
    println!("  ✓ Opened {} for {}", ret.number, sale.number);

    desk.add_item(
        ret.id,
        ReturnItemRequest::from_sale_item(sale.items[0].id, 1).condition(ItemCondition::Good),
    )
    .await?;
    let ret = desk
        .get_return(ret.id)
        .await?
        .ok_or("return disappeared")?;
    println!(
        "  ✓ Refund {} (of which tax {})\n",
        ret.total_refund, ret.tax_amount
    );

    // 3. Manager approves, cashier completes
    println!("✅ Approving and completing...\n");
    desk.approve_return(ret.id, Uuid::new_v4()).await?;
    let report = desk
        .complete_return(ret.id, NaiveDate::from_ymd_opt(2024, 5, 20).unwrap())
        .await?;
    println!(
        "  ✓ {} refunded {} via {}",
        report.return_record.number, report.refund.amount, report.refund.method
    );
    for movement in &report.stock_movements {
        println!(
            "  ✓ Restocked {} x product {}",
            movement.quantity, movement.product_id
        );
    }
    println!(
        "  ✓ Headphones on hand: {}\n",
        inventory.on_hand(headphones.id)?
    );

    // 4. A second return outside the window is refused
    println!("⏰ Trying a late return...");
    let late = desk
        .create_return(
            ReturnRequest::new(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()).sale(sale.id),
        )
        .await;
    match late {
        Ok(ret) => println!("  ✗ Unexpectedly opened {}", ret.number),
        Err(e) => println!("  ✓ Refused: {e}"),
    }
    println!();

    // 5. Desk overview
    println!("📊 Summary");
    let summary = desk.summary().await?;
    println!("  Returns:        {}", summary.total_returns);
    println!("  Completed:      {}", summary.completed_returns);
    println!("  Total refunded: {}", summary.total_refunded);
    for ret in desk.list_returns(&ReturnFilter::default()).await? {
        println!("  - {} [{}] {}", ret.number, ret.status, ret.total_refund);
    }

    Ok(())
}
