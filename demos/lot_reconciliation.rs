//! 批次對帳示例
//!
//! 執行：`cargo run --example lot_reconciliation`
//! 以 `RUST_LOG=debug` 檢視計算步驟日誌。

use chrono::NaiveDate;
use production_trace::{ProductionService, ReconciliationConfig};
use rust_decimal::Decimal;
use trace_core::{
    CostBasis, CostScope, CostType, InMemoryRepository, Order, Pallet, PalletState, Process,
    ProcessType, Production, ProductionCost, ProductionInput, ProductionOutput,
    ProductionOutputConsumption, ProductionRecord, ProductRef, StockBox, Store,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== 批次對帳示例 ===\n");

    let repo = build_repository()?;
    let config = ReconciliationConfig::default().with_warning_threshold(Decimal::from(3));
    let mut service = ProductionService::new(repo, config)?;

    let totals = service.calculate_global_totals(1)?;
    println!("批次合計:");
    println!("  投入: {} kg（{} 箱）", totals.total_input_weight, totals.total_input_boxes);
    println!("  產出: {} kg（{} 箱）", totals.total_output_weight, totals.total_output_boxes);
    println!("  損耗: {} kg（{}%）", totals.total_waste, totals.total_waste_percentage);
    println!("  增重: {} kg（{}%）", totals.total_yield, totals.total_yield_percentage);

    let reconciliation = service.get_detailed_reconciliation_by_product(1)?;
    println!("\n產品對帳:");
    for product in &reconciliation.products {
        println!(
            "  - {}: 產出 {} kg, 銷售 {} kg, 庫存 {} kg, 再加工 {} kg → [{}] {}",
            product.product.name,
            product.produced.weight,
            product.in_sales.weight,
            product.in_stock.weight,
            product.reprocessed.weight,
            product.status.as_str(),
            product.message
        );
    }
    println!("  整體狀態: {}", reconciliation.summary.overall_status.as_str());

    let costs = service.cost_summary(1)?;
    println!("\n成本: 總額 {}，每公斤 {}", costs.total_cost, costs.cost_per_kg);

    let snapshot = service.diagram_snapshot(1)?;
    println!("\n流程圖快照 {}（{}）:", snapshot.id, snapshot.generated_at);
    println!("{}", serde_json::to_string_pretty(&snapshot.diagram_data)?);

    Ok(())
}

fn build_repository() -> anyhow::Result<InMemoryRepository> {
    let raw = ProductRef::new(1, "Merluza entera");
    let clean = ProductRef::new(2, "Merluza limpia");
    let fillet = ProductRef::new(3, "Filete de merluza");

    let mut repo = InMemoryRepository::new();
    let date = NaiveDate::from_ymd_opt(2025, 4, 25)
        .ok_or_else(|| anyhow::anyhow!("無效日期"))?;
    repo.insert_production(
        Production::new(1, "L-2504")
            .with_date(date)
            .with_species("Merluccius merluccius")
            .with_capture_zone("FAO 27"),
    );

    repo.insert_record(
        ProductionRecord::new(1, 1).with_process(Process::new(1, "Limpieza", ProcessType::Starting)),
    );
    repo.insert_record(
        ProductionRecord::new(2, 1)
            .with_parent(1)
            .with_process(Process::new(2, "Fileteado", ProcessType::Final)),
    );

    repo.insert_pallet(Pallet::new(1, PalletState::Stored));
    for (id, weight) in [(1, 52), (2, 48), (3, 50), (4, 50)] {
        repo.insert_box(StockBox::new(id, raw.clone(), "R-0425", Decimal::from(weight)).with_pallet(1));
        repo.insert_input(ProductionInput::new(id, 1, id));
    }

    repo.insert_output(ProductionOutput::new(1, 1, clean, 8, Decimal::from(170)));
    repo.insert_consumption(ProductionOutputConsumption::new(1, 2, 1, Decimal::from(170), 8));
    repo.insert_output(ProductionOutput::new(2, 2, fillet.clone(), 12, Decimal::from(120)).with_lot_id("L-2504"));

    repo.insert_order(Order::new(1).with_customer("Pescados del Norte").with_load_date(date));
    repo.insert_store(Store::new(1, "Cámara 2"));
    repo.insert_pallet(Pallet::new(10, PalletState::Shipped).with_order(1));
    repo.insert_pallet(Pallet::new(11, PalletState::Stored).with_store(1));

    for id in 0..12u64 {
        let pallet = if id < 7 { Some(10) } else if id < 11 { Some(11) } else { None };
        let mut stock_box = StockBox::new(100 + id, fillet.clone(), "L-2504", Decimal::from(10));
        if let Some(pallet_id) = pallet {
            stock_box = stock_box.with_pallet(pallet_id);
        }
        repo.insert_box(stock_box);
    }

    repo.insert_cost(ProductionCost::new(
        1,
        CostScope::Record(2),
        CostType::Labor,
        "Fileteado manual",
        CostBasis::PerKg(Decimal::new(85, 2)),
    ));
    repo.insert_cost(ProductionCost::new(
        2,
        CostScope::Production(1),
        CostType::Packaging,
        "Cajas",
        CostBasis::Absolute(Decimal::from(36)),
    ));

    Ok(repo)
}
