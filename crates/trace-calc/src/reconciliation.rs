//! 產品對帳：產出數量 vs 銷售、庫存、再加工
//!
//! 所有累加以完整精度進行，只在輸出結構時四捨五入。

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trace_core::decimal::percentage;
use trace_core::{BoxId, LotSnapshot, ProductId, ProductRef, ReconciliationConfig};

use crate::allocation::{LotAllocations, Quantity};

/// 對帳狀態（依嚴重度排序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
    Ok,
    Warning,
    Error,
}

impl ReconciliationStatus {
    /// 依差額分類
    ///
    /// - 差額在容差內：ok
    /// - 無產出卻有差額：error
    /// - 差額百分比在警告門檻內：warning
    /// - 其他：error
    pub fn classify(
        balance: Decimal,
        balance_percentage: Decimal,
        produced_weight: Decimal,
        config: &ReconciliationConfig,
    ) -> Self {
        if balance.abs() <= config.balance_tolerance_kg {
            Self::Ok
        } else if produced_weight.is_zero() {
            Self::Error
        } else if balance_percentage.abs() <= config.warning_threshold_percentage {
            Self::Warning
        } else {
            Self::Error
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// 差額
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub weight: Decimal,
    pub percentage: Decimal,
}

/// 單一產品對帳結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductReconciliation {
    pub product: ProductRef,
    pub produced: Quantity,
    pub in_sales: Quantity,
    pub in_stock: Quantity,
    pub reprocessed: Quantity,
    pub balance: Balance,
    /// 差額中可由遺失箱說明的部分（不計入已入帳）
    pub missing: Quantity,
    pub missing_box_ids: Vec<BoxId>,
    pub status: ReconciliationStatus,
    pub message: String,
}

impl ProductReconciliation {
    /// 以完整精度計算單一產品的差額與狀態，輸出時四捨五入
    pub fn compute(
        product: ProductRef,
        produced: Quantity,
        allocations: &LotAllocations,
        config: &ReconciliationConfig,
    ) -> Self {
        let in_sales = allocations.sales_of(product.id);
        let in_stock = allocations.stock_of(product.id);
        let reprocessed = allocations.reprocessed_of(product.id);
        let missing = allocations.missing_of(product.id);

        let balance = produced.weight - (in_sales.weight + in_stock.weight + reprocessed.weight);
        let balance_percentage = percentage(balance, produced.weight);
        let status =
            ReconciliationStatus::classify(balance, balance_percentage, produced.weight, config);

        Self {
            message: balance_message(status, balance, balance_percentage, config),
            missing_box_ids: allocations.missing_box_ids(product.id),
            product,
            produced: produced.rounded(config),
            in_sales: in_sales.rounded(config),
            in_stock: in_stock.rounded(config),
            reprocessed: reprocessed.rounded(config),
            balance: Balance {
                weight: config.round(balance),
                percentage: config.round(balance_percentage),
            },
            missing: missing.rounded(config),
            status,
        }
    }
}

/// 對帳彙總
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationSummary {
    pub total_products: usize,
    pub products_ok: usize,
    pub products_warning: usize,
    pub products_error: usize,
    pub total_produced_weight: Decimal,
    pub total_contabilized_weight: Decimal,
    pub total_balance_weight: Decimal,
    pub total_missing_weight: Decimal,
    pub overall_status: ReconciliationStatus,
}

/// 批次完整對帳結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailedReconciliation {
    pub products: Vec<ProductReconciliation>,
    pub summary: ReconciliationSummary,
}

impl DetailedReconciliation {
    /// 對最終節點產出的每個產品進行對帳（依產品ID排序）
    pub fn calculate(
        snapshot: &LotSnapshot,
        allocations: &LotAllocations,
        config: &ReconciliationConfig,
    ) -> Self {
        let produced = produced_by_product(snapshot);

        let mut products = Vec::with_capacity(produced.len());
        let mut total_produced = Decimal::ZERO;
        let mut total_contabilized = Decimal::ZERO;
        let mut total_missing = Decimal::ZERO;

        for (product_id, (product, produced)) in produced {
            let entry = ProductReconciliation::compute(product, produced, allocations, config);
            if entry.status == ReconciliationStatus::Error {
                tracing::warn!(
                    "產品 {}（{}）對帳異常：{}",
                    entry.product.id,
                    entry.product.name,
                    entry.message
                );
            }

            total_produced += produced.weight;
            total_contabilized += allocations.contabilized_of(product_id).weight;
            total_missing += allocations.missing_of(product_id).weight;
            products.push(entry);
        }

        let mut summary = summarize(&products, total_produced, total_contabilized, config);
        summary.total_missing_weight = config.round(total_missing);
        Self { products, summary }
    }

    pub fn product(&self, product_id: ProductId) -> Option<&ProductReconciliation> {
        self.products.iter().find(|p| p.product.id == product_id)
    }
}

/// 最終節點產出依產品彙總
pub fn produced_by_product(snapshot: &LotSnapshot) -> BTreeMap<ProductId, (ProductRef, Quantity)> {
    let mut produced: BTreeMap<ProductId, (ProductRef, Quantity)> = BTreeMap::new();

    for record_id in snapshot.final_record_ids() {
        for output in snapshot.outputs_of(record_id) {
            let entry = produced
                .entry(output.product.id)
                .or_insert_with(|| (output.product.clone(), Quantity::ZERO));
            entry.1 += Quantity::new(output.weight_kg, u64::from(output.boxes));
        }
    }

    produced
}

fn balance_message(
    status: ReconciliationStatus,
    balance: Decimal,
    balance_percentage: Decimal,
    config: &ReconciliationConfig,
) -> String {
    if status == ReconciliationStatus::Ok {
        return "對帳平衡".to_string();
    }

    let weight = config.round(balance.abs());
    let pct = config.round(balance_percentage.abs());
    if balance > Decimal::ZERO {
        format!("短少 {weight} kg（{pct}%），產出未完全入帳")
    } else {
        format!("超出 {weight} kg（{pct}%），入帳數量多於產出")
    }
}

fn summarize(
    products: &[ProductReconciliation],
    total_produced: Decimal,
    total_contabilized: Decimal,
    config: &ReconciliationConfig,
) -> ReconciliationSummary {
    let count = |status: ReconciliationStatus| products.iter().filter(|p| p.status == status).count();

    let total_balance = total_produced - total_contabilized;
    let aggregate = ReconciliationStatus::classify(
        total_balance,
        percentage(total_balance, total_produced),
        total_produced,
        config,
    );
    let worst = products
        .iter()
        .map(|p| p.status)
        .max()
        .unwrap_or(ReconciliationStatus::Ok);

    ReconciliationSummary {
        total_products: products.len(),
        products_ok: count(ReconciliationStatus::Ok),
        products_warning: count(ReconciliationStatus::Warning),
        products_error: count(ReconciliationStatus::Error),
        total_produced_weight: config.round(total_produced),
        total_contabilized_weight: config.round(total_contabilized),
        total_balance_weight: config.round(total_balance),
        total_missing_weight: Decimal::ZERO,
        overall_status: worst.max(aggregate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use trace_core::{
        InMemoryRepository, Order, Pallet, PalletState, Production, ProductionInput,
        ProductionOutput, ProductionRecord, StockBox, Store,
    };

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[rstest]
    #[case("0", "0", "90", ReconciliationStatus::Ok)]
    #[case("0.01", "0.01", "90", ReconciliationStatus::Ok)]
    #[case("-0.01", "-0.01", "90", ReconciliationStatus::Ok)]
    #[case("4.5", "5", "90", ReconciliationStatus::Warning)]
    #[case("-4.5", "-5", "90", ReconciliationStatus::Warning)]
    #[case("4.6", "5.11", "90", ReconciliationStatus::Error)]
    #[case("35", "38.89", "90", ReconciliationStatus::Error)]
    #[case("-3", "0", "0", ReconciliationStatus::Error)]
    fn test_classify(
        #[case] balance: &str,
        #[case] pct: &str,
        #[case] produced: &str,
        #[case] expected: ReconciliationStatus,
    ) {
        let config = ReconciliationConfig::default();
        assert_eq!(
            ReconciliationStatus::classify(dec(balance), dec(pct), dec(produced), &config),
            expected
        );
    }

    /// 批次 L1：根紀錄消耗 100 kg 產出 90 kg 產品 P（3 箱）
    fn lot_l1(stocked: &str) -> LotSnapshot {
        let p = ProductRef::new(1, "P");
        let mut repo = InMemoryRepository::new();
        repo.insert_production(Production::new(1, "L1"));
        repo.insert_record(ProductionRecord::new(1, 1));
        repo.insert_box(StockBox::new(10, ProductRef::new(9, "Raw"), "R", Decimal::from(50)));
        repo.insert_box(StockBox::new(11, ProductRef::new(9, "Raw"), "R", Decimal::from(50)));
        repo.insert_input(ProductionInput::new(1, 1, 10));
        repo.insert_input(ProductionInput::new(2, 1, 11));
        repo.insert_output(ProductionOutput::new(1, 1, p.clone(), 3, Decimal::from(90)));

        repo.insert_pallet(Pallet::new(1, PalletState::Shipped).with_order(1));
        repo.insert_pallet(Pallet::new(2, PalletState::Stored).with_store(1));
        repo.insert_order(Order::new(1));
        repo.insert_store(Store::new(1, "Cámara"));
        repo.insert_box(StockBox::new(1, p.clone(), "L1", Decimal::from(25)).with_pallet(1));
        repo.insert_box(StockBox::new(2, p.clone(), "L1", dec(stocked)).with_pallet(2));
        repo.insert_box(StockBox::new(3, p, "L1", Decimal::from(35)));

        LotSnapshot::load(&repo, 1).unwrap()
    }

    fn reconcile(snapshot: &LotSnapshot) -> DetailedReconciliation {
        DetailedReconciliation::calculate(
            snapshot,
            &LotAllocations::assemble(snapshot),
            &ReconciliationConfig::default(),
        )
    }

    #[test]
    fn test_short_balance_is_error() {
        let result = reconcile(&lot_l1("30"));
        let p = result.product(1).unwrap();

        assert_eq!(p.produced, Quantity::new(Decimal::from(90), 3));
        assert_eq!(p.in_sales.weight, Decimal::from(25));
        assert_eq!(p.in_stock.weight, Decimal::from(30));
        assert_eq!(p.reprocessed.weight, Decimal::ZERO);
        assert_eq!(p.balance.weight, Decimal::from(35));
        assert_eq!(p.balance.percentage, dec("38.89"));
        assert_eq!(p.status, ReconciliationStatus::Error);
        assert!(p.message.starts_with("短少 35 kg"));

        assert_eq!(result.summary.total_products, 1);
        assert_eq!(result.summary.products_error, 1);
        assert_eq!(result.summary.total_contabilized_weight, Decimal::from(55));
        assert_eq!(result.summary.overall_status, ReconciliationStatus::Error);
    }

    #[test]
    fn test_missing_boxes_reported_beside_balance() {
        let result = reconcile(&lot_l1("30"));
        let p = result.product(1).unwrap();

        // 箱 3（35 kg）未上棧板：說明了全部差額，但不算入帳
        assert_eq!(p.missing, Quantity::new(Decimal::from(35), 1));
        assert_eq!(p.missing_box_ids, vec![3]);
        assert_eq!(p.balance.weight, Decimal::from(35));
        assert_eq!(result.summary.total_missing_weight, Decimal::from(35));

        let json = serde_json::to_value(p).unwrap();
        assert_eq!(json["missingBoxIds"], serde_json::json!([3]));
        assert_eq!(json["missing"]["boxes"], 1);
    }

    #[test]
    fn test_over_accounted_balance() {
        let result = reconcile(&lot_l1("100"));
        let p = result.product(1).unwrap();

        assert_eq!(p.balance.weight, Decimal::from(-35));
        assert_eq!(p.status, ReconciliationStatus::Error);
        assert!(p.message.starts_with("超出 35 kg"));
    }

    #[test]
    fn test_balance_identity_before_rounding() {
        // 庫存重量帶三位小數，差額以完整精度累加後才四捨五入
        let result = reconcile(&lot_l1("64.996"));
        let p = result.product(1).unwrap();

        assert_eq!(p.balance.weight, Decimal::ZERO);
        assert_eq!(p.status, ReconciliationStatus::Ok);
        assert_eq!(p.message, "對帳平衡");
        assert_eq!(
            p.produced.weight - p.in_sales.weight - p.in_stock.weight - p.reprocessed.weight,
            dec("0.00")
        );
    }

    #[test]
    fn test_no_final_outputs_yields_empty_reconciliation() {
        let mut repo = InMemoryRepository::new();
        repo.insert_production(Production::new(1, "L1"));
        repo.insert_record(ProductionRecord::new(1, 1));
        let snapshot = LotSnapshot::load(&repo, 1).unwrap();

        let result = reconcile(&snapshot);
        assert!(result.products.is_empty());
        assert_eq!(result.summary.overall_status, ReconciliationStatus::Ok);
        assert_eq!(result.summary.total_produced_weight, Decimal::ZERO);
    }

    #[test]
    fn test_serialized_keys() {
        let result = reconcile(&lot_l1("30"));
        let json = serde_json::to_value(&result.products[0]).unwrap();

        assert_eq!(json["product"]["name"], "P");
        assert_eq!(json["produced"]["boxes"], 3);
        assert!(json["inSales"]["weight"].is_string() || json["inSales"]["weight"].is_number());
        assert!(json.get("inStock").is_some());
        assert!(json.get("reprocessed").is_some());
        assert!(json["balance"].get("percentage").is_some());
        assert_eq!(json["status"], "error");

        let summary = serde_json::to_value(&result.summary).unwrap();
        assert_eq!(summary["overallStatus"], "error");
        assert_eq!(summary["productsError"], 1);
    }
}
