//! 節點與批次產率計算

use rust_decimal::Decimal;
use serde::Serialize;
use trace_core::decimal::percentage;
use trace_core::{LotSnapshot, RecordId, ReconciliationConfig};

use crate::allocation::{LotAllocations, Quantity};

/// 單一製程紀錄的投入/產出/損耗
///
/// 投入重量只計算消耗的庫存箱（`ProductionInput`），父產出消耗另計於
/// `consumed_*`，不併入損耗計算。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTotals {
    pub input_weight: Decimal,
    pub input_boxes: u64,
    pub consumed_weight: Decimal,
    pub consumed_boxes: u64,
    pub output_weight: Decimal,
    pub output_boxes: u64,
    /// 投入 - 產出（負值表示增重）
    pub waste: Decimal,
    pub waste_percentage: Decimal,
}

impl NodeTotals {
    /// 計算指定紀錄的合計（完整精度）
    pub fn for_record(snapshot: &LotSnapshot, record_id: RecordId) -> Self {
        let mut input = Quantity::ZERO;
        for production_input in snapshot.inputs_of(record_id) {
            match snapshot.input_box(production_input.box_id) {
                Some(stock_box) => input += Quantity::new(stock_box.net_weight, 1),
                None => tracing::debug!(
                    "投入 {} 參照的箱 {} 不存在",
                    production_input.id,
                    production_input.box_id
                ),
            }
        }

        let consumed: Quantity = snapshot
            .consumptions_by(record_id)
            .map(|c| Quantity::new(c.consumed_weight_kg, u64::from(c.consumed_boxes)))
            .sum();

        let output: Quantity = snapshot
            .outputs_of(record_id)
            .map(|o| Quantity::new(o.weight_kg, u64::from(o.boxes)))
            .sum();

        let waste = input.weight - output.weight;

        Self {
            input_weight: input.weight,
            input_boxes: input.boxes,
            consumed_weight: consumed.weight,
            consumed_boxes: consumed.boxes,
            output_weight: output.weight,
            output_boxes: output.boxes,
            waste,
            waste_percentage: percentage(waste, input.weight),
        }
    }

    pub fn rounded(&self, config: &ReconciliationConfig) -> Self {
        Self {
            input_weight: config.round(self.input_weight),
            consumed_weight: config.round(self.consumed_weight),
            output_weight: config.round(self.output_weight),
            waste: config.round(self.waste),
            waste_percentage: config.round(self.waste_percentage),
            ..*self
        }
    }
}

/// 批次整體合計
///
/// - 投入：所有紀錄消耗的庫存箱（不含節點間的產出消耗）
/// - 產出：只計最終節點的產出（避免重複計算被再加工的中間產出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTotals {
    pub total_input_weight: Decimal,
    pub total_output_weight: Decimal,
    pub total_waste: Decimal,
    pub total_waste_percentage: Decimal,
    pub total_yield: Decimal,
    pub total_yield_percentage: Decimal,
    pub total_input_boxes: u64,
    pub total_output_boxes: u64,
    pub total_sales_weight: Decimal,
    pub total_sales_boxes: u64,
    pub total_sales_pallets: u64,
    pub total_stock_weight: Decimal,
    pub total_stock_boxes: u64,
    pub total_stock_pallets: u64,
}

impl GlobalTotals {
    pub fn calculate(
        snapshot: &LotSnapshot,
        allocations: &LotAllocations,
        config: &ReconciliationConfig,
    ) -> Self {
        let input = total_input(snapshot);
        let output = final_output(snapshot);

        let difference = input.weight - output.weight;
        let (waste, yield_gain) = if difference > Decimal::ZERO {
            (difference, Decimal::ZERO)
        } else if difference < Decimal::ZERO {
            (Decimal::ZERO, difference.abs())
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };

        let (sales, sales_pallets) = allocations.sales_totals();
        let (stock, stock_pallets) = allocations.stock_totals();

        Self {
            total_input_weight: config.round(input.weight),
            total_output_weight: config.round(output.weight),
            total_waste: config.round(waste),
            total_waste_percentage: config.round(percentage(waste, input.weight)),
            total_yield: config.round(yield_gain),
            total_yield_percentage: config.round(percentage(yield_gain, input.weight)),
            total_input_boxes: input.boxes,
            total_output_boxes: output.boxes,
            total_sales_weight: config.round(sales.weight),
            total_sales_boxes: sales.boxes,
            total_sales_pallets: sales_pallets as u64,
            total_stock_weight: config.round(stock.weight),
            total_stock_boxes: stock.boxes,
            total_stock_pallets: stock_pallets as u64,
        }
    }
}

/// 所有紀錄消耗的庫存箱合計
pub fn total_input(snapshot: &LotSnapshot) -> Quantity {
    snapshot
        .inputs()
        .iter()
        .filter_map(|i| snapshot.input_box(i.box_id))
        .map(|b| Quantity::new(b.net_weight, 1))
        .sum()
}

/// 最終節點的產出合計
pub fn final_output(snapshot: &LotSnapshot) -> Quantity {
    snapshot
        .final_record_ids()
        .into_iter()
        .flat_map(|id| snapshot.outputs_of(id))
        .map(|o| Quantity::new(o.weight_kg, u64::from(o.boxes)))
        .sum()
}
