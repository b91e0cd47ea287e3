//! 成本彙總

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use trace_core::{
    CostBasis, CostId, CostScope, CostType, LotSnapshot, ProductionCost, RecordId,
    ReconciliationConfig,
};

use crate::totals::final_output;

/// 單筆成本的實際金額
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLine {
    pub cost_id: CostId,
    pub name: String,
    pub cost_type: CostType,
    pub scope: CostScope,
    pub basis: CostBasis,
    pub effective_total: Decimal,
}

/// 成本明細與每公斤成本
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub lines: Vec<CostLine>,
    pub by_type: BTreeMap<CostType, Decimal>,
    pub total_cost: Decimal,
    pub output_weight: Decimal,
    /// 無產出時為 0
    pub cost_per_kg: Decimal,
}

pub struct CostCalculator<'a> {
    snapshot: &'a LotSnapshot,
    config: &'a ReconciliationConfig,
}

impl<'a> CostCalculator<'a> {
    pub fn new(snapshot: &'a LotSnapshot, config: &'a ReconciliationConfig) -> Self {
        Self { snapshot, config }
    }

    /// 成本的實際總額
    ///
    /// 每公斤成本乘以範圍內的產出重量：紀錄成本用該紀錄的產出，批次成本用
    /// 最終節點的產出。
    pub fn effective_total(&self, cost: &ProductionCost) -> Decimal {
        match cost.basis {
            CostBasis::Absolute(total) => total,
            CostBasis::PerKg(_) => cost.basis.effective_total(self.scope_output(cost.scope)),
        }
    }

    /// 單一製程紀錄的成本
    pub fn record_cost_breakdown(&self, record_id: RecordId) -> CostBreakdown {
        let costs = self
            .snapshot
            .costs()
            .iter()
            .filter(|c| c.scope == CostScope::Record(record_id));
        self.breakdown(costs, self.scope_output(CostScope::Record(record_id)))
    }

    /// 整個批次的成本（含各紀錄成本），每公斤成本以最終產出計算
    pub fn production_cost_breakdown(&self) -> CostBreakdown {
        let output = final_output(self.snapshot).weight;
        let breakdown = self.breakdown(self.snapshot.costs().iter(), output);

        tracing::debug!(
            "批次 {} 成本：{} 筆，總額 {}，每公斤 {}",
            self.snapshot.lot(),
            breakdown.lines.len(),
            breakdown.total_cost,
            breakdown.cost_per_kg
        );

        breakdown
    }

    fn scope_output(&self, scope: CostScope) -> Decimal {
        match scope {
            CostScope::Record(record_id) => self
                .snapshot
                .outputs_of(record_id)
                .map(|o| o.weight_kg)
                .sum(),
            CostScope::Production(_) => final_output(self.snapshot).weight,
        }
    }

    fn breakdown<'c>(
        &self,
        costs: impl Iterator<Item = &'c ProductionCost>,
        output_weight: Decimal,
    ) -> CostBreakdown {
        let mut lines = Vec::new();
        let mut by_type: BTreeMap<CostType, Decimal> = BTreeMap::new();
        let mut total = Decimal::ZERO;

        for cost in costs {
            let amount = self.effective_total(cost);
            total += amount;
            *by_type.entry(cost.cost_type).or_default() += amount;
            lines.push(CostLine {
                cost_id: cost.id,
                name: cost.name.clone(),
                cost_type: cost.cost_type,
                scope: cost.scope,
                basis: cost.basis,
                effective_total: self.config.round(amount),
            });
        }

        let cost_per_kg = if output_weight.is_zero() {
            Decimal::ZERO
        } else {
            total / output_weight
        };

        CostBreakdown {
            lines,
            by_type: by_type
                .into_iter()
                .map(|(k, v)| (k, self.config.round(v)))
                .collect(),
            total_cost: self.config.round(total),
            output_weight: self.config.round(output_weight),
            cost_per_kg: self.config.round(cost_per_kg),
        }
    }
}
