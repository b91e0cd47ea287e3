//! 批次主計算器

use trace_core::{LotSnapshot, RecordId, ReconciliationConfig, Result};

use crate::allocation::LotAllocations;
use crate::cost::{CostBreakdown, CostCalculator};
use crate::diagram::{DiagramAssembler, ProcessDiagram};
use crate::reconciliation::DetailedReconciliation;
use crate::totals::GlobalTotals;
use crate::tree::{RecordNode, TreeBuilder};

/// 生產批次計算器
///
/// 所有計算都是快照的純函數，可重複呼叫，結果每次重新建立。
pub struct ProductionCalculator {
    /// 批次快照
    snapshot: LotSnapshot,

    /// 對帳配置
    config: ReconciliationConfig,
}

impl ProductionCalculator {
    /// 創建新的批次計算器
    pub fn new(snapshot: LotSnapshot, config: ReconciliationConfig) -> Self {
        Self { snapshot, config }
    }

    pub fn snapshot(&self) -> &LotSnapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// 建立製程樹
    pub fn build_process_tree(&self) -> Result<Vec<RecordNode>> {
        TreeBuilder::new(&self.snapshot, &self.config).build()
    }

    /// 四種去向彙整
    pub fn allocations(&self) -> LotAllocations {
        LotAllocations::assemble(&self.snapshot)
    }

    /// 批次合計
    pub fn calculate_global_totals(&self) -> GlobalTotals {
        tracing::info!("開始批次 {} 合計計算", self.snapshot.lot());
        let start_time = std::time::Instant::now();

        let allocations = self.allocations();
        let totals = GlobalTotals::calculate(&self.snapshot, &allocations, &self.config);

        tracing::info!(
            "批次合計完成：投入 {} kg，產出 {} kg，耗時 {:?}",
            totals.total_input_weight,
            totals.total_output_weight,
            start_time.elapsed()
        );

        totals
    }

    /// 依產品對帳
    pub fn get_detailed_reconciliation_by_product(&self) -> DetailedReconciliation {
        tracing::info!("開始批次 {} 產品對帳", self.snapshot.lot());
        let start_time = std::time::Instant::now();

        let allocations = self.allocations();
        let result = DetailedReconciliation::calculate(&self.snapshot, &allocations, &self.config);

        tracing::info!(
            "產品對帳完成：{} 項產品，整體狀態 {}，耗時 {:?}",
            result.summary.total_products,
            result.summary.overall_status.as_str(),
            start_time.elapsed()
        );

        result
    }

    /// 完整流程圖：製程樹 + 對帳子節點 + 孤兒節點 + 批次合計
    pub fn calculate_diagram(&self) -> Result<ProcessDiagram> {
        tracing::info!(
            "開始批次 {} 流程圖計算：紀錄 {} 筆，批號箱 {} 箱",
            self.snapshot.lot(),
            self.snapshot.records().count(),
            self.snapshot.lot_boxes().len()
        );
        let start_time = std::time::Instant::now();

        // Step 1: 製程樹
        tracing::debug!("Step 1: 建立製程樹");
        let tree = self.build_process_tree()?;

        // Step 2: 去向彙整
        tracing::debug!("Step 2: 去向彙整");
        let allocations = self.allocations();

        // Step 3: 批次合計
        tracing::debug!("Step 3: 批次合計");
        let totals = GlobalTotals::calculate(&self.snapshot, &allocations, &self.config);

        // Step 4: 掛載對帳子節點
        tracing::debug!("Step 4: 掛載對帳子節點");
        let diagram =
            DiagramAssembler::new(&self.snapshot, &allocations, &self.config).assemble(tree, totals);

        tracing::info!(
            "流程圖計算完成，耗時 {:?}，孤兒節點 {} 個",
            start_time.elapsed(),
            diagram.orphan_nodes.len()
        );

        Ok(diagram)
    }

    /// 批次成本
    pub fn cost_summary(&self) -> CostBreakdown {
        CostCalculator::new(&self.snapshot, &self.config).production_cost_breakdown()
    }

    /// 單一紀錄成本
    pub fn record_cost_summary(&self, record_id: RecordId) -> CostBreakdown {
        CostCalculator::new(&self.snapshot, &self.config).record_cost_breakdown(record_id)
    }
}
