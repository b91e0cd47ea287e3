//! 製程樹建構
//!
//! 由快照建立不可變的 [`RecordNode`] 樹。資料來源不阻止
//! `parent_record_id` 形成循環，因此建構前先檢查父鏈，遍歷時再以
//! visited 集合與深度上限保護。

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use trace_core::{
    BoxId, ConsumptionId, InputId, LotSnapshot, OutputId, PalletId, Process, ProductRef,
    ProductionId, ProductionOutput, ProductionRecord, RecordId, ReconciliationConfig, Result,
    SourceRef, TraceError,
};

use crate::diagram::ReconciliationNode;
use crate::totals::NodeTotals;

/// 投入箱
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputView {
    pub input_id: InputId,
    pub box_id: BoxId,
    pub product: Option<ProductRef>,
    pub lot: Option<String>,
    pub net_weight: Decimal,
    pub pallet_id: Option<PalletId>,
}

/// 本紀錄對父產出的消耗
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionView {
    pub consumption_id: ConsumptionId,
    pub production_output_id: OutputId,
    /// 被消耗產出所屬的紀錄（產出不在本批次時為空）
    pub source_record_id: Option<RecordId>,
    pub product: Option<ProductRef>,
    pub consumed_weight: Decimal,
    pub consumed_boxes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceView {
    pub source: SourceRef,
    pub weight: Decimal,
    pub percentage: Decimal,
}

/// 產出及其下游消耗狀態
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputView {
    pub output_id: OutputId,
    pub product: ProductRef,
    pub lot_id: Option<String>,
    pub boxes: u32,
    pub weight: Decimal,
    pub average_weight_per_box: Decimal,
    pub consumed_weight: Decimal,
    pub consumed_boxes: u64,
    pub remaining_weight: Decimal,
    pub remaining_boxes: i64,
    pub is_complete: bool,
    pub is_over_consumed: bool,
    pub sources: Vec<SourceView>,
}

/// 製程樹節點
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordNode {
    pub id: RecordId,
    pub production_id: ProductionId,
    pub parent_record_id: Option<RecordId>,
    pub process: Option<Process>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub is_root: bool,
    pub is_final: bool,
    pub inputs: Vec<InputView>,
    pub parent_consumptions: Vec<ConsumptionView>,
    pub outputs: Vec<OutputView>,
    pub totals: NodeTotals,
    pub children: Vec<RecordNode>,
    /// 掛載於最終節點的對帳子節點
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attached: Vec<ReconciliationNode>,
}

impl RecordNode {
    /// 深度優先搜尋節點
    pub fn find(&self, record_id: RecordId) -> Option<&RecordNode> {
        if self.id == record_id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(record_id))
    }

    /// 子樹節點數（含自身）
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(RecordNode::node_count).sum::<usize>()
    }

    /// 子樹中的最終節點ID（前序）
    pub fn final_ids(&self) -> Vec<RecordId> {
        let mut ids = Vec::new();
        self.collect_final_ids(&mut ids);
        ids
    }

    fn collect_final_ids(&self, ids: &mut Vec<RecordId>) {
        if self.is_final {
            ids.push(self.id);
        }
        for child in &self.children {
            child.collect_final_ids(ids);
        }
    }
}

/// 製程樹建構器
pub struct TreeBuilder<'a> {
    snapshot: &'a LotSnapshot,
    config: &'a ReconciliationConfig,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(snapshot: &'a LotSnapshot, config: &'a ReconciliationConfig) -> Self {
        Self { snapshot, config }
    }

    /// 建立整個批次的製程樹（根節點依ID排序）
    pub fn build(&self) -> Result<Vec<RecordNode>> {
        self.ensure_acyclic()?;

        let mut visited = BTreeSet::new();
        let mut roots = Vec::new();

        for record in self.snapshot.root_records() {
            if let Some(parent_id) = record.parent_record_id {
                tracing::warn!(
                    "紀錄 {} 的父紀錄 {} 不在批次 {} 中，視為根節點",
                    record.id,
                    parent_id,
                    self.snapshot.lot()
                );
            }
            roots.push(self.build_node(record, 1, &mut visited)?);
        }

        tracing::debug!(
            "製程樹建構完成：根節點 {} 個，節點 {} 個",
            roots.len(),
            visited.len()
        );

        Ok(roots)
    }

    /// 沿每筆紀錄的父鏈檢查循環
    fn ensure_acyclic(&self) -> Result<()> {
        for record in self.snapshot.records() {
            let mut chain = BTreeSet::from([record.id]);
            let mut current = record.parent_record_id;

            while let Some(parent_id) = current {
                let Some(parent) = self.snapshot.record(parent_id) else {
                    break;
                };
                if !chain.insert(parent_id) {
                    tracing::warn!("紀錄 {} 的父鏈形成循環", record.id);
                    return Err(TraceError::CyclicTree {
                        record_id: parent_id,
                    });
                }
                current = parent.parent_record_id;
            }
        }
        Ok(())
    }

    fn build_node(
        &self,
        record: &ProductionRecord,
        depth: usize,
        visited: &mut BTreeSet<RecordId>,
    ) -> Result<RecordNode> {
        if depth > self.config.max_tree_depth {
            return Err(TraceError::TreeTooDeep {
                record_id: record.id,
                depth,
            });
        }
        if !visited.insert(record.id) {
            return Err(TraceError::CyclicTree {
                record_id: record.id,
            });
        }

        let mut children = Vec::new();
        for child_id in self.snapshot.children_of(record.id) {
            let child = self
                .snapshot
                .record(*child_id)
                .ok_or(TraceError::RecordNotFound(*child_id))?;
            children.push(self.build_node(child, depth + 1, visited)?);
        }

        let is_root = record
            .parent_record_id
            .map_or(true, |parent_id| self.snapshot.record(parent_id).is_none());

        Ok(RecordNode {
            id: record.id,
            production_id: record.production_id,
            parent_record_id: record.parent_record_id,
            process: record.process.clone(),
            started_at: record.started_at,
            finished_at: record.finished_at,
            is_root,
            is_final: self.snapshot.is_final(record.id),
            inputs: self.input_views(record.id),
            parent_consumptions: self.consumption_views(record.id),
            outputs: self
                .snapshot
                .outputs_of(record.id)
                .map(|o| self.output_view(o))
                .collect(),
            totals: NodeTotals::for_record(self.snapshot, record.id).rounded(self.config),
            children,
            attached: Vec::new(),
        })
    }

    fn input_views(&self, record_id: RecordId) -> Vec<InputView> {
        self.snapshot
            .inputs_of(record_id)
            .map(|input| {
                let stock_box = self.snapshot.input_box(input.box_id);
                InputView {
                    input_id: input.id,
                    box_id: input.box_id,
                    product: stock_box.map(|b| b.product.clone()),
                    lot: stock_box.map(|b| b.lot.clone()),
                    net_weight: stock_box
                        .map(|b| self.config.round(b.net_weight))
                        .unwrap_or_default(),
                    pallet_id: stock_box.and_then(|b| b.pallet_id),
                }
            })
            .collect()
    }

    fn consumption_views(&self, record_id: RecordId) -> Vec<ConsumptionView> {
        self.snapshot
            .consumptions_by(record_id)
            .map(|consumption| {
                let output = self.snapshot.output(consumption.production_output_id);
                ConsumptionView {
                    consumption_id: consumption.id,
                    production_output_id: consumption.production_output_id,
                    source_record_id: output.map(|o| o.production_record_id),
                    product: output.map(|o| o.product.clone()),
                    consumed_weight: self.config.round(consumption.consumed_weight_kg),
                    consumed_boxes: consumption.consumed_boxes,
                }
            })
            .collect()
    }

    fn output_view(&self, output: &ProductionOutput) -> OutputView {
        let mut consumed_weight = Decimal::ZERO;
        let mut consumed_boxes = 0u64;
        for consumption in self.snapshot.consumptions_of_output(output.id) {
            consumed_weight += consumption.consumed_weight_kg;
            consumed_boxes += u64::from(consumption.consumed_boxes);
        }

        let is_over_consumed = consumed_weight > output.weight_kg;
        if is_over_consumed {
            tracing::warn!(
                "產出 {} 被消耗 {} kg，超過產出重量 {} kg",
                output.id,
                consumed_weight,
                output.weight_kg
            );
        }

        let sources = self
            .snapshot
            .sources_of_output(output.id)
            .map(|s| SourceView {
                source: s.source,
                weight: self.config.round(s.contribution.weight_kg),
                percentage: self.config.round(s.contribution.percentage),
            })
            .collect();

        OutputView {
            output_id: output.id,
            product: output.product.clone(),
            lot_id: output.lot_id.clone(),
            boxes: output.boxes,
            weight: self.config.round(output.weight_kg),
            average_weight_per_box: self.config.round(output.average_weight_per_box()),
            consumed_weight: self.config.round(consumed_weight),
            consumed_boxes,
            remaining_weight: self.config.round(output.weight_kg - consumed_weight),
            remaining_boxes: i64::from(output.boxes) - consumed_boxes as i64,
            is_complete: consumed_boxes >= u64::from(output.boxes)
                && consumed_weight >= output.weight_kg,
            is_over_consumed,
            sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_core::{
        InMemoryRepository, ProcessType, Production, ProductionInput, ProductionOutputConsumption,
        ProductionOutputSource, SourceType, StockBox,
    };

    fn product(id: u64, name: &str) -> ProductRef {
        ProductRef::new(id, name)
    }

    fn repository() -> InMemoryRepository {
        let mut repo = InMemoryRepository::new();
        repo.insert_production(Production::new(1, "L1"));
        repo.insert_record(
            ProductionRecord::new(1, 1)
                .with_process(Process::new(1, "Recepción", ProcessType::Starting)),
        );
        repo.insert_record(
            ProductionRecord::new(3, 1)
                .with_parent(1)
                .with_process(Process::new(3, "Envasado", ProcessType::Final)),
        );
        repo.insert_record(ProductionRecord::new(2, 1).with_parent(1));

        repo.insert_box(StockBox::new(1, product(1, "Merluza entera"), "R1", Decimal::from(60)).with_pallet(4));
        repo.insert_box(StockBox::new(2, product(1, "Merluza entera"), "R1", Decimal::from(40)));
        repo.insert_input(ProductionInput::new(1, 1, 1));
        repo.insert_input(ProductionInput::new(2, 1, 2));

        let intermediate = ProductionOutput::new(1, 1, product(2, "Merluza limpia"), 4, Decimal::from(90));
        repo.insert_output(intermediate.clone());
        repo.insert_source(
            ProductionOutputSource::from_parts(1, &intermediate, SourceType::StockBox, Some(1), None, None, Some(Decimal::from(60)))
                .unwrap(),
        );
        repo.insert_consumption(ProductionOutputConsumption::new(1, 2, 1, Decimal::from(50), 2));
        repo.insert_consumption(ProductionOutputConsumption::new(2, 3, 1, Decimal::from(40), 2));
        repo.insert_output(ProductionOutput::new(2, 2, product(3, "Filete"), 2, Decimal::from(45)));
        repo.insert_output(ProductionOutput::new(3, 3, product(4, "Porción"), 3, Decimal::from(36)));
        repo
    }

    fn build(repo: &InMemoryRepository) -> Result<Vec<RecordNode>> {
        let snapshot = LotSnapshot::load(repo, 1)?;
        let config = ReconciliationConfig::default();
        TreeBuilder::new(&snapshot, &config).build()
    }

    #[test]
    fn test_build_tree_structure() {
        let roots = build(&repository()).unwrap();

        assert_eq!(roots.len(), 1);
        let root = &roots[0];
        assert!(root.is_root);
        assert!(!root.is_final);
        assert_eq!(root.node_count(), 3);
        assert_eq!(
            root.children.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(root.final_ids(), vec![2, 3]);
        assert_eq!(root.process.as_ref().map(|p| p.name.as_str()), Some("Recepción"));

        assert_eq!(root.inputs.len(), 2);
        assert_eq!(root.inputs[0].pallet_id, Some(4));
        assert_eq!(root.totals.input_weight, Decimal::from(100));
        assert_eq!(root.totals.waste, Decimal::from(10));
    }

    #[test]
    fn test_output_consumption_status() {
        let roots = build(&repository()).unwrap();
        let output = &roots[0].outputs[0];

        assert_eq!(output.consumed_weight, Decimal::from(90));
        assert_eq!(output.consumed_boxes, 4);
        assert_eq!(output.remaining_weight, Decimal::ZERO);
        assert!(output.is_complete);
        assert!(!output.is_over_consumed);
        assert_eq!(output.sources.len(), 1);
        assert_eq!(output.sources[0].weight, Decimal::from(54));

        let child = roots[0].find(3).unwrap();
        assert!(child.is_final);
        assert_eq!(child.parent_consumptions[0].source_record_id, Some(1));
        assert_eq!(child.parent_consumptions[0].consumed_weight, Decimal::from(40));
    }

    #[test]
    fn test_over_consumed_output_is_flagged() {
        let mut repo = repository();
        repo.insert_consumption(ProductionOutputConsumption::new(3, 3, 1, Decimal::from(5), 0));

        let roots = build(&repo).unwrap();
        let output = &roots[0].outputs[0];
        assert!(output.is_over_consumed);
        assert_eq!(output.remaining_weight, Decimal::from(-5));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut repo = InMemoryRepository::new();
        repo.insert_production(Production::new(1, "L1"));
        repo.insert_record(ProductionRecord::new(1, 1).with_parent(2));
        repo.insert_record(ProductionRecord::new(2, 1).with_parent(1));

        assert!(matches!(build(&repo), Err(TraceError::CyclicTree { .. })));
    }

    #[test]
    fn test_self_parent_is_rejected() {
        let mut repo = InMemoryRepository::new();
        repo.insert_production(Production::new(1, "L1"));
        repo.insert_record(ProductionRecord::new(1, 1));
        repo.insert_record(ProductionRecord::new(2, 1).with_parent(2));

        assert!(matches!(
            build(&repo),
            Err(TraceError::CyclicTree { record_id: 2 })
        ));
    }

    #[test]
    fn test_depth_guard() {
        let mut repo = InMemoryRepository::new();
        repo.insert_production(Production::new(1, "L1"));
        repo.insert_record(ProductionRecord::new(1, 1));
        for id in 2..=5 {
            repo.insert_record(ProductionRecord::new(id, 1).with_parent(id - 1));
        }
        let snapshot = LotSnapshot::load(&repo, 1).unwrap();

        let shallow = ReconciliationConfig::default().with_max_tree_depth(3);
        let result = TreeBuilder::new(&snapshot, &shallow).build();
        assert!(matches!(
            result,
            Err(TraceError::TreeTooDeep { record_id: 4, depth: 4 })
        ));

        let deep = ReconciliationConfig::default().with_max_tree_depth(5);
        assert!(TreeBuilder::new(&snapshot, &deep).build().is_ok());
    }

    #[test]
    fn test_record_with_foreign_parent_is_root() {
        let mut repo = InMemoryRepository::new();
        repo.insert_production(Production::new(1, "L1"));
        repo.insert_production(Production::new(2, "L2"));
        repo.insert_record(ProductionRecord::new(10, 2));
        repo.insert_record(ProductionRecord::new(1, 1).with_parent(10));
        repo.insert_output(ProductionOutput::new(1, 1, product(3, "Filete"), 1, Decimal::from(5)));

        let roots = build(&repo).unwrap();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].is_root);
        assert!(roots[0].is_final);
        assert_eq!(roots[0].parent_record_id, Some(10));
    }
}
