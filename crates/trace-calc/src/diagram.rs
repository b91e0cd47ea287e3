//! 流程圖組裝：將對帳子節點掛到最終節點，無法歸屬的產品成為孤兒節點
//!
//! 一個產品只有在恰好由一個最終節點產出時才掛載到該節點；由零個或多個
//! 最終節點產出的產品，其銷售/庫存/再加工/差額資料只出現在孤兒節點中。

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::Serialize;
use trace_core::{LotSnapshot, ProductId, ProductRef, RecordId, ReconciliationConfig};

use crate::allocation::{
    AllocationDetail, LotAllocations, Quantity, ReprocessedAllocation, SalesAllocation,
    StockAllocation,
};
use crate::reconciliation::{produced_by_product, ProductReconciliation};
use crate::totals::GlobalTotals;
use crate::tree::RecordNode;
use crate::TraceWarning;

/// 對帳子節點類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    Sales,
    Stock,
    Reprocessed,
    Balance,
}

impl AttachmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Stock => "stock",
            Self::Reprocessed => "reprocessed",
            Self::Balance => "balance",
        }
    }

    /// 掛載於最終節點的節點ID
    pub fn attached_id(&self, final_record_id: RecordId) -> String {
        format!("{}-{}", self.as_str(), final_record_id)
    }

    /// 孤兒節點ID
    pub fn orphan_id(&self, product_id: ProductId) -> String {
        format!("{}-orphan-{}", self.as_str(), product_id)
    }
}

/// 對帳子節點明細
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "items", rename_all = "lowercase")]
pub enum NodeData {
    Sales(Vec<SalesAllocation>),
    Stock(Vec<StockAllocation>),
    Reprocessed(Vec<ReprocessedAllocation>),
    Balance(Vec<ProductReconciliation>),
}

/// 對帳子節點
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationNode {
    pub id: String,
    pub node_type: AttachmentType,
    /// 掛載的最終節點（孤兒節點為空）
    pub final_record_id: Option<RecordId>,
    /// 孤兒節點所屬產品
    pub product_id: Option<ProductId>,
    pub product_ids: Vec<ProductId>,
    /// 流向節點為合計重量，差額節點為合計差額
    pub weight: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boxes: Option<u64>,
    /// 差額節點：遺失箱合計
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Quantity>,
    pub data: NodeData,
}

/// 完整流程圖
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDiagram {
    pub lot: String,
    pub process_nodes: Vec<RecordNode>,
    pub orphan_nodes: Vec<ReconciliationNode>,
    pub global_totals: GlobalTotals,
    pub warnings: Vec<TraceWarning>,
}

impl ProcessDiagram {
    /// 所有掛載的對帳子節點（前序）
    pub fn attached_nodes(&self) -> Vec<&ReconciliationNode> {
        fn collect<'a>(node: &'a RecordNode, out: &mut Vec<&'a ReconciliationNode>) {
            out.extend(node.attached.iter());
            for child in &node.children {
                collect(child, out);
            }
        }

        let mut nodes = Vec::new();
        for root in &self.process_nodes {
            collect(root, &mut nodes);
        }
        nodes
    }

    pub fn find_node(&self, id: &str) -> Option<&ReconciliationNode> {
        self.attached_nodes()
            .into_iter()
            .chain(self.orphan_nodes.iter())
            .find(|n| n.id == id)
    }
}

/// 流程圖組裝器
pub struct DiagramAssembler<'a> {
    snapshot: &'a LotSnapshot,
    allocations: &'a LotAllocations,
    config: &'a ReconciliationConfig,
}

impl<'a> DiagramAssembler<'a> {
    pub fn new(
        snapshot: &'a LotSnapshot,
        allocations: &'a LotAllocations,
        config: &'a ReconciliationConfig,
    ) -> Self {
        Self {
            snapshot,
            allocations,
            config,
        }
    }

    /// 將對帳子節點掛到製程樹並產生孤兒節點
    pub fn assemble(&self, tree: Vec<RecordNode>, global_totals: GlobalTotals) -> ProcessDiagram {
        let mut warnings = Vec::new();

        let produced = produced_by_product(self.snapshot);
        let producers = self.producers_by_product();

        let mut assigned: BTreeMap<RecordId, Vec<ProductId>> = BTreeMap::new();
        let mut orphaned: Vec<ProductId> = Vec::new();

        let products: BTreeSet<ProductId> = producers
            .keys()
            .copied()
            .chain(self.allocations.product_ids())
            .collect();

        for product_id in products {
            match producers.get(&product_id) {
                Some(records) if records.len() == 1 => {
                    if let Some(record_id) = records.iter().next() {
                        assigned.entry(*record_id).or_default().push(product_id);
                    }
                }
                Some(records) => {
                    tracing::warn!(
                        "產品 {} 由 {} 個最終節點產出，改為孤兒節點",
                        product_id,
                        records.len()
                    );
                    warnings.push(TraceWarning::warning(
                        format!("product-{product_id}"),
                        format!("產品由 {} 個最終節點產出，無法歸屬單一節點", records.len()),
                    ));
                    orphaned.push(product_id);
                }
                None => {
                    warnings.push(TraceWarning::info(
                        format!("product-{product_id}"),
                        "產品有去向紀錄但未由任何最終節點產出".to_string(),
                    ));
                    orphaned.push(product_id);
                }
            }
        }

        let mut attachments: BTreeMap<RecordId, Vec<ReconciliationNode>> = BTreeMap::new();
        for record_id in self.snapshot.final_record_ids() {
            let product_ids = assigned.remove(&record_id).unwrap_or_default();
            let nodes = self.nodes_for(&product_ids, &produced, Placement::Attached(record_id));
            attachments.insert(record_id, nodes);
        }

        let mut orphan_nodes = Vec::new();
        for product_id in orphaned {
            orphan_nodes.extend(self.nodes_for(
                &[product_id],
                &produced,
                Placement::Orphan(product_id),
            ));
        }
        orphan_nodes.sort_by(|a, b| {
            (a.product_id, a.node_type).cmp(&(b.product_id, b.node_type))
        });

        let mut process_nodes = tree;
        for root in &mut process_nodes {
            attach(root, &mut attachments);
            collect_over_consumed(root, &mut warnings);
        }

        tracing::debug!(
            "流程圖組裝完成：最終節點 {} 個，孤兒節點 {} 個，警告 {} 筆",
            self.snapshot.final_record_ids().len(),
            orphan_nodes.len(),
            warnings.len()
        );

        ProcessDiagram {
            lot: self.snapshot.lot().to_string(),
            process_nodes,
            orphan_nodes,
            global_totals,
            warnings,
        }
    }

    /// 每個產品由哪些最終節點產出
    fn producers_by_product(&self) -> BTreeMap<ProductId, BTreeSet<RecordId>> {
        let mut producers: BTreeMap<ProductId, BTreeSet<RecordId>> = BTreeMap::new();
        for record_id in self.snapshot.final_record_ids() {
            for output in self.snapshot.outputs_of(record_id) {
                producers
                    .entry(output.product.id)
                    .or_default()
                    .insert(record_id);
            }
        }
        producers
    }

    /// 產生一組產品的銷售/庫存/再加工/差額節點
    ///
    /// 流向節點只在有資料時產生；掛載時一定產生差額節點，孤兒節點只在
    /// 有產出或入帳時產生。
    fn nodes_for(
        &self,
        product_ids: &[ProductId],
        produced: &BTreeMap<ProductId, (ProductRef, Quantity)>,
        placement: Placement,
    ) -> Vec<ReconciliationNode> {
        let mut nodes = Vec::new();

        let sales: Vec<SalesAllocation> = product_ids
            .iter()
            .filter_map(|id| self.allocations.sales.get(id))
            .flat_map(|groups| groups.values())
            .cloned()
            .collect();
        let stock: Vec<StockAllocation> = product_ids
            .iter()
            .filter_map(|id| self.allocations.stock.get(id))
            .flat_map(|groups| groups.values())
            .cloned()
            .collect();
        let reprocessed: Vec<ReprocessedAllocation> = product_ids
            .iter()
            .filter_map(|id| self.allocations.reprocessed.get(id))
            .flat_map(|groups| groups.values())
            .cloned()
            .collect();

        if !sales.is_empty() {
            nodes.push(self.flow_node(AttachmentType::Sales, placement, product_ids, &sales, NodeData::Sales));
        }
        if !stock.is_empty() {
            nodes.push(self.flow_node(AttachmentType::Stock, placement, product_ids, &stock, NodeData::Stock));
        }
        if !reprocessed.is_empty() {
            nodes.push(self.flow_node(
                AttachmentType::Reprocessed,
                placement,
                product_ids,
                &reprocessed,
                NodeData::Reprocessed,
            ));
        }

        let mut balance = Decimal::ZERO;
        let mut missing = Quantity::ZERO;
        let mut entries = Vec::new();
        for product_id in product_ids {
            let produced_quantity = produced
                .get(product_id)
                .map(|(_, q)| *q)
                .unwrap_or_default();
            let contabilized = self.allocations.contabilized_of(*product_id);
            let product_missing = self.allocations.missing_of(*product_id);
            if produced_quantity.is_zero() && contabilized.is_zero() && product_missing.is_zero() {
                continue;
            }

            let product = produced
                .get(product_id)
                .map(|(p, _)| p.clone())
                .or_else(|| self.allocations.product_ref(*product_id));
            let Some(product) = product else {
                continue;
            };

            balance += produced_quantity.weight - contabilized.weight;
            missing += product_missing;
            entries.push(ProductReconciliation::compute(
                product,
                produced_quantity,
                self.allocations,
                self.config,
            ));
        }

        if !entries.is_empty() || matches!(placement, Placement::Attached(_)) {
            nodes.push(ReconciliationNode {
                id: placement.node_id(AttachmentType::Balance),
                node_type: AttachmentType::Balance,
                final_record_id: placement.final_record_id(),
                product_id: placement.product_id(),
                product_ids: product_ids.to_vec(),
                weight: self.config.round(balance),
                boxes: None,
                missing: Some(missing.rounded(self.config)),
                data: NodeData::Balance(entries),
            });
        }

        nodes
    }

    fn flow_node<T: AllocationDetail>(
        &self,
        node_type: AttachmentType,
        placement: Placement,
        product_ids: &[ProductId],
        items: &[T],
        wrap: fn(Vec<T>) -> NodeData,
    ) -> ReconciliationNode {
        let total: Quantity = items.iter().map(AllocationDetail::quantity).sum();
        ReconciliationNode {
            id: placement.node_id(node_type),
            node_type,
            final_record_id: placement.final_record_id(),
            product_id: placement.product_id(),
            product_ids: product_ids.to_vec(),
            weight: self.config.round(total.weight),
            boxes: Some(total.boxes),
            missing: None,
            data: wrap(items.iter().map(|i| i.rounded(self.config)).collect()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Placement {
    Attached(RecordId),
    Orphan(ProductId),
}

impl Placement {
    fn node_id(&self, node_type: AttachmentType) -> String {
        match *self {
            Self::Attached(record_id) => node_type.attached_id(record_id),
            Self::Orphan(product_id) => node_type.orphan_id(product_id),
        }
    }

    fn final_record_id(&self) -> Option<RecordId> {
        match *self {
            Self::Attached(record_id) => Some(record_id),
            Self::Orphan(_) => None,
        }
    }

    fn product_id(&self) -> Option<ProductId> {
        match *self {
            Self::Attached(_) => None,
            Self::Orphan(product_id) => Some(product_id),
        }
    }
}

fn attach(node: &mut RecordNode, attachments: &mut BTreeMap<RecordId, Vec<ReconciliationNode>>) {
    if let Some(nodes) = attachments.remove(&node.id) {
        node.attached = nodes;
    }
    for child in &mut node.children {
        attach(child, attachments);
    }
}

fn collect_over_consumed(node: &RecordNode, warnings: &mut Vec<TraceWarning>) {
    for output in node.outputs.iter().filter(|o| o.is_over_consumed) {
        warnings.push(TraceWarning::warning(
            format!("output-{}", output.output_id),
            format!(
                "產出被消耗 {} kg，超過產出重量 {} kg",
                output.consumed_weight, output.weight
            ),
        ));
    }
    for child in &node.children {
        collect_over_consumed(child, warnings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeBuilder;
    use trace_core::{
        InMemoryRepository, Order, Pallet, PalletState, Production, ProductionInput,
        ProductionOutput, ProductionOutputConsumption, ProductionRecord, StockBox, Store,
    };

    fn product(id: ProductId) -> ProductRef {
        ProductRef::new(id, format!("Producto {id}"))
    }

    /// 根紀錄 1 → 最終節點 2（產品 1、2）與 3（產品 2、3）
    fn repository() -> InMemoryRepository {
        let mut repo = InMemoryRepository::new();
        repo.insert_production(Production::new(1, "L1"));
        repo.insert_record(ProductionRecord::new(1, 1));
        repo.insert_record(ProductionRecord::new(2, 1).with_parent(1));
        repo.insert_record(ProductionRecord::new(3, 1).with_parent(1));

        repo.insert_box(StockBox::new(100, product(9), "R", Decimal::from(200)));
        repo.insert_input(ProductionInput::new(1, 1, 100));
        repo.insert_output(ProductionOutput::new(1, 1, product(8), 10, Decimal::from(190)));
        repo.insert_consumption(ProductionOutputConsumption::new(1, 2, 1, Decimal::from(100), 5));
        repo.insert_consumption(ProductionOutputConsumption::new(2, 3, 1, Decimal::from(90), 5));

        repo.insert_output(ProductionOutput::new(2, 2, product(1), 4, Decimal::from(40)));
        repo.insert_output(ProductionOutput::new(3, 2, product(2), 2, Decimal::from(20)));
        repo.insert_output(ProductionOutput::new(4, 3, product(2), 2, Decimal::from(20)));
        repo.insert_output(ProductionOutput::new(5, 3, product(3), 5, Decimal::from(50)));

        repo.insert_pallet(Pallet::new(1, PalletState::Shipped).with_order(1));
        repo.insert_pallet(Pallet::new(2, PalletState::Stored).with_store(1));
        repo.insert_order(Order::new(1).with_customer("Mar Azul"));
        repo.insert_store(Store::new(1, "Cámara"));

        repo.insert_box(StockBox::new(1, product(1), "L1", Decimal::from(20)).with_pallet(1));
        repo.insert_box(StockBox::new(2, product(1), "L1", Decimal::from(20)).with_pallet(2));
        repo.insert_box(StockBox::new(3, product(2), "L1", Decimal::from(10)).with_pallet(1));
        repo.insert_box(StockBox::new(4, product(3), "L1", Decimal::from(50)).with_pallet(2));
        repo.insert_box(StockBox::new(5, product(4), "L1", Decimal::from(7)).with_pallet(2));
        repo
    }

    fn diagram(repo: &InMemoryRepository) -> ProcessDiagram {
        let snapshot = LotSnapshot::load(repo, 1).unwrap();
        let config = ReconciliationConfig::default();
        let allocations = LotAllocations::assemble(&snapshot);
        let tree = TreeBuilder::new(&snapshot, &config).build().unwrap();
        let totals = GlobalTotals::calculate(&snapshot, &allocations, &config);
        DiagramAssembler::new(&snapshot, &allocations, &config).assemble(tree, totals)
    }

    #[test]
    fn test_attached_nodes_use_final_node_ids() {
        let diagram = diagram(&repository());
        let final_2 = diagram.process_nodes[0].find(2).unwrap();

        let ids: Vec<&str> = final_2.attached.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["sales-2", "stock-2", "balance-2"]);

        let sales = diagram.find_node("sales-2").unwrap();
        assert_eq!(sales.product_ids, vec![1]);
        assert_eq!(sales.weight, Decimal::from(20));
        assert_eq!(sales.boxes, Some(1));

        let balance = diagram.find_node("balance-2").unwrap();
        assert_eq!(balance.weight, Decimal::ZERO);
        assert!(diagram.process_nodes[0].attached.is_empty());
    }

    #[test]
    fn test_ambiguous_product_becomes_orphan() {
        let diagram = diagram(&repository());

        let orphan_ids: Vec<&str> = diagram.orphan_nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(
            orphan_ids,
            vec!["sales-orphan-2", "balance-orphan-2", "stock-orphan-4", "balance-orphan-4"]
        );

        let orphan = diagram.find_node("balance-orphan-2").unwrap();
        assert_eq!(orphan.product_id, Some(2));
        assert_eq!(orphan.final_record_id, None);
        // 產品 2 共產出 40 kg，銷售 10 kg
        assert_eq!(orphan.weight, Decimal::from(30));
        assert!(diagram
            .warnings
            .iter()
            .any(|w| w.subject == "product-2"));
    }

    #[test]
    fn test_no_product_is_attached_and_orphaned() {
        let diagram = diagram(&repository());

        let attached: BTreeSet<ProductId> = diagram
            .attached_nodes()
            .iter()
            .flat_map(|n| n.product_ids.iter().copied())
            .collect();
        let orphaned: BTreeSet<ProductId> = diagram
            .orphan_nodes
            .iter()
            .filter_map(|n| n.product_id)
            .collect();

        assert_eq!(attached, BTreeSet::from([1, 3]));
        assert_eq!(orphaned, BTreeSet::from([2, 4]));
    }

    #[test]
    fn test_balance_node_emitted_without_flows() {
        let mut repo = repository();
        repo.insert_output(ProductionOutput::new(6, 3, product(5), 1, Decimal::from(3)));

        let diagram = diagram(&repo);
        let balance = diagram.find_node("balance-3").unwrap();
        assert_eq!(balance.product_ids, vec![3, 5]);
        assert_eq!(balance.weight, Decimal::from(3));
    }

    #[test]
    fn test_balance_node_reports_missing_boxes() {
        let mut repo = repository();
        repo.insert_box(StockBox::new(6, product(3), "L1", Decimal::from(12)));

        let diagram = diagram(&repo);
        let balance = diagram.find_node("balance-3").unwrap();
        assert_eq!(balance.missing, Some(Quantity::new(Decimal::from(12), 1)));
        let NodeData::Balance(entries) = &balance.data else {
            panic!("balance node carries reconciliation entries");
        };
        assert_eq!(entries[0].missing_box_ids, vec![6]);

        let sales = diagram.find_node("sales-2").unwrap();
        assert_eq!(sales.missing, None);
    }

    #[test]
    fn test_over_consumed_output_warning() {
        let mut repo = repository();
        repo.insert_consumption(ProductionOutputConsumption::new(3, 3, 1, Decimal::from(10), 0));

        let diagram = diagram(&repo);
        assert!(diagram.warnings.iter().any(|w| w.subject == "output-1"));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(diagram(&repository())).unwrap();

        assert!(json["processNodes"].is_array());
        assert!(json["orphanNodes"].is_array());
        assert!(json["globalTotals"].get("totalInputWeight").is_some());
        let attached = &json["processNodes"][0]["children"][0]["attached"][0];
        assert_eq!(attached["nodeType"], "sales");
        assert_eq!(attached["data"]["type"], "sales");
    }
}
