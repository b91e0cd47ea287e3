//! 批次快照：一次性預先載入整個批次的資料
//!
//! 所有製程樹與對帳計算都在快照上以純記憶體方式執行，計算期間不再存取
//! 資料來源。

use std::collections::{BTreeMap, BTreeSet};

use crate::cost::ProductionCost;
use crate::flow::{
    ProductionInput, ProductionOutput, ProductionOutputConsumption, ProductionOutputSource,
};
use crate::inventory::{Order, Pallet, StockBox, Store};
use crate::production::{Production, ProductionRecord};
use crate::repository::{BoxFilter, ProductionRepository};
use crate::{BoxId, OrderId, OutputId, PalletId, ProductionId, RecordId, Result, StoreId};

/// 批次快照
#[derive(Debug, Clone)]
pub struct LotSnapshot {
    production: Production,
    records: BTreeMap<RecordId, ProductionRecord>,
    children: BTreeMap<RecordId, Vec<RecordId>>,
    inputs: Vec<ProductionInput>,
    outputs: Vec<ProductionOutput>,
    consumptions: Vec<ProductionOutputConsumption>,
    sources: Vec<ProductionOutputSource>,
    costs: Vec<ProductionCost>,
    input_boxes: BTreeMap<BoxId, StockBox>,
    lot_boxes: Vec<StockBox>,
    pallets: BTreeMap<PalletId, Pallet>,
    orders: BTreeMap<OrderId, Order>,
    stores: BTreeMap<StoreId, Store>,
}

impl LotSnapshot {
    /// 從資料來源載入批次快照
    pub fn load<R: ProductionRepository + ?Sized>(
        repository: &R,
        production_id: ProductionId,
    ) -> Result<Self> {
        let production = repository.production(production_id)?;
        let records = repository.records_by_production(production_id)?;
        let record_ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();

        let inputs = repository.inputs_by_records(&record_ids)?;
        let outputs = repository.outputs_by_records(&record_ids)?;
        let consumptions = repository.consumptions_by_records(&record_ids)?;
        let output_ids: Vec<OutputId> = outputs.iter().map(|o| o.id).collect();
        let sources = repository.sources_by_outputs(&output_ids)?;
        let costs = repository.costs_by_production(production_id, &record_ids)?;

        let input_box_ids: Vec<BoxId> = inputs.iter().map(|i| i.box_id).collect();
        let input_boxes = repository.boxes_by_ids(&input_box_ids)?;
        let lot_boxes = repository.boxes_by_lot(&production.lot, &BoxFilter::all())?;

        let pallet_ids: Vec<PalletId> = lot_boxes
            .iter()
            .chain(input_boxes.iter())
            .filter_map(|b| b.pallet_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let pallets = repository.pallets_by_ids(&pallet_ids)?;

        let order_ids: Vec<OrderId> = pallets
            .iter()
            .filter_map(|p| p.order_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let store_ids: Vec<StoreId> = pallets
            .iter()
            .filter_map(|p| p.store_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let orders = repository.orders_by_ids(&order_ids)?;
        let stores = repository.stores_by_ids(&store_ids)?;

        tracing::debug!(
            "載入批次 {} 快照：紀錄 {} 筆，投入 {} 筆，產出 {} 筆，批號箱 {} 箱，棧板 {} 個",
            production.lot,
            records.len(),
            inputs.len(),
            outputs.len(),
            lot_boxes.len(),
            pallets.len()
        );

        Ok(Self::from_parts(
            production,
            records,
            inputs,
            outputs,
            consumptions,
            sources,
            costs,
            input_boxes,
            lot_boxes,
            pallets,
            orders,
            stores,
        ))
    }

    /// 由已載入的資料組裝快照
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        production: Production,
        records: Vec<ProductionRecord>,
        inputs: Vec<ProductionInput>,
        outputs: Vec<ProductionOutput>,
        consumptions: Vec<ProductionOutputConsumption>,
        sources: Vec<ProductionOutputSource>,
        costs: Vec<ProductionCost>,
        input_boxes: Vec<StockBox>,
        lot_boxes: Vec<StockBox>,
        pallets: Vec<Pallet>,
        orders: Vec<Order>,
        stores: Vec<Store>,
    ) -> Self {
        let records: BTreeMap<RecordId, ProductionRecord> =
            records.into_iter().map(|r| (r.id, r)).collect();

        let mut children: BTreeMap<RecordId, Vec<RecordId>> = BTreeMap::new();
        for record in records.values() {
            if let Some(parent_id) = record.parent_record_id {
                children.entry(parent_id).or_default().push(record.id);
            }
        }

        let mut lot_boxes = lot_boxes;
        lot_boxes.sort_by_key(|b| b.id);

        Self {
            production,
            records,
            children,
            inputs,
            outputs,
            consumptions,
            sources,
            costs,
            input_boxes: input_boxes.into_iter().map(|b| (b.id, b)).collect(),
            lot_boxes,
            pallets: pallets.into_iter().map(|p| (p.id, p)).collect(),
            orders: orders.into_iter().map(|o| (o.id, o)).collect(),
            stores: stores.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    pub fn production(&self) -> &Production {
        &self.production
    }

    pub fn lot(&self) -> &str {
        &self.production.lot
    }

    /// 所有紀錄（依ID排序）
    pub fn records(&self) -> impl Iterator<Item = &ProductionRecord> {
        self.records.values()
    }

    pub fn record(&self, record_id: RecordId) -> Option<&ProductionRecord> {
        self.records.get(&record_id)
    }

    /// 根紀錄；父紀錄不在本批次中的紀錄也視為根
    pub fn root_records(&self) -> impl Iterator<Item = &ProductionRecord> {
        self.records.values().filter(move |r| match r.parent_record_id {
            None => true,
            Some(parent_id) => !self.records.contains_key(&parent_id),
        })
    }

    /// 子紀錄ID（依ID排序）
    pub fn children_of(&self, record_id: RecordId) -> &[RecordId] {
        self.children
            .get(&record_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn inputs(&self) -> &[ProductionInput] {
        &self.inputs
    }

    pub fn inputs_of(&self, record_id: RecordId) -> impl Iterator<Item = &ProductionInput> {
        self.inputs
            .iter()
            .filter(move |i| i.production_record_id == record_id)
    }

    pub fn outputs(&self) -> &[ProductionOutput] {
        &self.outputs
    }

    pub fn outputs_of(&self, record_id: RecordId) -> impl Iterator<Item = &ProductionOutput> {
        self.outputs
            .iter()
            .filter(move |o| o.production_record_id == record_id)
    }

    pub fn output(&self, output_id: OutputId) -> Option<&ProductionOutput> {
        self.outputs.iter().find(|o| o.id == output_id)
    }

    /// 由指定紀錄（子製程）發起的父產出消耗
    pub fn consumptions_by(
        &self,
        record_id: RecordId,
    ) -> impl Iterator<Item = &ProductionOutputConsumption> {
        self.consumptions
            .iter()
            .filter(move |c| c.production_record_id == record_id)
    }

    /// 指定產出被下游消耗的紀錄
    pub fn consumptions_of_output(
        &self,
        output_id: OutputId,
    ) -> impl Iterator<Item = &ProductionOutputConsumption> {
        self.consumptions
            .iter()
            .filter(move |c| c.production_output_id == output_id)
    }

    pub fn sources_of_output(
        &self,
        output_id: OutputId,
    ) -> impl Iterator<Item = &ProductionOutputSource> {
        self.sources
            .iter()
            .filter(move |s| s.production_output_id == output_id)
    }

    pub fn costs(&self) -> &[ProductionCost] {
        &self.costs
    }

    pub fn input_box(&self, box_id: BoxId) -> Option<&StockBox> {
        self.input_boxes.get(&box_id)
    }

    /// 本批號的所有箱（依ID排序）
    pub fn lot_boxes(&self) -> &[StockBox] {
        &self.lot_boxes
    }

    pub fn pallet(&self, pallet_id: PalletId) -> Option<&Pallet> {
        self.pallets.get(&pallet_id)
    }

    pub fn pallet_of(&self, stock_box: &StockBox) -> Option<&Pallet> {
        stock_box.pallet_id.and_then(|id| self.pallets.get(&id))
    }

    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    pub fn store(&self, store_id: StoreId) -> Option<&Store> {
        self.stores.get(&store_id)
    }

    pub fn has_children(&self, record_id: RecordId) -> bool {
        !self.children_of(record_id).is_empty()
    }

    pub fn has_outputs(&self, record_id: RecordId) -> bool {
        self.outputs.iter().any(|o| o.production_record_id == record_id)
    }

    /// 最終節點：無子紀錄且至少一筆產出
    ///
    /// 投入不影響分類：單一根紀錄消耗原料並直接產出成品時，該紀錄即為
    /// 物料離開製程樹的節點。
    pub fn is_final(&self, record_id: RecordId) -> bool {
        !self.has_children(record_id) && self.has_outputs(record_id)
    }

    /// 所有最終節點ID（依ID排序）
    pub fn final_record_ids(&self) -> Vec<RecordId> {
        self.records
            .keys()
            .copied()
            .filter(|id| self.is_final(*id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{PalletState, ProductRef};
    use crate::repository::InMemoryRepository;
    use rust_decimal::Decimal;

    fn repository() -> InMemoryRepository {
        let mut repo = InMemoryRepository::new();
        let raw = ProductRef::new(1, "Merluza entera");
        let fillet = ProductRef::new(2, "Filete");

        repo.insert_production(Production::new(1, "L1"));
        repo.insert_record(ProductionRecord::new(1, 1));
        repo.insert_record(ProductionRecord::new(2, 1).with_parent(1));
        repo.insert_box(StockBox::new(1, raw, "R1", Decimal::from(50)).with_pallet(1));
        repo.insert_input(ProductionInput::new(1, 1, 1));
        repo.insert_output(ProductionOutput::new(1, 2, fillet.clone(), 2, Decimal::from(40)));
        repo.insert_box(StockBox::new(2, fillet, "L1", Decimal::from(20)).with_pallet(2));
        repo.insert_pallet(Pallet::new(1, PalletState::Processed));
        repo.insert_pallet(Pallet::new(2, PalletState::Stored).with_order(5));
        repo.insert_order(Order::new(5).with_customer("Pescados Norte"));
        repo
    }

    #[test]
    fn test_load_snapshot() {
        let snapshot = LotSnapshot::load(&repository(), 1).unwrap();

        assert_eq!(snapshot.lot(), "L1");
        assert_eq!(snapshot.records().count(), 2);
        assert_eq!(snapshot.children_of(1), &[2]);
        assert!(snapshot.input_box(1).is_some());
        assert_eq!(snapshot.lot_boxes().len(), 1);
        assert!(snapshot.pallet(1).is_some());
        assert!(snapshot.pallet(2).is_some());
        assert_eq!(
            snapshot.order(5).and_then(|o| o.customer_name.as_deref()),
            Some("Pescados Norte")
        );
    }

    #[test]
    fn test_final_classification() {
        let snapshot = LotSnapshot::load(&repository(), 1).unwrap();

        assert!(!snapshot.is_final(1));
        assert!(snapshot.is_final(2));
        assert_eq!(snapshot.final_record_ids(), vec![2]);
        assert_eq!(
            snapshot.root_records().map(|r| r.id).collect::<Vec<_>>(),
            vec![1]
        );
    }
}
