//! 資料存取邊界
//!
//! 核心只依賴 [`ProductionRepository`] 讀取已持久化的資料；所有呼叫皆為
//! 同步阻塞呼叫，交易與並發寫入由外部系統負責。

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::cost::{CostScope, ProductionCost};
use crate::events::InputEvent;
use crate::flow::{
    ProductionInput, ProductionOutput, ProductionOutputConsumption, ProductionOutputSource,
};
use crate::inventory::{BoxConsumptionRef, Order, Pallet, PalletLink, StockBox, Store};
use crate::production::{Production, ProductionRecord};
use crate::{
    BoxId, InputId, OrderId, OutputId, PalletId, ProductionId, RecordId, Result, StoreId,
    TraceError,
};

/// 依批號查詢箱的過濾條件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxFilter {
    /// 是否已被消耗（None 表示不過濾）
    pub consumed: Option<bool>,
    /// 棧板連結類型（None 表示不過濾）
    pub placement: Option<PalletLink>,
}

impl BoxFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// 建構器模式：設置消耗狀態
    pub fn consumed(mut self, consumed: bool) -> Self {
        self.consumed = Some(consumed);
        self
    }

    /// 建構器模式：設置棧板連結
    pub fn placement(mut self, placement: PalletLink) -> Self {
        self.placement = Some(placement);
        self
    }

    pub fn matches(&self, stock_box: &StockBox, pallet: Option<&Pallet>) -> bool {
        if let Some(consumed) = self.consumed {
            if stock_box.is_available() == consumed {
                return false;
            }
        }
        if let Some(placement) = self.placement {
            if PalletLink::of(pallet) != placement {
                return false;
            }
        }
        true
    }
}

/// 生產資料存取介面
pub trait ProductionRepository {
    fn production(&self, production_id: ProductionId) -> Result<Production>;

    fn records_by_production(&self, production_id: ProductionId) -> Result<Vec<ProductionRecord>>;

    fn inputs_by_records(&self, record_ids: &[RecordId]) -> Result<Vec<ProductionInput>>;

    fn outputs_by_records(&self, record_ids: &[RecordId]) -> Result<Vec<ProductionOutput>>;

    /// 消耗方屬於指定紀錄的產出消耗
    fn consumptions_by_records(
        &self,
        record_ids: &[RecordId],
    ) -> Result<Vec<ProductionOutputConsumption>>;

    fn sources_by_outputs(&self, output_ids: &[OutputId]) -> Result<Vec<ProductionOutputSource>>;

    /// 批次層級與紀錄層級的成本
    fn costs_by_production(
        &self,
        production_id: ProductionId,
        record_ids: &[RecordId],
    ) -> Result<Vec<ProductionCost>>;

    /// 依ID取得箱（含消耗此箱的投入）
    fn boxes_by_ids(&self, box_ids: &[BoxId]) -> Result<Vec<StockBox>>;

    /// 依批號取得箱（含消耗此箱的投入）
    fn boxes_by_lot(&self, lot: &str, filter: &BoxFilter) -> Result<Vec<StockBox>>;

    fn pallets_by_ids(&self, pallet_ids: &[PalletId]) -> Result<Vec<Pallet>>;

    fn orders_by_ids(&self, order_ids: &[OrderId]) -> Result<Vec<Order>>;

    fn stores_by_ids(&self, store_ids: &[StoreId]) -> Result<Vec<Store>>;
}

/// 記憶體內的資料存取實作
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    productions: HashMap<ProductionId, Production>,
    records: Vec<ProductionRecord>,
    inputs: Vec<ProductionInput>,
    outputs: Vec<ProductionOutput>,
    consumptions: Vec<ProductionOutputConsumption>,
    sources: Vec<ProductionOutputSource>,
    costs: Vec<ProductionCost>,
    boxes: Vec<StockBox>,
    pallets: HashMap<PalletId, Pallet>,
    orders: HashMap<OrderId, Order>,
    stores: HashMap<StoreId, Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_production(&mut self, production: Production) {
        self.productions.insert(production.id, production);
    }

    pub fn insert_record(&mut self, record: ProductionRecord) {
        self.records.push(record);
    }

    pub fn insert_input(&mut self, input: ProductionInput) {
        self.inputs.push(input);
    }

    pub fn insert_output(&mut self, output: ProductionOutput) {
        self.outputs.push(output);
    }

    pub fn insert_consumption(&mut self, consumption: ProductionOutputConsumption) {
        self.consumptions.push(consumption);
    }

    pub fn insert_source(&mut self, source: ProductionOutputSource) {
        self.sources.push(source);
    }

    pub fn insert_cost(&mut self, cost: ProductionCost) {
        self.costs.push(cost);
    }

    pub fn insert_box(&mut self, stock_box: StockBox) {
        self.boxes.push(stock_box);
    }

    pub fn insert_pallet(&mut self, pallet: Pallet) {
        self.pallets.insert(pallet.id, pallet);
    }

    pub fn insert_order(&mut self, order: Order) {
        self.orders.insert(order.id, order);
    }

    pub fn insert_store(&mut self, store: Store) {
        self.stores.insert(store.id, store);
    }

    /// 登記製程消耗一箱，回傳投入事件供棧板狀態機使用
    pub fn consume_box(
        &mut self,
        input_id: InputId,
        record_id: RecordId,
        box_id: BoxId,
    ) -> Result<InputEvent> {
        let record = self
            .records
            .iter()
            .find(|r| r.id == record_id)
            .ok_or(TraceError::RecordNotFound(record_id))?;
        let stock_box = self
            .hydrated_box(box_id)
            .ok_or(TraceError::MissingReference { entity: "箱", id: box_id })?;

        let (input, event) = ProductionInput::consume(input_id, record, &stock_box)?;
        self.inputs.push(input);
        Ok(event)
    }

    /// 刪除投入，回傳投入事件
    pub fn remove_input(&mut self, input_id: InputId) -> Result<InputEvent> {
        let position = self
            .inputs
            .iter()
            .position(|i| i.id == input_id)
            .ok_or(TraceError::MissingReference { entity: "投入", id: input_id })?;
        let input = self.inputs.remove(position);

        let production_id = self
            .records
            .iter()
            .find(|r| r.id == input.production_record_id)
            .map(|r| r.production_id)
            .ok_or(TraceError::RecordNotFound(input.production_record_id))?;
        let stock_box = self
            .hydrated_box(input.box_id)
            .ok_or(TraceError::MissingReference { entity: "箱", id: input.box_id })?;

        Ok(InputEvent::removed(&input, &stock_box, production_id))
    }

    /// 補上消耗此箱的投入（模擬關聯預先載入）
    fn hydrated_box(&self, box_id: BoxId) -> Option<StockBox> {
        self.boxes
            .iter()
            .find(|b| b.id == box_id)
            .map(|b| self.hydrate(b))
    }

    fn hydrate(&self, stock_box: &StockBox) -> StockBox {
        let mut hydrated = stock_box.clone();
        let known: HashSet<InputId> = hydrated
            .production_inputs
            .iter()
            .map(|c| c.input_id)
            .collect();

        for input in self.inputs.iter().filter(|i| i.box_id == stock_box.id) {
            if known.contains(&input.id) {
                continue;
            }
            if let Some(record) = self.records.iter().find(|r| r.id == input.production_record_id) {
                hydrated.production_inputs.push(BoxConsumptionRef {
                    input_id: input.id,
                    production_record_id: record.id,
                    production_id: record.production_id,
                });
            }
        }
        hydrated
    }
}

impl ProductionRepository for InMemoryRepository {
    fn production(&self, production_id: ProductionId) -> Result<Production> {
        self.productions
            .get(&production_id)
            .cloned()
            .ok_or(TraceError::ProductionNotFound(production_id))
    }

    fn records_by_production(&self, production_id: ProductionId) -> Result<Vec<ProductionRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.production_id == production_id)
            .cloned()
            .collect())
    }

    fn inputs_by_records(&self, record_ids: &[RecordId]) -> Result<Vec<ProductionInput>> {
        Ok(self
            .inputs
            .iter()
            .filter(|i| record_ids.contains(&i.production_record_id))
            .cloned()
            .collect())
    }

    fn outputs_by_records(&self, record_ids: &[RecordId]) -> Result<Vec<ProductionOutput>> {
        Ok(self
            .outputs
            .iter()
            .filter(|o| record_ids.contains(&o.production_record_id))
            .cloned()
            .collect())
    }

    fn consumptions_by_records(
        &self,
        record_ids: &[RecordId],
    ) -> Result<Vec<ProductionOutputConsumption>> {
        Ok(self
            .consumptions
            .iter()
            .filter(|c| record_ids.contains(&c.production_record_id))
            .cloned()
            .collect())
    }

    fn sources_by_outputs(&self, output_ids: &[OutputId]) -> Result<Vec<ProductionOutputSource>> {
        Ok(self
            .sources
            .iter()
            .filter(|s| output_ids.contains(&s.production_output_id))
            .cloned()
            .collect())
    }

    fn costs_by_production(
        &self,
        production_id: ProductionId,
        record_ids: &[RecordId],
    ) -> Result<Vec<ProductionCost>> {
        Ok(self
            .costs
            .iter()
            .filter(|c| match c.scope {
                CostScope::Production(id) => id == production_id,
                CostScope::Record(id) => record_ids.contains(&id),
            })
            .cloned()
            .collect())
    }

    fn boxes_by_ids(&self, box_ids: &[BoxId]) -> Result<Vec<StockBox>> {
        Ok(self
            .boxes
            .iter()
            .filter(|b| box_ids.contains(&b.id))
            .map(|b| self.hydrate(b))
            .collect())
    }

    fn boxes_by_lot(&self, lot: &str, filter: &BoxFilter) -> Result<Vec<StockBox>> {
        Ok(self
            .boxes
            .iter()
            .filter(|b| b.lot == lot)
            .map(|b| self.hydrate(b))
            .filter(|b| {
                let pallet = b.pallet_id.and_then(|id| self.pallets.get(&id));
                filter.matches(b, pallet)
            })
            .collect())
    }

    fn pallets_by_ids(&self, pallet_ids: &[PalletId]) -> Result<Vec<Pallet>> {
        Ok(pallet_ids
            .iter()
            .filter_map(|id| self.pallets.get(id).cloned())
            .collect())
    }

    fn orders_by_ids(&self, order_ids: &[OrderId]) -> Result<Vec<Order>> {
        Ok(order_ids
            .iter()
            .filter_map(|id| self.orders.get(id).cloned())
            .collect())
    }

    fn stores_by_ids(&self, store_ids: &[StoreId]) -> Result<Vec<Store>> {
        Ok(store_ids
            .iter()
            .filter_map(|id| self.stores.get(id).cloned())
            .collect())
    }
}
