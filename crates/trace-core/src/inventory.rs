//! 庫存模型：箱、棧板、訂單、倉庫

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BoxId, InputId, OrderId, PalletId, ProductId, ProductionId, RecordId, StoreId};

/// 產品參照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: ProductId,
    pub name: String,
}

impl ProductRef {
    pub fn new(id: ProductId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// 消耗此箱的投入紀錄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxConsumptionRef {
    pub input_id: InputId,
    pub production_record_id: RecordId,
    pub production_id: ProductionId,
}

/// 實體箱
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockBox {
    /// 箱ID
    pub id: BoxId,

    /// 產品
    pub product: ProductRef,

    /// 批號
    pub lot: String,

    /// 淨重（公斤）
    pub net_weight: Decimal,

    /// 毛重（公斤）
    pub gross_weight: Option<Decimal>,

    /// 所在棧板
    pub pallet_id: Option<PalletId>,

    /// 消耗此箱的投入（非空表示已被製程消耗）
    pub production_inputs: Vec<BoxConsumptionRef>,
}

impl StockBox {
    /// 創建新的可用箱
    pub fn new(id: BoxId, product: ProductRef, lot: impl Into<String>, net_weight: Decimal) -> Self {
        Self {
            id,
            product,
            lot: lot.into(),
            net_weight,
            gross_weight: None,
            pallet_id: None,
            production_inputs: Vec::new(),
        }
    }

    /// 建構器模式：設置棧板
    pub fn with_pallet(mut self, pallet_id: PalletId) -> Self {
        self.pallet_id = Some(pallet_id);
        self
    }

    /// 建構器模式：設置毛重
    pub fn with_gross_weight(mut self, gross_weight: Decimal) -> Self {
        self.gross_weight = Some(gross_weight);
        self
    }

    /// 建構器模式：標記被某製程紀錄消耗
    pub fn consumed_by(mut self, consumption: BoxConsumptionRef) -> Self {
        self.production_inputs.push(consumption);
        self
    }

    /// 未被任何投入參照即為可用
    pub fn is_available(&self) -> bool {
        self.production_inputs.is_empty()
    }

    /// 目的地製程紀錄（已消耗時）
    pub fn destination_record(&self) -> Option<RecordId> {
        self.production_inputs.first().map(|c| c.production_record_id)
    }
}

/// 棧板狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PalletState {
    /// 已登記
    Registered = 1,
    /// 已入庫
    Stored = 2,
    /// 已出貨
    Shipped = 3,
    /// 已加工（箱全數被消耗）
    Processed = 4,
}

impl PalletState {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Registered),
            2 => Some(Self::Stored),
            3 => Some(Self::Shipped),
            4 => Some(Self::Processed),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Stored => "stored",
            Self::Shipped => "shipped",
            Self::Processed => "processed",
        }
    }
}

/// 狀態標籤 `{id, name}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTag {
    pub id: u8,
    pub name: String,
}

/// 依狀態ID取得標籤，未知ID回傳 `unknown`
pub fn state_name_of(state_id: u8) -> StateTag {
    let name = PalletState::from_id(state_id)
        .map(PalletState::name)
        .unwrap_or("unknown");
    StateTag {
        id: state_id,
        name: name.to_string(),
    }
}

/// 棧板
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pallet {
    pub id: PalletId,
    pub state: PalletState,
    /// 關聯訂單（有值表示已分配銷售）
    pub order_id: Option<OrderId>,
    /// 所在倉庫
    pub store_id: Option<StoreId>,
}

impl Pallet {
    pub fn new(id: PalletId, state: PalletState) -> Self {
        Self {
            id,
            state,
            order_id: None,
            store_id: None,
        }
    }

    /// 建構器模式：設置訂單
    pub fn with_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// 建構器模式：設置倉庫
    pub fn with_store(mut self, store_id: StoreId) -> Self {
        self.store_id = Some(store_id);
        self
    }

    pub fn state_tag(&self) -> StateTag {
        state_name_of(self.state.id())
    }

    pub fn is_order_linked(&self) -> bool {
        self.order_id.is_some()
    }

    pub fn is_stored(&self) -> bool {
        self.state == PalletState::Stored
    }
}

/// 訂單
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_name: Option<String>,
    pub load_date: Option<NaiveDate>,
}

impl Order {
    pub fn new(id: OrderId) -> Self {
        Self {
            id,
            customer_name: None,
            load_date: None,
        }
    }

    /// 建構器模式：設置客戶
    pub fn with_customer(mut self, customer_name: impl Into<String>) -> Self {
        self.customer_name = Some(customer_name.into());
        self
    }

    /// 建構器模式：設置裝載日期
    pub fn with_load_date(mut self, load_date: NaiveDate) -> Self {
        self.load_date = Some(load_date);
        self
    }
}

/// 倉庫
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
}

impl Store {
    pub fn new(id: StoreId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// 棧板連結類型（依棧板推導）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PalletLink {
    /// 棧板已關聯訂單
    OrderLinked,
    /// 棧板已入庫且未關聯訂單
    Stored,
    /// 無棧板，或棧板既未關聯訂單也未入庫
    None,
}

impl PalletLink {
    pub fn of(pallet: Option<&Pallet>) -> Self {
        match pallet {
            Some(p) if p.is_order_linked() => Self::OrderLinked,
            Some(p) if p.is_stored() => Self::Stored,
            _ => Self::None,
        }
    }
}

/// 箱的去向分類
///
/// 每一箱恰好屬於其中一類：已消耗為 `Reprocessed`；可用箱依棧板分為
/// `Sales`、`Stock`、`Missing`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxPlacement {
    Sales,
    Stock,
    Reprocessed,
    Missing,
}

impl BoxPlacement {
    /// 依箱與所在棧板分類
    pub fn classify(stock_box: &StockBox, pallet: Option<&Pallet>) -> Self {
        if !stock_box.is_available() {
            return Self::Reprocessed;
        }
        match PalletLink::of(pallet) {
            PalletLink::OrderLinked => Self::Sales,
            PalletLink::Stored => Self::Stock,
            PalletLink::None => Self::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn product() -> ProductRef {
        ProductRef::new(1, "Filete de merluza")
    }

    #[test]
    fn test_box_availability() {
        let available = StockBox::new(1, product(), "L1", Decimal::from(25));
        let consumed = StockBox::new(2, product(), "L1", Decimal::from(25)).consumed_by(
            BoxConsumptionRef {
                input_id: 7,
                production_record_id: 3,
                production_id: 2,
            },
        );

        assert!(available.is_available());
        assert_eq!(available.destination_record(), None);
        assert!(!consumed.is_available());
        assert_eq!(consumed.destination_record(), Some(3));
    }

    #[rstest]
    #[case(1, "registered")]
    #[case(2, "stored")]
    #[case(3, "shipped")]
    #[case(4, "processed")]
    #[case(9, "unknown")]
    fn test_state_name_of(#[case] id: u8, #[case] name: &str) {
        let tag = state_name_of(id);
        assert_eq!(tag.id, id);
        assert_eq!(tag.name, name);
    }

    #[test]
    fn test_box_placement() {
        let stock_box = StockBox::new(1, product(), "L1", Decimal::from(10)).with_pallet(1);
        let sold = Pallet::new(1, PalletState::Stored).with_order(5);
        let stored = Pallet::new(1, PalletState::Stored).with_store(2);
        let shipped = Pallet::new(1, PalletState::Shipped);

        assert_eq!(BoxPlacement::classify(&stock_box, Some(&sold)), BoxPlacement::Sales);
        assert_eq!(BoxPlacement::classify(&stock_box, Some(&stored)), BoxPlacement::Stock);
        assert_eq!(BoxPlacement::classify(&stock_box, Some(&shipped)), BoxPlacement::Missing);
        assert_eq!(BoxPlacement::classify(&stock_box, None), BoxPlacement::Missing);

        let consumed = stock_box.consumed_by(BoxConsumptionRef {
            input_id: 1,
            production_record_id: 1,
            production_id: 1,
        });
        assert_eq!(
            BoxPlacement::classify(&consumed, Some(&sold)),
            BoxPlacement::Reprocessed
        );
    }
}
