//! 批號去向彙整：銷售、庫存、再加工、遺失
//!
//! 四個彙整器各自獨立，皆以批號為鍵讀取快照中的箱，並共用
//! [`BoxPlacement`] 分類，因此結果恰好劃分該批號的所有箱。

use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Add, AddAssign};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use trace_core::{
    BoxId, BoxPlacement, LotSnapshot, OrderId, PalletId, ProductId, ProductRef, ProductionId,
    RecordId, ReconciliationConfig, StockBox, StoreId,
};

/// 重量與箱數
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Quantity {
    pub weight: Decimal,
    pub boxes: u64,
}

impl Quantity {
    pub const ZERO: Quantity = Quantity {
        weight: Decimal::ZERO,
        boxes: 0,
    };

    pub fn new(weight: Decimal, boxes: u64) -> Self {
        Self { weight, boxes }
    }

    pub fn is_zero(&self) -> bool {
        self.weight.is_zero() && self.boxes == 0
    }

    pub fn rounded(&self, config: &ReconciliationConfig) -> Self {
        Self {
            weight: config.round(self.weight),
            boxes: self.boxes,
        }
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity {
            weight: self.weight + rhs.weight,
            boxes: self.boxes + rhs.boxes,
        }
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        self.weight += rhs.weight;
        self.boxes += rhs.boxes;
    }
}

impl std::iter::Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::ZERO, |acc, q| acc + q)
    }
}

/// 銷售分配（依產品與訂單分組）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesAllocation {
    pub order_id: OrderId,
    pub customer_name: Option<String>,
    pub load_date: Option<NaiveDate>,
    pub product: ProductRef,
    pub weight: Decimal,
    pub boxes: u64,
    pub pallet_ids: BTreeSet<PalletId>,
}

/// 庫存分配（依產品與倉庫分組）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAllocation {
    pub store_id: Option<StoreId>,
    pub store_name: Option<String>,
    pub product: ProductRef,
    pub weight: Decimal,
    pub boxes: u64,
    pub pallet_ids: BTreeSet<PalletId>,
}

/// 再加工分配（依產品與目的地製程紀錄分組）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessedAllocation {
    pub production_record_id: RecordId,
    pub production_id: ProductionId,
    pub product: ProductRef,
    pub weight: Decimal,
    pub boxes: u64,
    pub box_ids: Vec<BoxId>,
}

/// 遺失（未被任何去向說明的可用箱）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingAllocation {
    pub product: ProductRef,
    pub weight: Decimal,
    pub boxes: u64,
    pub box_ids: Vec<BoxId>,
}

/// 可取得重量與箱數的分配明細
pub trait AllocationDetail {
    fn quantity(&self) -> Quantity;

    /// 顯示層四捨五入後的副本
    fn rounded(&self, config: &ReconciliationConfig) -> Self;
}

macro_rules! impl_allocation_detail {
    ($($ty:ty),*) => {
        $(
            impl AllocationDetail for $ty {
                fn quantity(&self) -> Quantity {
                    Quantity::new(self.weight, self.boxes)
                }

                fn rounded(&self, config: &ReconciliationConfig) -> Self {
                    let mut copy = self.clone();
                    copy.weight = config.round(copy.weight);
                    copy
                }
            }
        )*
    };
}

impl_allocation_detail!(
    SalesAllocation,
    StockAllocation,
    ReprocessedAllocation,
    MissingAllocation
);

pub type SalesByProduct = BTreeMap<ProductId, BTreeMap<OrderId, SalesAllocation>>;
pub type StockByProduct = BTreeMap<ProductId, BTreeMap<Option<StoreId>, StockAllocation>>;
pub type ReprocessedByProduct = BTreeMap<ProductId, BTreeMap<RecordId, ReprocessedAllocation>>;
pub type MissingByProduct = BTreeMap<ProductId, MissingAllocation>;

fn boxes_with_placement(
    snapshot: &LotSnapshot,
    placement: BoxPlacement,
) -> impl Iterator<Item = &StockBox> {
    snapshot
        .lot_boxes()
        .iter()
        .filter(move |b| BoxPlacement::classify(b, snapshot.pallet_of(b)) == placement)
}

/// 銷售：已關聯訂單的棧板上、仍可用的本批號箱
pub fn sales_by_product(snapshot: &LotSnapshot) -> SalesByProduct {
    let mut result = SalesByProduct::new();

    for stock_box in boxes_with_placement(snapshot, BoxPlacement::Sales) {
        let Some(pallet) = snapshot.pallet_of(stock_box) else {
            continue;
        };
        let Some(order_id) = pallet.order_id else {
            continue;
        };
        let order = snapshot.order(order_id);

        let entry = result
            .entry(stock_box.product.id)
            .or_default()
            .entry(order_id)
            .or_insert_with(|| SalesAllocation {
                order_id,
                customer_name: order.and_then(|o| o.customer_name.clone()),
                load_date: order.and_then(|o| o.load_date),
                product: stock_box.product.clone(),
                weight: Decimal::ZERO,
                boxes: 0,
                pallet_ids: BTreeSet::new(),
            });
        entry.weight += stock_box.net_weight;
        entry.boxes += 1;
        entry.pallet_ids.insert(pallet.id);
    }

    result
}

/// 庫存：已入庫、未關聯訂單的棧板上、仍可用的本批號箱
pub fn stock_by_product(snapshot: &LotSnapshot) -> StockByProduct {
    let mut result = StockByProduct::new();

    for stock_box in boxes_with_placement(snapshot, BoxPlacement::Stock) {
        let Some(pallet) = snapshot.pallet_of(stock_box) else {
            continue;
        };
        let store_id = pallet.store_id;

        let entry = result
            .entry(stock_box.product.id)
            .or_default()
            .entry(store_id)
            .or_insert_with(|| StockAllocation {
                store_id,
                store_name: store_id
                    .and_then(|id| snapshot.store(id))
                    .map(|s| s.name.clone()),
                product: stock_box.product.clone(),
                weight: Decimal::ZERO,
                boxes: 0,
                pallet_ids: BTreeSet::new(),
            });
        entry.weight += stock_box.net_weight;
        entry.boxes += 1;
        entry.pallet_ids.insert(pallet.id);
    }

    result
}

/// 再加工：已被任一製程紀錄消耗的本批號箱
pub fn reprocessed_by_product(snapshot: &LotSnapshot) -> ReprocessedByProduct {
    let mut result = ReprocessedByProduct::new();

    for stock_box in boxes_with_placement(snapshot, BoxPlacement::Reprocessed) {
        let Some(consumer) = stock_box.production_inputs.first() else {
            continue;
        };
        if stock_box.production_inputs.len() > 1 {
            tracing::warn!(
                "箱 {} 被 {} 個投入參照，僅計入製程紀錄 {}",
                stock_box.id,
                stock_box.production_inputs.len(),
                consumer.production_record_id
            );
        }

        let entry = result
            .entry(stock_box.product.id)
            .or_default()
            .entry(consumer.production_record_id)
            .or_insert_with(|| ReprocessedAllocation {
                production_record_id: consumer.production_record_id,
                production_id: consumer.production_id,
                product: stock_box.product.clone(),
                weight: Decimal::ZERO,
                boxes: 0,
                box_ids: Vec::new(),
            });
        entry.weight += stock_box.net_weight;
        entry.boxes += 1;
        entry.box_ids.push(stock_box.id);
    }

    result
}

/// 遺失：可用但不在任何棧板，或棧板既未關聯訂單也未入庫的本批號箱
pub fn missing_by_product(snapshot: &LotSnapshot) -> MissingByProduct {
    let mut result = MissingByProduct::new();

    for stock_box in boxes_with_placement(snapshot, BoxPlacement::Missing) {
        let entry = result
            .entry(stock_box.product.id)
            .or_insert_with(|| MissingAllocation {
                product: stock_box.product.clone(),
                weight: Decimal::ZERO,
                boxes: 0,
                box_ids: Vec::new(),
            });
        entry.weight += stock_box.net_weight;
        entry.boxes += 1;
        entry.box_ids.push(stock_box.id);
    }

    result
}

/// 四種去向的彙整結果
#[derive(Debug, Clone, Default)]
pub struct LotAllocations {
    pub sales: SalesByProduct,
    pub stock: StockByProduct,
    pub reprocessed: ReprocessedByProduct,
    pub missing: MissingByProduct,
}

impl LotAllocations {
    /// 執行全部四個彙整器
    pub fn assemble(snapshot: &LotSnapshot) -> Self {
        let allocations = Self {
            sales: sales_by_product(snapshot),
            stock: stock_by_product(snapshot),
            reprocessed: reprocessed_by_product(snapshot),
            missing: missing_by_product(snapshot),
        };

        tracing::debug!(
            "批號 {} 去向彙整：銷售 {} 項產品，庫存 {} 項，再加工 {} 項，遺失 {} 項",
            snapshot.lot(),
            allocations.sales.len(),
            allocations.stock.len(),
            allocations.reprocessed.len(),
            allocations.missing.len()
        );

        allocations
    }

    pub fn sales_of(&self, product_id: ProductId) -> Quantity {
        sum_groups(self.sales.get(&product_id))
    }

    pub fn stock_of(&self, product_id: ProductId) -> Quantity {
        sum_groups(self.stock.get(&product_id))
    }

    pub fn reprocessed_of(&self, product_id: ProductId) -> Quantity {
        sum_groups(self.reprocessed.get(&product_id))
    }

    /// 已入帳數量：銷售 + 庫存 + 再加工
    pub fn contabilized_of(&self, product_id: ProductId) -> Quantity {
        self.sales_of(product_id) + self.stock_of(product_id) + self.reprocessed_of(product_id)
    }

    pub fn missing_of(&self, product_id: ProductId) -> Quantity {
        self.missing
            .get(&product_id)
            .map(AllocationDetail::quantity)
            .unwrap_or_default()
    }

    /// 未上棧板也未被消耗的箱
    pub fn missing_box_ids(&self, product_id: ProductId) -> Vec<BoxId> {
        self.missing
            .get(&product_id)
            .map(|m| m.box_ids.clone())
            .unwrap_or_default()
    }

    /// 銷售總量與不重複棧板數
    pub fn sales_totals(&self) -> (Quantity, usize) {
        totals_with_pallets(
            self.sales
                .values()
                .flat_map(|groups| groups.values())
                .map(|a| (a.quantity(), &a.pallet_ids)),
        )
    }

    /// 庫存總量與不重複棧板數
    pub fn stock_totals(&self) -> (Quantity, usize) {
        totals_with_pallets(
            self.stock
                .values()
                .flat_map(|groups| groups.values())
                .map(|a| (a.quantity(), &a.pallet_ids)),
        )
    }

    /// 出現在任一去向的所有產品
    pub fn product_ids(&self) -> BTreeSet<ProductId> {
        self.sales
            .keys()
            .chain(self.stock.keys())
            .chain(self.reprocessed.keys())
            .chain(self.missing.keys())
            .copied()
            .collect()
    }

    /// 任一去向中找到的產品資訊
    pub fn product_ref(&self, product_id: ProductId) -> Option<ProductRef> {
        self.sales
            .get(&product_id)
            .and_then(|g| g.values().next().map(|a| a.product.clone()))
            .or_else(|| {
                self.stock
                    .get(&product_id)
                    .and_then(|g| g.values().next().map(|a| a.product.clone()))
            })
            .or_else(|| {
                self.reprocessed
                    .get(&product_id)
                    .and_then(|g| g.values().next().map(|a| a.product.clone()))
            })
            .or_else(|| self.missing.get(&product_id).map(|a| a.product.clone()))
    }
}

fn sum_groups<K, T: AllocationDetail>(groups: Option<&BTreeMap<K, T>>) -> Quantity {
    groups
        .map(|g| g.values().map(AllocationDetail::quantity).sum())
        .unwrap_or_default()
}

fn totals_with_pallets<'a>(
    items: impl Iterator<Item = (Quantity, &'a BTreeSet<PalletId>)>,
) -> (Quantity, usize) {
    let mut total = Quantity::ZERO;
    let mut pallets = BTreeSet::new();
    for (quantity, pallet_ids) in items {
        total += quantity;
        pallets.extend(pallet_ids.iter().copied());
    }
    (total, pallets.len())
}
