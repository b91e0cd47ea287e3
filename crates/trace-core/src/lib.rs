//! # Trace Core
//!
//! 生產追溯核心資料模型與類型定義

pub mod config;
pub mod cost;
pub mod decimal;
pub mod events;
pub mod flow;
pub mod inventory;
pub mod production;
pub mod repository;
pub mod snapshot;

// Re-export 主要類型
pub use config::ReconciliationConfig;
pub use cost::{CostBasis, CostCatalogEntry, CostScope, CostType, ProductionCost};
pub use events::{InputEvent, InputEventListener, PalletStateTracker};
pub use flow::{
    Contribution, ProductionInput, ProductionOutput, ProductionOutputConsumption,
    ProductionOutputSource, SourceRef, SourceType,
};
pub use inventory::{
    state_name_of, BoxConsumptionRef, BoxPlacement, Order, Pallet, PalletLink, PalletState,
    ProductRef, StateTag, StockBox, Store,
};
pub use production::{Process, ProcessType, Production, ProductionRecord};
pub use repository::{BoxFilter, InMemoryRepository, ProductionRepository};
pub use snapshot::LotSnapshot;

/// 生產批次ID
pub type ProductionId = u64;
/// 製程紀錄ID
pub type RecordId = u64;
/// 製程ID
pub type ProcessId = u64;
/// 投入ID
pub type InputId = u64;
/// 產出ID
pub type OutputId = u64;
/// 產出消耗ID
pub type ConsumptionId = u64;
/// 產出來源ID
pub type SourceId = u64;
/// 成本ID
pub type CostId = u64;
/// 成本目錄ID
pub type CatalogId = u64;
/// 箱ID
pub type BoxId = u64;
/// 棧板ID
pub type PalletId = u64;
/// 產品ID
pub type ProductId = u64;
/// 訂單ID
pub type OrderId = u64;
/// 倉庫ID
pub type StoreId = u64;

/// 追溯錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("資料完整性錯誤: {0}")]
    DataIntegrity(String),

    #[error("找不到參照的{entity}: {id}")]
    MissingReference { entity: &'static str, id: u64 },

    #[error("製程樹存在循環: 紀錄 {record_id}")]
    CyclicTree { record_id: RecordId },

    #[error("製程樹過深: 紀錄 {record_id} 深度 {depth}")]
    TreeTooDeep { record_id: RecordId, depth: usize },

    #[error("找不到生產批次: {0}")]
    ProductionNotFound(ProductionId),

    #[error("找不到製程紀錄: {0}")]
    RecordNotFound(RecordId),

    #[error("資料來源錯誤: {0}")]
    DataSource(String),

    #[error("無效的配置: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, TraceError>;
