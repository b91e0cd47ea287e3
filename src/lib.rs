//! # Production Trace
//!
//! 生產追溯與批次對帳服務入口
//!
//! [`ProductionService`] 從資料來源載入批次快照並交給
//! [`ProductionCalculator`] 計算，流程圖結果經由 [`DiagramCache`] 緩存。
//! 投入異動事件透過 [`ProductionService::apply_input_event`] 分送給緩存
//! 與外部監聽者（例如棧板狀態機）。

pub use trace_cache::{CacheError, DiagramCache, DiagramSnapshot, DirtyTracker};
pub use trace_calc::{
    CostBreakdown, DetailedReconciliation, GlobalTotals, LotAllocations, ProcessDiagram,
    ProductionCalculator, RecordNode, ReconciliationStatus,
};
pub use trace_core::{
    InputEvent, InputEventListener, LotSnapshot, PalletStateTracker, ProductionId,
    ProductionRepository, ReconciliationConfig, Result, TraceError,
};

/// 生產追溯服務
pub struct ProductionService<R: ProductionRepository> {
    repository: R,
    config: ReconciliationConfig,
    cache: DiagramCache,
    listeners: Vec<Box<dyn InputEventListener>>,
}

impl<R: ProductionRepository> ProductionService<R> {
    /// 創建服務，配置不合法時回傳錯誤
    pub fn new(repository: R, config: ReconciliationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            repository,
            config,
            cache: DiagramCache::new(),
            listeners: Vec::new(),
        })
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut R {
        &mut self.repository
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    pub fn cache(&self) -> &DiagramCache {
        &self.cache
    }

    /// 註冊投入事件監聽者
    pub fn add_listener(&mut self, listener: Box<dyn InputEventListener>) {
        self.listeners.push(listener);
    }

    /// 分送投入事件：使流程圖緩存失效並通知所有監聽者
    pub fn apply_input_event(&mut self, event: &InputEvent) {
        tracing::debug!("分送投入事件: {:?}", event);
        self.cache.on_input_event(event);
        for listener in &mut self.listeners {
            listener.on_input_event(event);
        }
    }

    /// 載入批次快照並建立計算器
    pub fn calculator(&self, production_id: ProductionId) -> Result<ProductionCalculator> {
        let snapshot = LotSnapshot::load(&self.repository, production_id)?;
        Ok(ProductionCalculator::new(snapshot, self.config.clone()))
    }

    pub fn build_process_tree(&self, production_id: ProductionId) -> Result<Vec<RecordNode>> {
        self.calculator(production_id)?.build_process_tree()
    }

    pub fn calculate_global_totals(&self, production_id: ProductionId) -> Result<GlobalTotals> {
        Ok(self.calculator(production_id)?.calculate_global_totals())
    }

    pub fn get_detailed_reconciliation_by_product(
        &self,
        production_id: ProductionId,
    ) -> Result<DetailedReconciliation> {
        Ok(self
            .calculator(production_id)?
            .get_detailed_reconciliation_by_product())
    }

    pub fn calculate_diagram(&self, production_id: ProductionId) -> Result<ProcessDiagram> {
        self.calculator(production_id)?.calculate_diagram()
    }

    pub fn cost_summary(&self, production_id: ProductionId) -> Result<CostBreakdown> {
        Ok(self.calculator(production_id)?.cost_summary())
    }

    /// 流程圖快照（`diagram_data`），有效時直接回傳緩存
    pub fn diagram_snapshot(
        &mut self,
        production_id: ProductionId,
    ) -> std::result::Result<DiagramSnapshot, CacheError> {
        let repository = &self.repository;
        let config = &self.config;
        self.cache.get_or_compute(production_id, || {
            let snapshot = LotSnapshot::load(repository, production_id)?;
            ProductionCalculator::new(snapshot, config.clone()).calculate_diagram()
        })
    }
}
