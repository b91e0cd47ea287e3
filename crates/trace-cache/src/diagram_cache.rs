//! 流程圖快照緩存
//!
//! 保存每個生產批次最近一次計算的流程圖 JSON（`diagram_data`）。
//! 投入新增或刪除時，消耗端批次與箱所屬批次都被標記為髒，下次讀取時
//! 重新計算。
//! 緩存是可選的，計算結果不依賴它。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trace_calc::ProcessDiagram;
use trace_core::{InputEvent, InputEventListener, ProductionId, TraceError};
use uuid::Uuid;

use crate::dirty_tracking::DirtyTracker;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("流程圖計算失敗: {0}")]
    Compute(#[from] TraceError),

    #[error("流程圖序列化失敗: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 流程圖快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramSnapshot {
    pub id: Uuid,
    pub production_id: ProductionId,
    pub lot: String,
    pub generated_at: DateTime<Utc>,
    pub diagram_data: serde_json::Value,
}

impl DiagramSnapshot {
    /// 序列化流程圖為新的快照
    pub fn capture(production_id: ProductionId, diagram: &ProcessDiagram) -> Result<Self, CacheError> {
        Ok(Self {
            id: Uuid::new_v4(),
            production_id,
            lot: diagram.lot.clone(),
            generated_at: Utc::now(),
            diagram_data: serde_json::to_value(diagram)?,
        })
    }
}

/// 緩存命中統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
pub struct DiagramCache {
    entries: HashMap<ProductionId, DiagramSnapshot>,
    dirty: DirtyTracker,
    stats: CacheStats,
}

impl DiagramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得有效快照；批次為髒或尚未計算時回傳 None
    pub fn get(&self, production_id: ProductionId) -> Option<&DiagramSnapshot> {
        if self.dirty.is_dirty(production_id) {
            return None;
        }
        self.entries.get(&production_id)
    }

    /// 取得快照，無效時以 `compute` 重新計算並保存
    pub fn get_or_compute<F>(
        &mut self,
        production_id: ProductionId,
        compute: F,
    ) -> Result<DiagramSnapshot, CacheError>
    where
        F: FnOnce() -> trace_core::Result<ProcessDiagram>,
    {
        if let Some(cached) = self.get(production_id) {
            let cached = cached.clone();
            self.stats.hits += 1;
            tracing::debug!("批次 {} 流程圖緩存命中", production_id);
            return Ok(cached);
        }

        self.stats.misses += 1;
        tracing::debug!("批次 {} 流程圖緩存未命中，重新計算", production_id);

        let diagram = compute()?;
        let snapshot = DiagramSnapshot::capture(production_id, &diagram)?;

        self.entries.insert(production_id, snapshot.clone());
        self.dirty.clear_dirty(production_id);

        Ok(snapshot)
    }

    /// 使批次快照失效
    pub fn invalidate(&mut self, production_id: ProductionId) {
        if self.entries.contains_key(&production_id) {
            self.stats.invalidations += 1;
        }
        self.dirty.mark_dirty(production_id);
    }

    /// 使所有批號為 `lot` 的快照失效
    pub fn invalidate_lot(&mut self, lot: &str) {
        let owners: Vec<ProductionId> = self
            .entries
            .values()
            .filter(|snapshot| snapshot.lot == lot)
            .map(|snapshot| snapshot.production_id)
            .collect();
        for production_id in owners {
            self.invalidate(production_id);
        }
    }

    pub fn is_stale(&self, production_id: ProductionId) -> bool {
        self.dirty.is_dirty(production_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dirty.clear();
    }
}

impl InputEventListener for DiagramCache {
    fn on_input_event(&mut self, event: &InputEvent) {
        tracing::debug!(
            "投入異動，批次 {} 與批號 {} 的流程圖失效",
            event.production_id(),
            event.box_lot()
        );
        self.invalidate(event.production_id());
        self.invalidate_lot(event.box_lot());
    }
}
