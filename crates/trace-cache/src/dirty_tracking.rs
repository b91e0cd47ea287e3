//! 髒標記追蹤

use std::collections::HashSet;

use trace_core::{InputEvent, InputEventListener, ProductionId};

/// 髒標記追蹤器
///
/// 記錄哪些生產批次自上次計算後有投入異動。
#[derive(Debug, Clone)]
pub struct DirtyTracker {
    dirty_productions: HashSet<ProductionId>,
}

impl DirtyTracker {
    /// 創建新的追蹤器
    pub fn new() -> Self {
        Self {
            dirty_productions: HashSet::new(),
        }
    }

    /// 標記批次為髒
    pub fn mark_dirty(&mut self, production_id: ProductionId) {
        self.dirty_productions.insert(production_id);
    }

    /// 檢查批次是否為髒
    pub fn is_dirty(&self, production_id: ProductionId) -> bool {
        self.dirty_productions.contains(&production_id)
    }

    /// 清除單一批次的髒標記，回傳原本是否為髒
    pub fn clear_dirty(&mut self, production_id: ProductionId) -> bool {
        self.dirty_productions.remove(&production_id)
    }

    /// 清除所有髒標記
    pub fn clear(&mut self) {
        self.dirty_productions.clear();
    }

    /// 獲取所有髒批次（依ID排序）
    pub fn dirty_productions(&self) -> Vec<ProductionId> {
        let mut ids: Vec<ProductionId> = self.dirty_productions.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for DirtyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InputEventListener for DirtyTracker {
    fn on_input_event(&mut self, event: &InputEvent) {
        self.mark_dirty(event.production_id());
    }
}
