//! # Trace Cache
//!
//! 流程圖快照緩存與髒標記

pub mod diagram_cache;
pub mod dirty_tracking;

// Re-export 主要類型
pub use diagram_cache::{CacheError, DiagramCache, DiagramSnapshot};
pub use dirty_tracking::DirtyTracker;
