//! # Trace Calculation Engine
//!
//! 製程樹、產率與批次對帳計算引擎

pub mod allocation;
pub mod calculator;
pub mod cost;
pub mod diagram;
pub mod reconciliation;
pub mod totals;
pub mod tree;

use serde::Serialize;

// Re-export 主要類型
pub use allocation::{LotAllocations, Quantity};
pub use calculator::ProductionCalculator;
pub use cost::{CostBreakdown, CostCalculator};
pub use diagram::{DiagramAssembler, ProcessDiagram, ReconciliationNode};
pub use reconciliation::{DetailedReconciliation, ProductReconciliation, ReconciliationStatus};
pub use totals::{GlobalTotals, NodeTotals};
pub use tree::{RecordNode, TreeBuilder};

/// 資料完整性警告（不中斷計算）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceWarning {
    pub subject: String,
    pub message: String,
    pub severity: WarningSeverity,
}

impl TraceWarning {
    pub fn new(subject: String, message: String, severity: WarningSeverity) -> Self {
        Self {
            subject,
            message,
            severity,
        }
    }

    pub fn info(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Info)
    }

    pub fn warning(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Warning)
    }

    pub fn error(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    Info,
    Warning,
    Error,
}
