//! 生產批次與製程紀錄模型

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{ProcessId, ProductionId, RecordId};

/// 生產批次（Lot）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Production {
    /// 批次ID
    pub id: ProductionId,

    /// 批號（業務唯一鍵）
    pub lot: String,

    /// 生產日期
    pub date: Option<NaiveDate>,

    /// 魚種
    pub species: Option<String>,

    /// 捕撈區域
    pub capture_zone: Option<String>,

    /// 備註
    pub notes: Option<String>,

    /// 開啟時間
    pub opened_at: Option<DateTime<Utc>>,

    /// 關閉時間（None 表示仍開啟）
    pub closed_at: Option<DateTime<Utc>>,
}

impl Production {
    /// 創建新的生產批次（尚未開啟）
    pub fn new(id: ProductionId, lot: impl Into<String>) -> Self {
        Self {
            id,
            lot: lot.into(),
            date: None,
            species: None,
            capture_zone: None,
            notes: None,
            opened_at: None,
            closed_at: None,
        }
    }

    /// 建構器模式：設置生產日期
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// 建構器模式：設置魚種
    pub fn with_species(mut self, species: impl Into<String>) -> Self {
        self.species = Some(species.into());
        self
    }

    /// 建構器模式：設置捕撈區域
    pub fn with_capture_zone(mut self, capture_zone: impl Into<String>) -> Self {
        self.capture_zone = Some(capture_zone.into());
        self
    }

    /// 開啟批次
    pub fn open(&mut self, at: DateTime<Utc>) {
        if self.opened_at.is_none() {
            self.opened_at = Some(at);
        }
        self.closed_at = None;
    }

    /// 關閉批次（冪等：重複關閉保留第一次的時間）
    pub fn close(&mut self, at: DateTime<Utc>) {
        if self.closed_at.is_none() {
            self.closed_at = Some(at);
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

/// 製程類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessType {
    /// 起始製程（接收原料）
    Starting,
    /// 中間製程
    Process,
    /// 最終製程（包裝）
    Final,
}

/// 製程定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    pub name: String,
    pub process_type: ProcessType,
}

impl Process {
    pub fn new(id: ProcessId, name: impl Into<String>, process_type: ProcessType) -> Self {
        Self {
            id,
            name: name.into(),
            process_type,
        }
    }
}

/// 製程紀錄（製程樹節點）
///
/// 根節點、最終節點等分類由關聯資料推導，不在此儲存。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionRecord {
    /// 紀錄ID
    pub id: RecordId,

    /// 所屬生產批次
    pub production_id: ProductionId,

    /// 父紀錄（None 表示根節點）
    pub parent_record_id: Option<RecordId>,

    /// 製程
    pub process: Option<Process>,

    /// 開始時間
    pub started_at: Option<DateTime<Utc>>,

    /// 結束時間
    pub finished_at: Option<DateTime<Utc>>,

    /// 備註
    pub notes: Option<String>,
}

impl ProductionRecord {
    /// 創建新的根製程紀錄
    pub fn new(id: RecordId, production_id: ProductionId) -> Self {
        Self {
            id,
            production_id,
            parent_record_id: None,
            process: None,
            started_at: None,
            finished_at: None,
            notes: None,
        }
    }

    /// 建構器模式：設置父紀錄
    pub fn with_parent(mut self, parent_record_id: RecordId) -> Self {
        self.parent_record_id = Some(parent_record_id);
        self
    }

    /// 建構器模式：設置製程
    pub fn with_process(mut self, process: Process) -> Self {
        self.process = Some(process);
        self
    }

    /// 建構器模式：設置起訖時間
    pub fn with_period(
        mut self,
        started_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.started_at = Some(started_at);
        self.finished_at = finished_at;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_record_id.is_none()
    }

    pub fn is_completed(&self) -> bool {
        self.finished_at.is_some()
    }

    /// 製程耗時（分鐘），未開始或未完成時為 None
    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_minutes()),
            _ => None,
        }
    }

    pub fn process_name(&self) -> Option<&str> {
        self.process.as_ref().map(|p| p.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_production_lifecycle() {
        let mut production = Production::new(1, "L1")
            .with_species("Merluza")
            .with_capture_zone("FAO 27");
        let opened = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let closed = Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap();

        production.open(opened);
        assert!(production.is_open());

        production.close(closed);
        assert!(production.is_closed());

        // 重複關閉不改變時間
        production.close(later);
        assert_eq!(production.closed_at, Some(closed));
    }

    #[test]
    fn test_record_classification_and_duration() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();

        let root = ProductionRecord::new(1, 1)
            .with_process(Process::new(10, "Fileteado", ProcessType::Starting))
            .with_period(start, Some(end));
        let child = ProductionRecord::new(2, 1).with_parent(1);

        assert!(root.is_root());
        assert!(!child.is_root());
        assert!(root.is_completed());
        assert_eq!(root.duration_minutes(), Some(90));
        assert_eq!(child.duration_minutes(), None);
        assert_eq!(root.process_name(), Some("Fileteado"));
    }
}
