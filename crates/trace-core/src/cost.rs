//! 生產成本模型

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CatalogId, CostId, ProductionId, RecordId, Result, TraceError};

/// 成本類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostType {
    Production,
    Labor,
    Operational,
    Packaging,
}

/// 成本歸屬範圍（單一製程紀錄或整個批次）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum CostScope {
    Record(RecordId),
    Production(ProductionId),
}

/// 成本計算基礎
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "basis", content = "amount", rename_all = "snake_case")]
pub enum CostBasis {
    /// 總成本
    Absolute(Decimal),
    /// 每公斤成本，實際總額依範圍內產出重量計算
    PerKg(Decimal),
}

impl CostBasis {
    /// 依產出重量計算實際總成本
    pub fn effective_total(&self, output_weight_kg: Decimal) -> Decimal {
        match *self {
            Self::Absolute(total) => total,
            Self::PerKg(rate) => rate * output_weight_kg,
        }
    }
}

/// 成本目錄項目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCatalogEntry {
    pub id: CatalogId,
    pub name: String,
    pub cost_type: CostType,
}

/// 生產成本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionCost {
    pub id: CostId,
    pub scope: CostScope,
    pub cost_type: CostType,
    pub name: String,
    pub basis: CostBasis,
    pub cost_catalog_id: Option<CatalogId>,
    pub cost_date: Option<NaiveDate>,
}

impl ProductionCost {
    pub fn new(
        id: CostId,
        scope: CostScope,
        cost_type: CostType,
        name: impl Into<String>,
        basis: CostBasis,
    ) -> Self {
        Self {
            id,
            scope,
            cost_type,
            name: name.into(),
            basis,
            cost_catalog_id: None,
            cost_date: None,
        }
    }

    /// 建構器模式：設置成本日期
    pub fn with_cost_date(mut self, date: NaiveDate) -> Self {
        self.cost_date = Some(date);
        self
    }

    /// 從可空欄位建立並驗證
    ///
    /// - `production_record_id` 與 `production_id` 必須恰好一個有值
    /// - `total_cost` 與 `cost_per_kg` 必須恰好一個有值且不為負
    /// - `cost_catalog_id` 必須存在於目錄中，未提供名稱時沿用目錄名稱與類型
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: CostId,
        production_record_id: Option<RecordId>,
        production_id: Option<ProductionId>,
        cost_type: Option<CostType>,
        name: Option<String>,
        total_cost: Option<Decimal>,
        cost_per_kg: Option<Decimal>,
        cost_catalog_id: Option<CatalogId>,
        catalog: &[CostCatalogEntry],
    ) -> Result<Self> {
        let scope = match (production_record_id, production_id) {
            (Some(record_id), None) => CostScope::Record(record_id),
            (None, Some(production_id)) => CostScope::Production(production_id),
            (Some(_), Some(_)) => {
                return Err(TraceError::DataIntegrity(
                    "成本只能歸屬於製程紀錄或生產批次其中之一".to_string(),
                ))
            }
            (None, None) => {
                return Err(TraceError::DataIntegrity(
                    "成本必須歸屬於製程紀錄或生產批次".to_string(),
                ))
            }
        };

        let basis = match (total_cost, cost_per_kg) {
            (Some(total), None) => CostBasis::Absolute(total),
            (None, Some(rate)) => CostBasis::PerKg(rate),
            (Some(_), Some(_)) => {
                return Err(TraceError::DataIntegrity(
                    "total_cost 與 cost_per_kg 不可同時設置".to_string(),
                ))
            }
            (None, None) => {
                return Err(TraceError::DataIntegrity(
                    "必須設置 total_cost 或 cost_per_kg".to_string(),
                ))
            }
        };

        let amount = match basis {
            CostBasis::Absolute(v) | CostBasis::PerKg(v) => v,
        };
        if amount < Decimal::ZERO {
            return Err(TraceError::DataIntegrity(format!("成本不可為負: {amount}")));
        }

        let catalog_entry = match cost_catalog_id {
            Some(catalog_id) => Some(
                catalog
                    .iter()
                    .find(|entry| entry.id == catalog_id)
                    .ok_or(TraceError::MissingReference {
                        entity: "成本目錄",
                        id: catalog_id,
                    })?,
            ),
            None => None,
        };

        let cost_type = cost_type
            .or_else(|| catalog_entry.map(|entry| entry.cost_type))
            .ok_or_else(|| TraceError::DataIntegrity("必須設置成本類型".to_string()))?;
        let name = name
            .or_else(|| catalog_entry.map(|entry| entry.name.clone()))
            .ok_or_else(|| TraceError::DataIntegrity("必須設置成本名稱".to_string()))?;

        Ok(Self {
            id,
            scope,
            cost_type,
            name,
            basis,
            cost_catalog_id,
            cost_date: None,
        })
    }
}
