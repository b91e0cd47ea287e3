//! 製程物料流：投入、產出、產出消耗與產出來源

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::events::InputEvent;
use crate::inventory::{ProductRef, StockBox};
use crate::production::ProductionRecord;
use crate::{
    BoxId, ConsumptionId, InputId, OutputId, RecordId, Result, SourceId, TraceError,
};

/// 製程投入：製程紀錄消耗一個庫存箱
///
/// 重量、批號、產品皆由所參照的箱推導，不重複儲存。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionInput {
    pub id: InputId,
    pub production_record_id: RecordId,
    pub box_id: BoxId,
}

impl ProductionInput {
    pub fn new(id: InputId, production_record_id: RecordId, box_id: BoxId) -> Self {
        Self {
            id,
            production_record_id,
            box_id,
        }
    }

    /// 登記消耗一箱，並產生通知棧板狀態機的事件
    ///
    /// 一箱最多只能被一個投入參照，已消耗的箱會被拒絕。
    pub fn consume(
        id: InputId,
        record: &ProductionRecord,
        stock_box: &StockBox,
    ) -> Result<(Self, InputEvent)> {
        if !stock_box.is_available() {
            return Err(TraceError::DataIntegrity(format!(
                "箱 {} 已被製程紀錄 {:?} 消耗",
                stock_box.id,
                stock_box.destination_record()
            )));
        }

        let input = Self::new(id, record.id, stock_box.id);
        let event = InputEvent::Added {
            box_id: stock_box.id,
            box_lot: stock_box.lot.clone(),
            pallet_id: stock_box.pallet_id,
            production_record_id: record.id,
            production_id: record.production_id,
        };
        Ok((input, event))
    }
}

/// 製程產出（每個產品一筆）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionOutput {
    pub id: OutputId,
    pub production_record_id: RecordId,
    pub product: ProductRef,
    /// 產出批號
    pub lot_id: Option<String>,
    /// 箱數
    pub boxes: u32,
    /// 重量（公斤）
    pub weight_kg: Decimal,
}

impl ProductionOutput {
    pub fn new(
        id: OutputId,
        production_record_id: RecordId,
        product: ProductRef,
        boxes: u32,
        weight_kg: Decimal,
    ) -> Self {
        Self {
            id,
            production_record_id,
            product,
            lot_id: None,
            boxes,
            weight_kg,
        }
    }

    /// 建構器模式：設置產出批號
    pub fn with_lot_id(mut self, lot_id: impl Into<String>) -> Self {
        self.lot_id = Some(lot_id.into());
        self
    }

    /// 平均每箱重量，無箱數時為 0
    pub fn average_weight_per_box(&self) -> Decimal {
        if self.boxes == 0 {
            return Decimal::ZERO;
        }
        self.weight_kg / Decimal::from(self.boxes)
    }
}

/// 子製程消耗父製程產出的紀錄
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionOutputConsumption {
    pub id: ConsumptionId,
    /// 消耗方（子製程紀錄）
    pub production_record_id: RecordId,
    /// 被消耗的父產出
    pub production_output_id: OutputId,
    pub consumed_weight_kg: Decimal,
    pub consumed_boxes: u32,
    pub notes: Option<String>,
}

impl ProductionOutputConsumption {
    pub fn new(
        id: ConsumptionId,
        production_record_id: RecordId,
        production_output_id: OutputId,
        consumed_weight_kg: Decimal,
        consumed_boxes: u32,
    ) -> Self {
        Self {
            id,
            production_record_id,
            production_output_id,
            consumed_weight_kg,
            consumed_boxes,
            notes: None,
        }
    }

    /// 是否已消耗完整產出（箱數與重量皆達到）
    pub fn is_complete(&self, output: &ProductionOutput) -> bool {
        self.consumed_boxes >= output.boxes && self.consumed_weight_kg >= output.weight_kg
    }
}

/// 產出來源類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// 來自庫存箱（透過投入）
    StockBox,
    /// 來自父製程產出（透過產出消耗）
    ParentOutput,
}

/// 產出來源參照（兩者互斥）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source_type", content = "id", rename_all = "snake_case")]
pub enum SourceRef {
    StockBox(InputId),
    ParentOutput(ConsumptionId),
}

impl SourceRef {
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::StockBox(_) => SourceType::StockBox,
            Self::ParentOutput(_) => SourceType::ParentOutput,
        }
    }
}

/// 來源貢獻量：重量與百分比
///
/// 恆等式：`weight_kg == output.weight_kg * percentage / 100`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub weight_kg: Decimal,
    pub percentage: Decimal,
}

impl Contribution {
    /// 由單側推導另一側；兩側皆有時檢查一致性
    pub fn resolve(
        output_weight_kg: Decimal,
        weight_kg: Option<Decimal>,
        percentage: Option<Decimal>,
    ) -> Result<Self> {
        if let Some(pct) = percentage {
            if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
                return Err(TraceError::DataIntegrity(format!(
                    "貢獻百分比超出範圍: {pct}"
                )));
            }
        }
        if let Some(weight) = weight_kg {
            if weight < Decimal::ZERO {
                return Err(TraceError::DataIntegrity(format!(
                    "貢獻重量不可為負: {weight}"
                )));
            }
        }

        match (weight_kg, percentage) {
            (Some(weight), Some(pct)) => {
                let expected = output_weight_kg * pct / Decimal::ONE_HUNDRED;
                if (expected - weight).abs() > Decimal::new(1, 2) {
                    return Err(TraceError::DataIntegrity(format!(
                        "貢獻重量 {weight} 與百分比 {pct}% 不一致（預期 {expected}）"
                    )));
                }
                Ok(Self {
                    weight_kg: weight,
                    percentage: pct,
                })
            }
            (Some(weight), None) => Ok(Self {
                weight_kg: weight,
                percentage: crate::decimal::percentage(weight, output_weight_kg),
            }),
            (None, Some(pct)) => Ok(Self {
                weight_kg: output_weight_kg * pct / Decimal::ONE_HUNDRED,
                percentage: pct,
            }),
            (None, None) => Err(TraceError::DataIntegrity(
                "產出來源必須提供貢獻重量或貢獻百分比".to_string(),
            )),
        }
    }
}

/// 產出來源：記錄產出物料的出處
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOutputSource {
    pub id: SourceId,
    pub production_output_id: OutputId,
    pub source: SourceRef,
    pub contribution: Contribution,
}

impl ProductionOutputSource {
    /// 從原始欄位建立並驗證
    ///
    /// `source_type` 決定哪一個參照欄位必須有值，另一個必須為空。
    pub fn from_parts(
        id: SourceId,
        output: &ProductionOutput,
        source_type: SourceType,
        production_input_id: Option<InputId>,
        production_output_consumption_id: Option<ConsumptionId>,
        contributed_weight_kg: Option<Decimal>,
        contribution_percentage: Option<Decimal>,
    ) -> Result<Self> {
        let source = match (
            source_type,
            production_input_id,
            production_output_consumption_id,
        ) {
            (SourceType::StockBox, Some(input_id), None) => SourceRef::StockBox(input_id),
            (SourceType::ParentOutput, None, Some(consumption_id)) => {
                SourceRef::ParentOutput(consumption_id)
            }
            (SourceType::StockBox, _, _) => {
                return Err(TraceError::DataIntegrity(
                    "stock_box 來源必須且只能設置 production_input_id".to_string(),
                ))
            }
            (SourceType::ParentOutput, _, _) => {
                return Err(TraceError::DataIntegrity(
                    "parent_output 來源必須且只能設置 production_output_consumption_id"
                        .to_string(),
                ))
            }
        };

        let contribution = Contribution::resolve(
            output.weight_kg,
            contributed_weight_kg,
            contribution_percentage,
        )?;

        Ok(Self {
            id,
            production_output_id: output.id,
            source,
            contribution,
        })
    }

    pub fn source_type(&self) -> SourceType {
        self.source.source_type()
    }
}
