//! 對帳配置模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Result, TraceError};

/// 對帳與製程樹計算參數
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// 平衡容差（公斤），差額絕對值不超過此值視為平衡
    pub balance_tolerance_kg: Decimal,

    /// 警告門檻（百分比）
    /// - 差額百分比絕對值 <= 門檻：警告
    /// - 超過門檻：錯誤
    pub warning_threshold_percentage: Decimal,

    /// 製程樹最大深度（防止循環資料造成無限遞迴）
    pub max_tree_depth: usize,

    /// 顯示層小數位數
    pub decimal_places: u32,
}

impl ReconciliationConfig {
    /// 創建預設配置
    pub fn new() -> Self {
        Self {
            balance_tolerance_kg: Decimal::new(1, 2),
            warning_threshold_percentage: Decimal::from(5),
            max_tree_depth: 64,
            decimal_places: 2,
        }
    }

    /// 從 JSON 文件載入配置（缺少的欄位使用預設值）
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TraceError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 建構器模式：設置平衡容差
    pub fn with_balance_tolerance(mut self, tolerance_kg: Decimal) -> Self {
        self.balance_tolerance_kg = tolerance_kg;
        self
    }

    /// 建構器模式：設置警告門檻
    pub fn with_warning_threshold(mut self, percentage: Decimal) -> Self {
        self.warning_threshold_percentage = percentage;
        self
    }

    /// 建構器模式：設置最大樹深度
    pub fn with_max_tree_depth(mut self, depth: usize) -> Self {
        self.max_tree_depth = depth;
        self
    }

    /// 建構器模式：設置小數位數
    pub fn with_decimal_places(mut self, decimal_places: u32) -> Self {
        self.decimal_places = decimal_places;
        self
    }

    /// 檢查配置是否合法
    pub fn validate(&self) -> Result<()> {
        if self.balance_tolerance_kg < Decimal::ZERO {
            return Err(TraceError::InvalidConfig(format!(
                "平衡容差不可為負: {}",
                self.balance_tolerance_kg
            )));
        }
        if self.warning_threshold_percentage < Decimal::ZERO {
            return Err(TraceError::InvalidConfig(format!(
                "警告門檻不可為負: {}",
                self.warning_threshold_percentage
            )));
        }
        if self.max_tree_depth == 0 {
            return Err(TraceError::InvalidConfig(
                "製程樹最大深度必須大於 0".to_string(),
            ));
        }
        if self.decimal_places > 10 {
            return Err(TraceError::InvalidConfig(format!(
                "小數位數過大: {}",
                self.decimal_places
            )));
        }
        Ok(())
    }

    /// 依配置的小數位數四捨五入
    pub fn round(&self, value: Decimal) -> Decimal {
        crate::decimal::round_dp(value, self.decimal_places)
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReconciliationConfig::default();

        assert_eq!(config.balance_tolerance_kg, Decimal::new(1, 2));
        assert_eq!(config.warning_threshold_percentage, Decimal::from(5));
        assert_eq!(config.decimal_places, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ReconciliationConfig::new()
            .with_balance_tolerance(Decimal::new(5, 1))
            .with_warning_threshold(Decimal::from(10))
            .with_max_tree_depth(8)
            .with_decimal_places(3);

        assert_eq!(config.balance_tolerance_kg, Decimal::new(5, 1));
        assert_eq!(config.warning_threshold_percentage, Decimal::from(10));
        assert_eq!(config.max_tree_depth, 8);
        assert_eq!(config.round(Decimal::new(12345, 4)), Decimal::new(1235, 3));
    }

    #[test]
    fn test_invalid_config() {
        let config = ReconciliationConfig::new().with_max_tree_depth(0);
        assert!(matches!(config.validate(), Err(TraceError::InvalidConfig(_))));

        let config = ReconciliationConfig::new().with_balance_tolerance(Decimal::from(-1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config =
            ReconciliationConfig::from_json_str(r#"{"warning_threshold_percentage": "2.5"}"#)
                .unwrap();

        assert_eq!(config.warning_threshold_percentage, Decimal::new(25, 1));
        assert_eq!(config.max_tree_depth, 64);

        assert!(ReconciliationConfig::from_json_str(r#"{"max_tree_depth": 0}"#).is_err());
        assert!(ReconciliationConfig::from_json_str("not json").is_err());
    }
}
