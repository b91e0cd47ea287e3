//! 數值工具：百分比與顯示層四捨五入

use rust_decimal::{Decimal, RoundingStrategy};

/// 百分比（part / whole * 100），分母為零時回傳 0
pub fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    part / whole * Decimal::ONE_HUNDRED
}

/// 顯示層四捨五入（遠離零）
///
/// 累加過程保持完整精度，只在輸出時呼叫。
pub fn round_dp(value: Decimal, decimal_places: u32) -> Decimal {
    value
        .round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_guards_zero() {
        assert_eq!(percentage(Decimal::from(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(
            percentage(Decimal::from(25), Decimal::from(50)),
            Decimal::from(50)
        );
    }

    #[test]
    fn test_round_half_away_from_zero() {
        // 0.125 銀行家捨入會得到 0.12
        assert_eq!(round_dp(Decimal::new(125, 3), 2), Decimal::new(13, 2));
        assert_eq!(round_dp(Decimal::new(-125, 3), 2), Decimal::new(-13, 2));
        assert_eq!(
            round_dp(percentage(Decimal::from(10), Decimal::from(90)), 2),
            Decimal::new(1111, 2)
        );
    }
}
