//! 정밀한 금융 계산을 위한 Decimal 유틸리티.
//!
//! 모든 금액 연산은 `rust_decimal::Decimal`로 수행하며, 반올림은 항상
//! 내림(floor)입니다. 봇이 설정된 예산보다 많이 주문하거나 수익을
//! 과대 보고하는 일이 없어야 합니다.

use rust_decimal::{Decimal, RoundingStrategy};

/// 금융 정밀도를 위한 가격 타입.
pub type Price = Decimal;

/// 주문 수량을 위한 타입.
pub type Quantity = Decimal;

/// 호가 통화 금액을 위한 타입.
pub type Amount = Decimal;

/// 내림 연산을 위한 확장 트레이트.
pub trait DecimalFloorExt {
    /// 지정된 소수점 자릿수로 내림합니다.
    fn floor_dp(&self, dp: u32) -> Decimal;

    /// 지정된 증분(increment)의 배수로 내림합니다.
    ///
    /// 증분이 0 이하이면 값을 그대로 반환합니다.
    fn floor_to_increment(&self, increment: Decimal) -> Decimal;
}

impl DecimalFloorExt for Decimal {
    fn floor_dp(&self, dp: u32) -> Decimal {
        self.round_dp_with_strategy(dp, RoundingStrategy::ToNegativeInfinity)
    }

    fn floor_to_increment(&self, increment: Decimal) -> Decimal {
        if increment <= Decimal::ZERO {
            return *self;
        }
        (self / increment).floor() * increment
    }
}
