//! 정밀한 금융 계산을 위한 Decimal 유틸리티.

use rust_decimal::Decimal;

/// 금융 정밀도를 위한 가격 타입.
pub type Price = Decimal;

/// 주문 수량을 위한 타입.
pub type Quantity = Decimal;

/// Decimal 연산을 위한 확장 트레이트.
pub trait DecimalExt {
    /// 0보다 큰지 확인합니다.
    fn is_strictly_positive(&self) -> bool;

    /// 퍼센트 값을 기준 가격에 대한 절대 거리로 변환합니다.
    fn percent_of(&self, reference: Decimal) -> Decimal;

    /// 불필요한 후행 0을 제거한 문자열로 변환합니다 (거래소 전송용).
    fn to_wire_string(&self) -> String;
}

impl DecimalExt for Decimal {
    fn is_strictly_positive(&self) -> bool {
        *self > Decimal::ZERO
    }

    fn percent_of(&self, reference: Decimal) -> Decimal {
        (reference * *self / Decimal::ONE_HUNDRED).normalize()
    }

    fn to_wire_string(&self) -> String {
        self.normalize().to_string()
    }
}
