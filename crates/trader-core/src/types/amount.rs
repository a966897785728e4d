//! 주문 요청의 수치 필드.
//!
//! 호출자는 가격/수량을 `Decimal`, 문자열, 퍼센트(`"1.5%"`) 중 어떤 형태로도
//! 넘길 수 있습니다. 해석은 검증 단계에서 이루어지며, 해석할 수 없는 값은
//! `Amount::Raw`로 보존되어 검증기가 필드 이름과 함께 거부합니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 가격, 가격2, 수량 입력값.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Amount {
    /// 절대값
    Value(Decimal),
    /// 퍼센트 (트레일링 거리 전용, `1.5` = 1.5%)
    Percent(Decimal),
    /// 숫자로 해석할 수 없는 원본 입력
    Raw(String),
}

impl Amount {
    /// 문자열을 해석합니다. 앞의 `+` 부호는 무시하고 `%` 접미사는 퍼센트로 처리합니다.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);

        if let Some(pct) = unsigned.strip_suffix('%') {
            return match Decimal::from_str(pct.trim()) {
                Ok(value) => Amount::Percent(value),
                Err(_) => Amount::Raw(input.to_string()),
            };
        }

        match Decimal::from_str(unsigned) {
            Ok(value) => Amount::Value(value),
            Err(_) => Amount::Raw(input.to_string()),
        }
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::Value(value)
    }
}

impl From<&str> for Amount {
    fn from(value: &str) -> Self {
        Amount::parse(value)
    }
}

impl From<String> for Amount {
    fn from(value: String) -> Self {
        Amount::parse(&value)
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Value(v) => write!(f, "{}", v),
            Amount::Percent(v) => write!(f, "{}%", v),
            Amount::Raw(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_forms() {
        assert_eq!(Amount::parse("35000.00"), Amount::Value(dec!(35000.00)));
        assert_eq!(Amount::parse(" +12.5 "), Amount::Value(dec!(12.5)));
        assert_eq!(Amount::parse("+1.5%"), Amount::Percent(dec!(1.5)));
        assert_eq!(Amount::parse("-3"), Amount::Value(dec!(-3)));
        assert_eq!(Amount::parse("abc"), Amount::Raw("abc".to_string()));
        assert_eq!(Amount::parse("%"), Amount::Raw("%".to_string()));
    }

    #[test]
    fn test_serde_as_string() {
        let amount: Amount = serde_json::from_str("\"2%\"").unwrap();
        assert_eq!(amount, Amount::Percent(dec!(2)));
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"2%\"");
    }
}
