//! 거래쌍 메타데이터와 기준 가격.
//!
//! 검증기는 최대 레버리지와 기준 가격(퍼센트 트레일링 거리 변환용)을
//! `InstrumentCatalog`를 통해 조회합니다. `InstrumentBoard`는 설정과
//! 호출자의 가격 피드로 채워지는 메모리 구현입니다.

use crate::types::{normalize_pair, Price};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// 거래쌍 메타데이터 조회 인터페이스.
pub trait InstrumentCatalog: Send + Sync {
    /// 거래쌍의 최대 레버리지. 설정이 없으면 레버리지 불가.
    fn max_leverage(&self, pair: &str) -> Option<u32>;

    /// 거래쌍의 최근 기준 가격.
    fn reference_price(&self, pair: &str) -> Option<Price>;
}

/// 거래쌍별 정보.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentInfo {
    pub max_leverage: Option<u32>,
    pub reference_price: Option<Price>,
    pub price_updated_at: Option<DateTime<Utc>>,
}

/// 메모리 기반 거래쌍 보드.
#[derive(Debug, Default)]
pub struct InstrumentBoard {
    instruments: RwLock<HashMap<String, InstrumentInfo>>,
}

impl InstrumentBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 최대 레버리지 목록으로 보드를 생성합니다.
    pub fn with_leverage_limits<I, S>(limits: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        let board = Self::new();
        for (pair, max) in limits {
            board.set_max_leverage(pair.as_ref(), max);
        }
        board
    }

    pub fn set_max_leverage(&self, pair: &str, max_leverage: u32) {
        let mut instruments = self.instruments.write().unwrap_or_else(PoisonError::into_inner);
        instruments
            .entry(normalize_pair(pair))
            .or_default()
            .max_leverage = Some(max_leverage);
    }

    /// 가격 피드로부터 기준 가격을 갱신합니다.
    pub fn update_price(&self, pair: &str, price: Price) {
        let mut instruments = self.instruments.write().unwrap_or_else(PoisonError::into_inner);
        let info = instruments.entry(normalize_pair(pair)).or_default();
        info.reference_price = Some(price);
        info.price_updated_at = Some(Utc::now());
    }

    pub fn get(&self, pair: &str) -> Option<InstrumentInfo> {
        let instruments = self.instruments.read().unwrap_or_else(PoisonError::into_inner);
        instruments.get(&normalize_pair(pair)).cloned()
    }
}

impl InstrumentCatalog for InstrumentBoard {
    fn max_leverage(&self, pair: &str) -> Option<u32> {
        self.get(pair).and_then(|info| info.max_leverage)
    }

    fn reference_price(&self, pair: &str) -> Option<Price> {
        self.get(pair).and_then(|info| info.reference_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_board_normalizes_keys() {
        let board = InstrumentBoard::with_leverage_limits([("xbt usd", 5)]);
        board.update_price(" XBTusd", dec!(35000));

        assert_eq!(board.max_leverage("XBTUSD"), Some(5));
        assert_eq!(board.reference_price("xbtusd"), Some(dec!(35000)));
        assert!(board.get("XBTUSD").unwrap().price_updated_at.is_some());
    }

    #[test]
    fn test_unknown_pair() {
        let board = InstrumentBoard::new();
        assert_eq!(board.max_leverage("ETHUSD"), None);
        assert_eq!(board.reference_price("ETHUSD"), None);
    }
}
