//! 주문 타입 및 생명주기.
//!
//! 이 모듈은 주문 실행 코어의 주문 관련 타입을 정의합니다:
//! - `Side` - 주문 방향 (매수/매도)
//! - `OrderType` - 10가지 주문 유형
//! - `OrderRequest` - 호출자가 작성하는 느슨한 주문 요청
//! - `OrderKind` / `NormalizedOrder` - 검증을 통과한 주문 (유형별 필드만 보유)
//! - `OrderStatusType` - 주문 생명주기 상태
//! - `Order` - 레지스트리가 보관하는 주문 엔티티
//! - `OrderEvent` - 생명주기 이벤트

use crate::types::{Amount, Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 거래소 전송용 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// 주문 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderType {
    /// 시장가 주문 - 현재 시장 가격으로 즉시 체결
    Market,
    /// 지정가 주문
    Limit,
    /// 빙산 주문 - 지정가, 수량은 전체 크기
    Iceberg,
    /// 손절 주문 (트리거 후 시장가)
    StopLoss,
    /// 익절 주문 (트리거 후 시장가)
    TakeProfit,
    /// 트레일링 스톱 주문
    TrailingStop,
    /// 지정가 손절 주문
    StopLossLimit,
    /// 지정가 익절 주문
    TakeProfitLimit,
    /// 지정가 트레일링 스톱 주문
    TrailingStopLimit,
    /// 포지션 청산 주문
    SettlePosition,
}

impl OrderType {
    /// 전체 주문 유형 목록.
    pub const ALL: [OrderType; 10] = [
        OrderType::Market,
        OrderType::Limit,
        OrderType::Iceberg,
        OrderType::StopLoss,
        OrderType::TakeProfit,
        OrderType::TrailingStop,
        OrderType::StopLossLimit,
        OrderType::TakeProfitLimit,
        OrderType::TrailingStopLimit,
        OrderType::SettlePosition,
    ];

    /// 거래소 전송용 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::Iceberg => "iceberg",
            OrderType::StopLoss => "stop-loss",
            OrderType::TakeProfit => "take-profit",
            OrderType::TrailingStop => "trailing-stop",
            OrderType::StopLossLimit => "stop-loss-limit",
            OrderType::TakeProfitLimit => "take-profit-limit",
            OrderType::TrailingStopLimit => "trailing-stop-limit",
            OrderType::SettlePosition => "settle-position",
        }
    }

    /// `price`가 필수인 유형인지 확인합니다.
    pub fn requires_price(&self) -> bool {
        !matches!(self, OrderType::Market | OrderType::SettlePosition)
    }

    /// `price2`를 사용하는 지정가 트리거 유형인지 확인합니다.
    pub fn uses_price2(&self) -> bool {
        matches!(
            self,
            OrderType::StopLossLimit | OrderType::TakeProfitLimit | OrderType::TrailingStopLimit
        )
    }

    /// 가격이 트레일링 거리로 해석되는 유형인지 확인합니다.
    pub fn is_trailing(&self) -> bool {
        matches!(self, OrderType::TrailingStop | OrderType::TrailingStopLimit)
    }

    /// 조건부 청산 주문으로 사용할 수 있는지 확인합니다.
    pub fn is_close_eligible(&self) -> bool {
        !matches!(self, OrderType::Market | OrderType::SettlePosition)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 주문 플래그.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderFlag {
    /// 메이커 전용
    PostOnly,
    /// 기준 통화로 수수료 지불
    FeeInBase,
    /// 호가 통화로 수수료 지불
    FeeInQuote,
    /// 시장가 가격 보호 비활성화
    NoMarketPriceProtection,
    /// 수량을 호가 통화 단위로 해석
    VolumeInQuoteCurrency,
}

impl OrderFlag {
    /// 거래소 전송용 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderFlag::PostOnly => "post",
            OrderFlag::FeeInBase => "fcib",
            OrderFlag::FeeInQuote => "fciq",
            OrderFlag::NoMarketPriceProtection => "nompp",
            OrderFlag::VolumeInQuoteCurrency => "viqc",
        }
    }
}

/// 트리거 가격 기준.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// 마지막 체결가
    Last,
    /// 인덱스 가격
    Index,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Last => "last",
            Trigger::Index => "index",
        }
    }
}

/// 주문 유효 기간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// 취소될 때까지 유효 (Good Till Cancelled)
    GTC,
    /// 즉시 체결 또는 취소 (Immediate Or Cancel)
    IOC,
    /// 지정일까지 유효 (Good Till Date)
    GTD,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::GTC => "GTC",
            TimeInForce::IOC => "IOC",
            TimeInForce::GTD => "GTD",
        }
    }
}

/// 레버리지 비율 (`N:1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Leverage(u32);

impl Leverage {
    /// 비율 값을 반환합니다 (`3:1` → 3).
    pub fn ratio(&self) -> u32 {
        self.0
    }
}

impl FromStr for Leverage {
    type Err = String;

    /// `^[1-9][0-9]*:1$` 형식만 허용합니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ratio = s
            .strip_suffix(":1")
            .ok_or_else(|| format!("'{}' 는 'N:1' 형식이 아닙니다", s))?;

        let well_formed = !ratio.is_empty()
            && !ratio.starts_with('0')
            && ratio.chars().all(|c| c.is_ascii_digit());
        if !well_formed {
            return Err(format!("'{}' 는 'N:1' 형식이 아닙니다", s));
        }

        ratio
            .parse::<u32>()
            .map(Leverage)
            .map_err(|_| format!("레버리지 비율이 너무 큽니다: {}", s))
    }
}

impl TryFrom<String> for Leverage {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Leverage> for String {
    fn from(value: Leverage) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Leverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:1", self.0)
    }
}

// ==================== 요청 ====================

/// 조건부 청산 요청 (부모 주문 체결 시 거래소가 발주).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalCloseRequest {
    /// 청산 주문 유형
    pub order_type: OrderType,
    /// 가격
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Amount>,
    /// 가격2
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price2: Option<Amount>,
}

impl ConditionalCloseRequest {
    pub fn new(order_type: OrderType) -> Self {
        Self {
            order_type,
            price: None,
            price2: None,
        }
    }

    pub fn with_price(mut self, price: impl Into<Amount>) -> Self {
        self.price = Some(price.into());
        self
    }

    pub fn with_price2(mut self, price2: impl Into<Amount>) -> Self {
        self.price2 = Some(price2.into());
        self
    }
}

/// 새 주문 생성을 위한 주문 요청.
///
/// 유형과 무관하게 모든 필드를 가질 수 있는 느슨한 형태입니다.
/// 유형별 규칙은 검증기가 적용하며, 통과하면 `NormalizedOrder`가 됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// 거래쌍
    pub pair: String,
    /// 주문 방향
    pub side: Side,
    /// 주문 유형
    pub order_type: OrderType,
    /// 주문 수량
    pub volume: Amount,
    /// 가격 (유형에 따라 지정가, 트리거 가격 또는 트레일링 거리)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Amount>,
    /// 가격2 (지정가 트리거 유형의 지정가)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price2: Option<Amount>,
    /// 레버리지 (`"3:1"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<String>,
    /// 주문 플래그
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub flags: BTreeSet<OrderFlag>,
    /// 트리거 가격 기준
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    /// 예약 시작 시각
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// 만료 시각
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<DateTime<Utc>>,
    /// 거래소 접수 마감 시각 (이후 도착하면 거래소가 거부)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// 주문 유효 기간
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<TimeInForce>,
    /// 포지션 축소 전용
    #[serde(default)]
    pub reduce_only: bool,
    /// 검증만 수행 (거래소 드라이런)
    #[serde(default)]
    pub validate_only: bool,
    /// 사용자 그룹 참조값
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<i32>,
    /// 클라이언트 주문 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    /// 조건부 청산
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<ConditionalCloseRequest>,
}

impl OrderRequest {
    /// 새 주문 요청을 생성합니다. 나머지 필드는 비어 있습니다.
    pub fn new(
        pair: impl Into<String>,
        side: Side,
        order_type: OrderType,
        volume: impl Into<Amount>,
    ) -> Self {
        Self {
            pair: pair.into(),
            side,
            order_type,
            volume: volume.into(),
            price: None,
            price2: None,
            leverage: None,
            flags: BTreeSet::new(),
            trigger: None,
            start_time: None,
            expire_time: None,
            deadline: None,
            time_in_force: None,
            reduce_only: false,
            validate_only: false,
            user_ref: None,
            client_order_id: None,
            close: None,
        }
    }

    /// 시장가 매수 주문을 생성합니다.
    pub fn market_buy(pair: impl Into<String>, volume: impl Into<Amount>) -> Self {
        Self::new(pair, Side::Buy, OrderType::Market, volume)
    }

    /// 시장가 매도 주문을 생성합니다.
    pub fn market_sell(pair: impl Into<String>, volume: impl Into<Amount>) -> Self {
        Self::new(pair, Side::Sell, OrderType::Market, volume)
    }

    /// 지정가 매수 주문을 생성합니다.
    pub fn limit_buy(
        pair: impl Into<String>,
        volume: impl Into<Amount>,
        price: impl Into<Amount>,
    ) -> Self {
        Self::new(pair, Side::Buy, OrderType::Limit, volume).with_price(price)
    }

    /// 지정가 매도 주문을 생성합니다.
    pub fn limit_sell(
        pair: impl Into<String>,
        volume: impl Into<Amount>,
        price: impl Into<Amount>,
    ) -> Self {
        Self::new(pair, Side::Sell, OrderType::Limit, volume).with_price(price)
    }

    /// 손절 매수 주문을 생성합니다.
    pub fn stop_loss_buy(
        pair: impl Into<String>,
        volume: impl Into<Amount>,
        trigger_price: impl Into<Amount>,
    ) -> Self {
        Self::new(pair, Side::Buy, OrderType::StopLoss, volume).with_price(trigger_price)
    }

    /// 손절 매도 주문을 생성합니다.
    pub fn stop_loss_sell(
        pair: impl Into<String>,
        volume: impl Into<Amount>,
        trigger_price: impl Into<Amount>,
    ) -> Self {
        Self::new(pair, Side::Sell, OrderType::StopLoss, volume).with_price(trigger_price)
    }

    /// 익절 매수 주문을 생성합니다.
    pub fn take_profit_buy(
        pair: impl Into<String>,
        volume: impl Into<Amount>,
        trigger_price: impl Into<Amount>,
    ) -> Self {
        Self::new(pair, Side::Buy, OrderType::TakeProfit, volume).with_price(trigger_price)
    }

    /// 익절 매도 주문을 생성합니다.
    pub fn take_profit_sell(
        pair: impl Into<String>,
        volume: impl Into<Amount>,
        trigger_price: impl Into<Amount>,
    ) -> Self {
        Self::new(pair, Side::Sell, OrderType::TakeProfit, volume).with_price(trigger_price)
    }

    /// 빙산 주문을 생성합니다. `volume`은 전체 수량입니다.
    pub fn iceberg(
        pair: impl Into<String>,
        side: Side,
        volume: impl Into<Amount>,
        price: impl Into<Amount>,
    ) -> Self {
        Self::new(pair, side, OrderType::Iceberg, volume).with_price(price)
    }

    /// 트레일링 스톱 주문을 생성합니다. `offset`은 절대 거리 또는 퍼센트입니다.
    pub fn trailing_stop(
        pair: impl Into<String>,
        side: Side,
        volume: impl Into<Amount>,
        offset: impl Into<Amount>,
    ) -> Self {
        Self::new(pair, side, OrderType::TrailingStop, volume).with_price(offset)
    }

    /// 포지션 청산 주문을 생성합니다.
    pub fn settle_position(pair: impl Into<String>, side: Side, volume: impl Into<Amount>) -> Self {
        Self::new(pair, side, OrderType::SettlePosition, volume)
    }

    pub fn with_price(mut self, price: impl Into<Amount>) -> Self {
        self.price = Some(price.into());
        self
    }

    pub fn with_price2(mut self, price2: impl Into<Amount>) -> Self {
        self.price2 = Some(price2.into());
        self
    }

    /// 레버리지를 설정합니다 (`"3:1"`).
    pub fn with_leverage(mut self, leverage: impl Into<String>) -> Self {
        self.leverage = Some(leverage.into());
        self
    }

    pub fn with_flag(mut self, flag: OrderFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_expire_time(mut self, expire_time: DateTime<Utc>) -> Self {
        self.expire_time = Some(expire_time);
        self
    }

    /// 거래소 접수 마감 시각을 설정합니다.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = Some(time_in_force);
        self
    }

    pub fn with_reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    /// 거래소 드라이런으로 표시합니다 (실제 발주 없음).
    pub fn with_validate_only(mut self) -> Self {
        self.validate_only = true;
        self
    }

    pub fn with_user_ref(mut self, user_ref: i32) -> Self {
        self.user_ref = Some(user_ref);
        self
    }

    /// 클라이언트 주문 ID를 설정합니다.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_order_id = Some(client_id.into());
        self
    }

    /// 조건부 청산을 설정합니다. 주문당 하나만 가질 수 있습니다.
    pub fn with_close(mut self, close: ConditionalCloseRequest) -> Self {
        self.close = Some(close);
        self
    }
}

// ==================== 정규화된 주문 ====================

/// 유형별로 유효한 가격 필드만 가지는 주문 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OrderKind {
    Market,
    Limit { price: Price },
    Iceberg { price: Price },
    StopLoss { trigger_price: Price },
    TakeProfit { trigger_price: Price },
    TrailingStop { offset: Price },
    StopLossLimit { trigger_price: Price, limit_price: Price },
    TakeProfitLimit { trigger_price: Price, limit_price: Price },
    TrailingStopLimit { offset: Price, limit_offset: Price },
    SettlePosition,
}

impl OrderKind {
    /// 주문 유형 판별자를 반환합니다.
    pub fn order_type(&self) -> OrderType {
        match self {
            OrderKind::Market => OrderType::Market,
            OrderKind::Limit { .. } => OrderType::Limit,
            OrderKind::Iceberg { .. } => OrderType::Iceberg,
            OrderKind::StopLoss { .. } => OrderType::StopLoss,
            OrderKind::TakeProfit { .. } => OrderType::TakeProfit,
            OrderKind::TrailingStop { .. } => OrderType::TrailingStop,
            OrderKind::StopLossLimit { .. } => OrderType::StopLossLimit,
            OrderKind::TakeProfitLimit { .. } => OrderType::TakeProfitLimit,
            OrderKind::TrailingStopLimit { .. } => OrderType::TrailingStopLimit,
            OrderKind::SettlePosition => OrderType::SettlePosition,
        }
    }

    /// 전송 시 `price` 필드 값.
    pub fn price(&self) -> Option<Price> {
        match *self {
            OrderKind::Market | OrderKind::SettlePosition => None,
            OrderKind::Limit { price } | OrderKind::Iceberg { price } => Some(price),
            OrderKind::StopLoss { trigger_price }
            | OrderKind::TakeProfit { trigger_price }
            | OrderKind::StopLossLimit { trigger_price, .. }
            | OrderKind::TakeProfitLimit { trigger_price, .. } => Some(trigger_price),
            OrderKind::TrailingStop { offset } | OrderKind::TrailingStopLimit { offset, .. } => {
                Some(offset)
            }
        }
    }

    /// 전송 시 `price2` 필드 값.
    pub fn price2(&self) -> Option<Price> {
        match *self {
            OrderKind::StopLossLimit { limit_price, .. }
            | OrderKind::TakeProfitLimit { limit_price, .. } => Some(limit_price),
            OrderKind::TrailingStopLimit { limit_offset, .. } => Some(limit_offset),
            _ => None,
        }
    }
}

/// 정규화된 조건부 청산. 중첩 청산 필드가 없어 청산의 청산은 표현할 수 없습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalClose {
    pub kind: OrderKind,
}

/// 검증을 통과한 주문.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOrder {
    /// 정규화된 거래쌍 (공백 제거, 대문자)
    pub pair: String,
    pub side: Side,
    pub kind: OrderKind,
    /// 주문 수량 (양수)
    pub volume: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<Leverage>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub flags: BTreeSet<OrderFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<TimeInForce>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub validate_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<ConditionalClose>,
}

impl NormalizedOrder {
    pub fn order_type(&self) -> OrderType {
        self.kind.order_type()
    }
}

// ==================== 생명주기 ====================

/// 주문 상태 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// 생성됨 (로컬 전용)
    Created,
    /// 검증 통과 (로컬 전용)
    Validated,
    /// 거래소로 전송됨
    Submitted,
    /// 거래소가 접수함
    Accepted,
    /// 호가창에 대기 중
    Open,
    /// 부분 체결됨
    PartiallyFilled,
    /// 전량 체결됨
    Filled,
    /// 취소됨
    Canceled,
    /// 유효 기간 만료
    Expired,
    /// 거래소에서 거부됨
    Rejected,
}

impl OrderStatusType {
    /// 주문이 최종 상태인지 확인합니다.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatusType::Filled
                | OrderStatusType::Canceled
                | OrderStatusType::Expired
                | OrderStatusType::Rejected
        )
    }

    /// 주문이 여전히 활성 상태인지 확인합니다.
    pub fn is_active(&self) -> bool {
        !self.is_final()
    }

    /// 거래소에서 취소 가능한 상태인지 확인합니다.
    pub fn is_cancelable(&self) -> bool {
        matches!(
            self,
            OrderStatusType::Accepted | OrderStatusType::Open | OrderStatusType::PartiallyFilled
        )
    }

    /// 생명주기 그래프상 `next`로 이동할 수 있는지 확인합니다.
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        match self {
            Created => matches!(next, Validated),
            Validated => matches!(next, Submitted),
            Submitted => matches!(next, Accepted | Rejected),
            Accepted => matches!(next, Open | PartiallyFilled | Filled | Canceled | Expired),
            Open => matches!(next, PartiallyFilled | Filled | Canceled | Expired),
            PartiallyFilled => matches!(next, PartiallyFilled | Filled | Canceled | Expired),
            Filled | Canceled | Expired | Rejected => false,
        }
    }
}

impl fmt::Display for OrderStatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatusType::Created => "CREATED",
            OrderStatusType::Validated => "VALIDATED",
            OrderStatusType::Submitted => "SUBMITTED",
            OrderStatusType::Accepted => "ACCEPTED",
            OrderStatusType::Open => "OPEN",
            OrderStatusType::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatusType::Filled => "FILLED",
            OrderStatusType::Canceled => "CANCELED",
            OrderStatusType::Expired => "EXPIRED",
            OrderStatusType::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// 레지스트리가 보관하는 주문 엔티티.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// 내부 주문 ID
    pub id: Uuid,
    /// 거래소 주문 ID (접수 후 할당)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_order_id: Option<String>,
    /// 검증된 주문 내용
    #[serde(flatten)]
    pub request: NormalizedOrder,
    /// 현재 상태
    pub status: OrderStatusType,
    /// 거래소 접수 여부 (최초 제출 응답 기준)
    pub accepted: bool,
    /// 거래소 주문 설명
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 거부 사유
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    /// 체결된 수량
    pub filled_volume: Quantity,
    /// 평균 체결 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_price: Option<Price>,
    /// 관련 체결 ID 목록
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trades: Vec<String>,
    /// 생성 타임스탬프
    pub created_at: DateTime<Utc>,
    /// 마지막 업데이트 타임스탬프
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// 검증된 주문으로부터 `Validated` 상태의 엔티티를 생성합니다.
    pub fn from_validated(request: NormalizedOrder) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            venue_order_id: None,
            request,
            status: OrderStatusType::Validated,
            accepted: false,
            description: None,
            reject_reason: None,
            filled_volume: Decimal::ZERO,
            average_price: None,
            trades: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn client_order_id(&self) -> Option<&str> {
        self.request.client_order_id.as_deref()
    }

    pub fn user_ref(&self) -> Option<i32> {
        self.request.user_ref
    }

    pub fn pair(&self) -> &str {
        &self.request.pair
    }

    /// 남은 체결 수량을 반환합니다.
    pub fn remaining_volume(&self) -> Quantity {
        self.request.volume - self.filled_volume
    }

    /// 주문이 활성 상태인지 확인합니다.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// 주문 생명주기 이벤트. 체결에 반응하려는 외부 모듈은 이를 구독합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    /// 레지스트리에 등록됨
    Registered {
        order_id: Uuid,
        client_order_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// 상태 변경
    StatusChanged {
        order_id: Uuid,
        client_order_id: Option<String>,
        venue_order_id: Option<String>,
        from: OrderStatusType,
        to: OrderStatusType,
        timestamp: DateTime<Utc>,
    },
    /// 체결 수량 갱신
    FillUpdated {
        order_id: Uuid,
        filled_volume: Quantity,
        average_price: Option<Price>,
        timestamp: DateTime<Utc>,
    },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            OrderEvent::Registered { order_id, .. }
            | OrderEvent::StatusChanged { order_id, .. }
            | OrderEvent::FillUpdated { order_id, .. } => *order_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Registered { timestamp, .. }
            | OrderEvent::StatusChanged { timestamp, .. }
            | OrderEvent::FillUpdated { timestamp, .. } => *timestamp,
        }
    }
}
