//! 거래소 요청/응답의 논리 모델.
//!
//! 거래소별 전송 형식과 무관한 요청/응답 타입입니다. 서명기와 전송 계층이
//! 이를 실제 wire 형식으로 변환합니다.

use super::order::{NormalizedOrder, OrderStatusType};
use crate::types::{Price, Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// 요청
// =============================================================================

/// 취소 대상.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelTarget {
    /// 클라이언트 주문 ID
    ClientOrderId(String),
    /// 거래소 주문 ID
    VenueOrderId(String),
    /// 사용자 참조값 (같은 값을 가진 모든 주문)
    UserRef(i32),
}

impl fmt::Display for CancelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelTarget::ClientOrderId(id) => write!(f, "cl_ord_id={}", id),
            CancelTarget::VenueOrderId(id) => write!(f, "txid={}", id),
            CancelTarget::UserRef(r) => write!(f, "userref={}", r),
        }
    }
}

/// 주문 목록 조회 조건.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderListFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<i32>,
    /// 체결 ID 포함 여부
    #[serde(default)]
    pub include_trades: bool,
}

impl OrderListFilter {
    pub fn by_client_id(client_order_id: impl Into<String>) -> Self {
        Self {
            client_order_id: Some(client_order_id.into()),
            ..Self::default()
        }
    }

    pub fn by_user_ref(user_ref: i32) -> Self {
        Self {
            user_ref: Some(user_ref),
            ..Self::default()
        }
    }

    pub fn with_trades(mut self) -> Self {
        self.include_trades = true;
        self
    }

    /// 설정된 조건을 모두 만족하는지 확인합니다.
    pub fn matches(&self, client_order_id: Option<&str>, user_ref: Option<i32>) -> bool {
        self.client_order_id
            .as_deref()
            .map_or(true, |id| client_order_id == Some(id))
            && self.user_ref.map_or(true, |r| user_ref == Some(r))
    }
}

/// 거래소로 보내는 논리 요청.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueRequest {
    /// 신규 주문
    AddOrder(NormalizedOrder),
    /// 단일 대상 취소
    CancelOrder(CancelTarget),
    /// 전체 취소
    CancelAll,
    /// 거래소 측 데드맨 스위치 (0이면 해제)
    CancelAllAfter { timeout_secs: u64 },
    /// 거래소 주문 ID로 조회
    QueryOrders {
        venue_order_ids: Vec<String>,
        include_trades: bool,
    },
    /// 미체결 주문 목록
    OpenOrders(OrderListFilter),
    /// 종료된 주문 목록 (`start..end`는 종료 시각 기준, 없으면 제한 없음)
    ClosedOrders {
        filter: OrderListFilter,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

impl VenueRequest {
    /// 로그 및 시도 기록용 요청 이름.
    pub fn kind(&self) -> &'static str {
        match self {
            VenueRequest::AddOrder(_) => "add_order",
            VenueRequest::CancelOrder(_) => "cancel_order",
            VenueRequest::CancelAll => "cancel_all",
            VenueRequest::CancelAllAfter { .. } => "cancel_all_after",
            VenueRequest::QueryOrders { .. } => "query_orders",
            VenueRequest::OpenOrders(_) => "open_orders",
            VenueRequest::ClosedOrders { .. } => "closed_orders",
        }
    }

    /// 재전송해도 중복 실행되지 않는 요청인지 확인합니다.
    ///
    /// 클라이언트 주문 ID가 없는 신규 주문과 단일 취소는 멱등이 아닙니다.
    pub fn is_idempotent(&self) -> bool {
        match self {
            VenueRequest::AddOrder(order) => {
                order.client_order_id.is_some() || order.validate_only
            }
            VenueRequest::CancelOrder(_) => false,
            VenueRequest::CancelAll
            | VenueRequest::CancelAllAfter { .. }
            | VenueRequest::QueryOrders { .. }
            | VenueRequest::OpenOrders(_)
            | VenueRequest::ClosedOrders { .. } => true,
        }
    }
}

// =============================================================================
// 응답
// =============================================================================

/// 신규 주문 응답.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    /// 접수 여부
    pub accepted: bool,
    /// 거래소 주문 ID (드라이런이면 없음)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_order_id: Option<String>,
    /// 거래소가 돌려준 주문 설명
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 에러 메시지
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 거래소가 보고한 주문 상태.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueOrderUpdate {
    pub venue_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<i32>,
    pub status: OrderStatusType,
    pub filled_volume: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_price: Option<Price>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trades: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// 거래소 응답.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueResponse {
    /// 신규 주문 결과
    Order(OrderAck),
    /// 취소된 주문 수
    Canceled { count: usize },
    /// 거래소 측 데드맨 스위치 상태
    CancelAllAfter {
        current_time: Option<DateTime<Utc>>,
        trigger_time: Option<DateTime<Utc>>,
    },
    /// 주문 조회 결과
    Orders { orders: Vec<VenueOrderUpdate> },
}

impl VenueResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            VenueResponse::Order(_) => "order",
            VenueResponse::Canceled { .. } => "canceled",
            VenueResponse::CancelAllAfter { .. } => "cancel_all_after",
            VenueResponse::Orders { .. } => "orders",
        }
    }
}
