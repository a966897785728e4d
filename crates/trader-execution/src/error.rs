//! 실행 계층 에러 타입.

use thiserror::Error;
use trader_core::{OrderStatusType, ValidationError};
use trader_exchange::{ExchangeError, ExecutionError};
use uuid::Uuid;

/// 주문 레지스트리 에러.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// 같은 클라이언트 주문 ID를 가진 활성 주문이 이미 있음
    #[error("Duplicate client order id: {0}")]
    DuplicateClientId(String),

    /// 생명주기 그래프에 없는 전이
    #[error("Invalid state transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: Uuid,
        from: OrderStatusType,
        to: OrderStatusType,
    },

    /// 조회 키에 해당하는 주문이 없음
    #[error("Order not found: {0}")]
    NotFound(String),
}

/// 실행 파사드 에러.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FacadeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// 등록된 주문의 제출이 실패함 (레지스트리에서 상태 확인 가능)
    #[error("Order {order_id} failed: {source}")]
    OrderFailed {
        order_id: Uuid,
        #[source]
        source: ExecutionError,
    },

    /// 커넥터 구성 실패
    #[error("Venue setup failed: {0}")]
    Setup(#[from] ExchangeError),
}

impl FacadeError {
    /// 원인이 된 실행 에러.
    pub fn execution_error(&self) -> Option<&ExecutionError> {
        match self {
            FacadeError::Execution(e) | FacadeError::OrderFailed { source: e, .. } => Some(e),
            _ => None,
        }
    }

    /// 검증 실패라면 위반 필드 이름.
    pub fn invalid_field(&self) -> Option<&str> {
        match self {
            FacadeError::Validation(e) => Some(&e.field),
            _ => None,
        }
    }
}

/// 실행 결과 타입.
pub type FacadeResult<T> = Result<T, FacadeError>;
