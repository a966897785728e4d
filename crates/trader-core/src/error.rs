//! 트레이딩 시스템의 공통 에러 타입.
//!
//! 거래소/실행 계층의 에러는 각 크레이트가 정의하고, 여기서는 모든 계층이
//! 공유하는 검증 에러와 실패 분류만 정의합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 거래소 호출 실패의 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// 일시적 장애 (네트워크, 타임아웃, 5xx, 요청 한도) - 재시도 대상
    Transient,
    /// 거래소가 주문 자체를 거부 - 재시도하지 않음
    Rejected,
    /// 인증/서명 실패 - 재시도하지 않고 추가 요청을 중단해야 함
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Rejected => write!(f, "rejected"),
            ErrorClass::Fatal => write!(f, "fatal"),
        }
    }
}

/// 주문 검증 실패. 첫 번째로 위반된 필드와 사유를 담습니다.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("잘못된 주문 필드 '{field}': {reason}")]
pub struct ValidationError {
    /// 위반 필드 이름 (예: `price2`, `close.price`)
    pub field: String,
    /// 사유
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 검증 결과 타입.
pub type ValidationResult<T> = Result<T, ValidationError>;
