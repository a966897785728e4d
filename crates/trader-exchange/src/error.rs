//! 거래소 에러 타입.

use thiserror::Error;
use trader_core::ErrorClass;

/// 거래소 호출의 원시 실패 (전송 계층 또는 거래소 응답).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 거래소 서비스 불가 (5xx, 점검, 과부하)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// 응답 파싱 에러
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 인증/권한 에러
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 서명 불일치
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// nonce 거부
    #[error("Invalid nonce: {0}")]
    InvalidNonce(String),

    /// 요청 서명 실패 (잘못된 시크릿 등)
    #[error("Signing failed: {0}")]
    SigningError(String),

    /// 주문 거부됨
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// 잔고 부족
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// 알 수 없는 거래쌍
    #[error("Unknown pair: {0}")]
    UnknownPair(String),

    /// 주문을 찾을 수 없음
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// 분류되지 않은 거래소 에러
    #[error("API error {code}: {message}")]
    ApiError { code: String, message: String },
}

impl ExchangeError {
    /// 실패를 재시도 분류로 매핑합니다.
    ///
    /// 분류되지 않은 거래소 에러는 재시도하지 않도록 `Rejected`로 취급합니다.
    pub fn classify(&self) -> ErrorClass {
        match self {
            ExchangeError::NetworkError(_)
            | ExchangeError::Timeout(_)
            | ExchangeError::ServiceUnavailable(_)
            | ExchangeError::RateLimited(_)
            | ExchangeError::ParseError(_) => ErrorClass::Transient,

            ExchangeError::Unauthorized(_)
            | ExchangeError::InvalidSignature(_)
            | ExchangeError::InvalidNonce(_)
            | ExchangeError::SigningError(_) => ErrorClass::Fatal,

            ExchangeError::OrderRejected(_)
            | ExchangeError::InsufficientBalance(_)
            | ExchangeError::UnknownPair(_)
            | ExchangeError::OrderNotFound(_)
            | ExchangeError::ApiError { .. } => ErrorClass::Rejected,
        }
    }

    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        self.classify() == ErrorClass::Transient
    }

    /// 자격증명을 고칠 때까지 요청을 멈춰야 하는 치명적 에러인지 확인.
    pub fn is_fatal(&self) -> bool {
        self.classify() == ErrorClass::Fatal
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_decode() {
            ExchangeError::ParseError(err.to_string())
        } else if err.status().is_some_and(|s| s.is_server_error()) {
            ExchangeError::ServiceUnavailable(err.to_string())
        } else {
            ExchangeError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}
