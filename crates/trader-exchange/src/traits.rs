//! 서명기와 전송 계층 trait 정의.
//!
//! 실행기는 시도마다 `RequestSigner::sign`으로 새 nonce가 포함된 요청을 만들고
//! `Transport::send`로 전송합니다. 두 단계 모두 교체 가능한 협력자입니다.

use async_trait::async_trait;
use std::fmt;
use trader_core::{VenueRequest, VenueResponse};

use crate::ExchangeError;

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 전송 준비가 끝난 서명된 요청.
#[derive(Clone, PartialEq)]
pub struct SignedRequest {
    /// 원래 논리 요청 (응답 디코딩 및 시뮬레이션용)
    pub request: VenueRequest,
    /// 엔드포인트 경로 (예: `/0/private/AddOrder`)
    pub path: String,
    /// 인증 헤더
    pub headers: Vec<(String, String)>,
    /// form-urlencoded 본문
    pub body: String,
    /// 이 요청에 사용된 nonce
    pub nonce: u64,
}

impl SignedRequest {
    /// 헤더 값을 조회합니다.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for SignedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedRequest")
            .field("kind", &self.request.kind())
            .field("path", &self.path)
            .field("nonce", &self.nonce)
            .field("headers", &self.headers.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

/// 논리 요청을 서명된 요청으로 변환합니다.
#[async_trait]
pub trait RequestSigner: Send + Sync {
    /// 새 nonce로 요청에 서명합니다.
    async fn sign(&self, request: &VenueRequest) -> ExchangeResult<SignedRequest>;
}

/// 서명된 요청을 실제로 전송하고 응답을 디코딩합니다.
#[async_trait]
pub trait Transport: Send + Sync {
    /// 전송 계층 이름 (로그용).
    fn name(&self) -> &str;

    /// 요청을 전송합니다.
    async fn send(&self, request: &SignedRequest) -> ExchangeResult<VenueResponse>;
}
