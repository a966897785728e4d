//! 거래소 연결 및 요청 실행.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - `RequestSigner` / `Transport` trait: 교체 가능한 서명 및 전송 계층
//! - Kraken 커넥터 (REST 서명, form 인코딩, 응답 디코딩)
//! - 시뮬레이션 거래소 (테스트 및 모의 실행용)
//! - 에러 분류와 지수 백오프 재시도 실행기

pub mod connector;
pub mod error;
pub mod retry;
pub mod simulated;
pub mod traits;

pub use connector::{KrakenCredentials, KrakenHttpTransport, KrakenSigner, NonceGenerator};
pub use error::*;
pub use retry::{
    AttemptOutcome, AttemptRecord, ExecutionError, ExecutionReport, RetryPolicy, RetryingExecutor,
};
pub use simulated::{PassthroughSigner, RecordedCall, SimulatedConfig, SimulatedVenue};
pub use traits::*;
