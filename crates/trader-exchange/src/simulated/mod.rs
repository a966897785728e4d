//! 모의 세션과 테스트를 위한 시뮬레이션 거래소.
//!
//! 이 모듈은 다음 기능을 제공합니다:
//! - 주문 접수, 취소, 조회를 메모리에서 처리하는 `SimulatedVenue` (`Transport` 구현)
//! - 스크립트된 실패 주입과 호출 기록
//! - 서명 없이 요청을 전달하는 `PassthroughSigner`
//!
//! # 예제
//!
//! ```ignore
//! use trader_exchange::simulated::{PassthroughSigner, SimulatedVenue};
//!
//! let venue = Arc::new(SimulatedVenue::new());
//! venue.fail_next(ExchangeError::Timeout("read timeout".into()));
//!
//! let executor = RetryingExecutor::new(Arc::new(PassthroughSigner), venue.clone(), policy);
//! ```

mod venue;

pub use venue::{PassthroughSigner, RecordedCall, SimulatedConfig, SimulatedVenue};
