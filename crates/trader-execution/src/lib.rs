//! 주문 실행.
//!
//! 이 crate는 다음을 제공합니다:
//! - 주문 요청을 정규화하는 순수 검증기
//! - 주문 상태의 유일한 정본인 레지스트리
//! - 하트비트가 끊기면 전체 취소하는 데드맨 스위치
//! - 위 구성 요소와 재시도 실행기를 묶은 실행 파사드
//!
//! # 예제
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trader_exchange::{RetryPolicy, SimulatedVenue};
//! use trader_execution::{ExecutionFacade, QueryRequest};
//!
//! let venue = Arc::new(SimulatedVenue::new());
//! let facade = ExecutionFacade::simulated(venue, RetryPolicy::from_config(&Default::default()));
//!
//! let order = facade.limit_buy("XBTUSD", "0.001", "35000").await?;
//! let snapshots = facade.query(QueryRequest::by_ids([order.id.to_string()])).await?;
//! ```

pub mod dead_mans_switch;
pub mod error;
pub mod facade;
pub mod registry;
pub mod validator;

// 주요 타입 재내보내기
pub use dead_mans_switch::{CancelAllHandler, DeadMansSwitch, SwitchFailure, SwitchState};
pub use error::{FacadeError, FacadeResult, RegistryError};
pub use facade::{ArmReceipt, ExecutionFacade, QueryRequest};
pub use registry::{OrderLookup, OrderRegistry, QueryFilter};
pub use validator::{validate, ValidationContext, MAX_CLIENT_ORDER_ID_LEN};
