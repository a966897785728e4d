//! # Trader Core
//!
//! 주문 실행 코어의 도메인 모델 및 공통 타입을 제공합니다:
//! - 주문 요청, 정규화된 주문, 생명주기 상태 및 이벤트
//! - 거래소 요청/응답의 논리 모델
//! - 거래쌍 메타데이터 (최대 레버리지, 기준 가격)
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
