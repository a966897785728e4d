//! 주문 실행을 위한 도메인 모델.

mod instrument;
mod order;
mod venue;

pub use instrument::*;
pub use order::*;
pub use venue::*;
