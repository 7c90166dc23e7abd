//! # Gridbot Exchange
//!
//! 거래소 협력자 추상화와 구현을 제공합니다:
//! - `Exchange` trait: 호가 조회, 지정가 주문, 체결 조회, 주문 취소,
//!   거래 이력 페이지 조회
//! - KuCoin 현물 REST 커넥터
//! - 결정적 테스트를 위한 시뮬레이션 거래소

pub mod connector;
pub mod error;
pub mod simulated;
pub mod traits;

pub use connector::KucoinClient;
pub use error::ExchangeError;
pub use simulated::SimulatedExchange;
pub use traits::{Exchange, ExchangeFill, ExchangeResult, ExchangeTrade};
