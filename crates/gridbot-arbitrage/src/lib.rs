//! # Gridbot Arbitrage
//!
//! 기준 통화 → 토큰 → 브리지 통화 → 기준 통화로 도는 삼각 차익거래
//! 사이클을 최우선 호가로 평가합니다. 토큰별 평가는 독립적이며,
//! 임계값을 넘는 수익은 fire-and-forget 알림으로 발송됩니다.

pub mod scanner;

pub use scanner::{ArbitrageScanner, CycleDirection, CycleResult, TokenReport};
