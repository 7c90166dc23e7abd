//! 주문 관련 공통 타입.

use serde::{Deserialize, Serialize};

use crate::types::{Price, Quantity, Symbol};

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// 문자열로 변환.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// 지정가 주문 요청.
///
/// 이 시스템의 거래소 상태 변경 작업은 지정가 주문 하나뿐입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitOrderRequest {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 주문 방향
    pub side: Side,
    /// 지정가
    pub price: Price,
    /// 거래 수량
    pub quantity: Quantity,
    /// 클라이언트 주문 ID (멱등성 식별용)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl LimitOrderRequest {
    /// 새 지정가 주문 요청을 생성합니다.
    pub fn new(symbol: Symbol, side: Side, price: Price, quantity: Quantity) -> Self {
        Self {
            symbol,
            side,
            price,
            quantity,
            client_order_id: None,
        }
    }

    /// 클라이언트 주문 ID를 설정합니다.
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}
