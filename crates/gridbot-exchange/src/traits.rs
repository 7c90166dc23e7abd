//! 거래소 trait 정의.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gridbot_core::{Amount, LimitOrderRequest, Price, Quantity, Side, Symbol, TopOfBook};

use crate::ExchangeError;

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 거래소가 보고한 한 건의 체결.
#[derive(Debug, Clone)]
pub struct ExchangeFill {
    /// 거래소 체결 ID
    pub fill_id: String,
    /// 거래소 주문 ID
    pub order_id: String,
    /// 체결 방향
    pub side: Side,
    /// 체결 가격
    pub price: Price,
    /// 체결 수량
    pub qty: Quantity,
    /// 수수료
    pub fee: Amount,
    /// 수수료 통화
    pub fee_currency: String,
    /// 체결 시각
    pub filled_at: DateTime<Utc>,
}

/// 거래 이력 페이지의 한 행.
#[derive(Debug, Clone)]
pub struct ExchangeTrade {
    /// 거래소 체결 ID
    pub trade_id: String,
    /// 거래소 주문 ID
    pub order_id: String,
    /// 방향
    pub side: Side,
    /// 체결 가격
    pub price: Price,
    /// 체결 수량
    pub size: Quantity,
    /// 체결 금액 (호가 통화)
    pub funds: Amount,
    /// 수수료
    pub fee: Amount,
    /// 체결 시각
    pub traded_at: DateTime<Utc>,
}

/// 통합 거래소 인터페이스.
///
/// 주문 배치와 취소만 거래소 상태를 변경합니다. 나머지는 조회이며
/// 안전하게 재실행할 수 있습니다.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// 거래소 이름 반환.
    fn name(&self) -> &str;

    /// 심볼들의 최우선 호가를 조회합니다.
    ///
    /// 조회에 실패한 심볼은 결과에서 빠질 수 있습니다. 호출자는
    /// 누락된 심볼을 건너뛰고 나머지를 계속 처리해야 합니다.
    async fn top_of_book(&self, symbols: &[Symbol]) -> ExchangeResult<Vec<TopOfBook>>;

    /// 지정가 주문을 배치합니다.
    ///
    /// # Returns
    /// 거래소 주문 ID.
    ///
    /// # Errors
    /// - `ExchangeError::OrderRejected` / `InsufficientBalance`: 거부
    ///   (호출자는 다음 틱에 재시도)
    async fn place_limit_order(&self, request: &LimitOrderRequest) -> ExchangeResult<String>;

    /// 주문의 체결 내역을 조회합니다.
    async fn order_fills(&self, order_id: &str) -> ExchangeResult<Vec<ExchangeFill>>;

    /// 주문을 취소합니다.
    async fn cancel_order(&self, order_id: &str) -> ExchangeResult<()>;

    /// 기간 내 거래 이력 한 페이지를 조회합니다.
    async fn trade_history(
        &self,
        symbol: &Symbol,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ExchangeResult<Vec<ExchangeTrade>>;
}
