//! 시뮬레이션 거래소 구현.
//!
//! 결정적 테스트를 위한 인메모리 거래소입니다. 호가를 직접 설정하고,
//! 주문 체결을 스크립트로 밀어 넣고, 조회 실패를 주입할 수 있습니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use gridbot_core::{LimitOrderRequest, Price, Symbol, TopOfBook};

use crate::traits::{Exchange, ExchangeFill, ExchangeResult, ExchangeTrade};
use crate::ExchangeError;

/// 배치된 주문의 기록.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    /// 부여된 거래소 주문 ID
    pub order_id: String,
    /// 원본 요청
    pub request: LimitOrderRequest,
}

#[derive(Default)]
struct Inner {
    quotes: HashMap<Symbol, TopOfBook>,
    failing_symbols: HashSet<Symbol>,
    next_order_seq: u64,
    placed: Vec<PlacedOrder>,
    scripted_fills: HashMap<String, Vec<ExchangeFill>>,
    cancelled: Vec<String>,
    reject_next: Option<ExchangeError>,
    trades: Vec<ExchangeTrade>,
    trade_symbol: Option<Symbol>,
    history_fetches: u64,
}

/// 시뮬레이션 거래소.
#[derive(Default)]
pub struct SimulatedExchange {
    inner: Mutex<Inner>,
    /// 편의 체결 생성에 쓰는 수수료율
    fee_rate: Decimal,
}

impl SimulatedExchange {
    /// 새 시뮬레이션 거래소를 생성합니다.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            fee_rate: dec!(0.001),
        }
    }

    /// 심볼의 호가를 설정합니다.
    pub async fn set_quote(&self, symbol: Symbol, bid: Price, ask: Price, last: Price) {
        let mut inner = self.inner.lock().await;
        inner.quotes.insert(
            symbol.clone(),
            TopOfBook {
                symbol,
                bid,
                ask,
                last,
                fetched_at: Utc::now(),
            },
        );
    }

    /// 심볼이 포함된 호가 조회를 실패하도록 설정합니다.
    pub async fn fail_quotes_for(&self, symbol: Symbol) {
        self.inner.lock().await.failing_symbols.insert(symbol);
    }

    /// 호가 조회 실패 설정을 해제합니다.
    pub async fn clear_quote_failures(&self) {
        self.inner.lock().await.failing_symbols.clear();
    }

    /// 다음 주문 배치를 거부하도록 설정합니다.
    pub async fn reject_next_order(&self, error: ExchangeError) {
        self.inner.lock().await.reject_next = Some(error);
    }

    /// 주문에 체결을 스크립트로 추가합니다.
    pub async fn script_fill(&self, fill: ExchangeFill) {
        let mut inner = self.inner.lock().await;
        inner
            .scripted_fills
            .entry(fill.order_id.clone())
            .or_default()
            .push(fill);
    }

    /// 배치된 주문을 전량 체결 처리합니다 (지정가 기준).
    ///
    /// # Returns
    /// 생성된 체결 ID. 주문이 없으면 `None`.
    pub async fn fill_order(&self, order_id: &str) -> Option<String> {
        let mut inner = self.inner.lock().await;
        let placed = inner
            .placed
            .iter()
            .find(|p| p.order_id == order_id)?
            .clone();

        let fill_id = format!("fill-{order_id}-{}", inner.next_order_seq);
        inner.next_order_seq += 1;

        let notional = placed.request.price * placed.request.quantity;
        let fill = ExchangeFill {
            fill_id: fill_id.clone(),
            order_id: order_id.to_string(),
            side: placed.request.side,
            price: placed.request.price,
            qty: placed.request.quantity,
            fee: notional * self.fee_rate,
            fee_currency: placed.request.symbol.quote.clone(),
            filled_at: Utc::now(),
        };
        inner
            .scripted_fills
            .entry(order_id.to_string())
            .or_default()
            .push(fill);
        Some(fill_id)
    }

    /// 배치된 주문 목록을 반환합니다.
    pub async fn placed_orders(&self) -> Vec<PlacedOrder> {
        self.inner.lock().await.placed.clone()
    }

    /// 취소된 주문 ID 목록을 반환합니다.
    pub async fn cancelled_orders(&self) -> Vec<String> {
        self.inner.lock().await.cancelled.clone()
    }

    /// 거래 이력 데이터를 심습니다.
    pub async fn seed_trades(&self, symbol: Symbol, trades: Vec<ExchangeTrade>) {
        let mut inner = self.inner.lock().await;
        inner.trade_symbol = Some(symbol);
        inner.trades = trades;
    }

    /// 거래 이력 페이지 조회 횟수를 반환합니다.
    pub async fn history_fetch_count(&self) -> u64 {
        self.inner.lock().await.history_fetches
    }
}

#[async_trait]
impl Exchange for SimulatedExchange {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn top_of_book(&self, symbols: &[Symbol]) -> ExchangeResult<Vec<TopOfBook>> {
        let inner = self.inner.lock().await;
        if symbols.iter().any(|s| inner.failing_symbols.contains(s)) {
            return Err(ExchangeError::Network("simulated quote failure".to_string()));
        }
        Ok(symbols
            .iter()
            .filter_map(|s| inner.quotes.get(s).cloned())
            .collect())
    }

    async fn place_limit_order(&self, request: &LimitOrderRequest) -> ExchangeResult<String> {
        let mut inner = self.inner.lock().await;
        if let Some(error) = inner.reject_next.take() {
            return Err(error);
        }

        inner.next_order_seq += 1;
        let order_id = format!("sim-{}", inner.next_order_seq);
        inner.placed.push(PlacedOrder {
            order_id: order_id.clone(),
            request: request.clone(),
        });
        Ok(order_id)
    }

    async fn order_fills(&self, order_id: &str) -> ExchangeResult<Vec<ExchangeFill>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .scripted_fills
            .get(order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn cancel_order(&self, order_id: &str) -> ExchangeResult<()> {
        let mut inner = self.inner.lock().await;
        let known = inner.placed.iter().any(|p| p.order_id == order_id);
        if !known {
            return Err(ExchangeError::OrderNotFound(order_id.to_string()));
        }
        inner.cancelled.push(order_id.to_string());
        Ok(())
    }

    async fn trade_history(
        &self,
        symbol: &Symbol,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ExchangeResult<Vec<ExchangeTrade>> {
        let mut inner = self.inner.lock().await;
        inner.history_fetches += 1;

        if inner.trade_symbol.as_ref() != Some(symbol) {
            return Ok(Vec::new());
        }
        Ok(inner
            .trades
            .iter()
            .filter(|t| t.traded_at >= from && t.traded_at < to)
            .cloned()
            .collect())
    }
}
