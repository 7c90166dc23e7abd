//! 스텝 주문 리컨실러.
//!
//! 스텝별 사이클 `AwaitingBuy → BuyOrderPlaced → AwaitingSell →
//! SellOrderPlaced → AwaitingBuy`를 거래소에 대해 전진시킵니다.
//! 레벨은 무기한 재사용됩니다.
//!
//! 주문 거부는 치명적이지 않습니다. 스텝은 현재 상태를 유지하고 다음
//! 틱에 재시도합니다. 체결은 거래소 체결 ID 기준으로 최대 한 번만
//! 반영됩니다.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gridbot_core::{
    Amount, Grid, GridError, GridResult, LimitOrderRequest, OrderFill, Price, Side, Step,
    StepStatus, Symbol,
};
use gridbot_exchange::{Exchange, ExchangeError, ExchangeFill};
use gridbot_notification::Notifier;

/// 스텝 주문 리컨실러.
///
/// 하나의 틱 안에서 한 그리드의 스텝들을 순서대로 처리합니다. 같은
/// 그리드에 대한 틱 중첩 방지는 호출자의 책임입니다.
pub struct StepReconciler {
    exchange: Arc<dyn Exchange>,
    notifier: Arc<dyn Notifier>,
}

impl StepReconciler {
    /// 새 리컨실러를 생성합니다.
    pub fn new(exchange: Arc<dyn Exchange>, notifier: Arc<dyn Notifier>) -> Self {
        Self { exchange, notifier }
    }

    /// 그리드의 활성 스텝들을 한 차례 전진시킵니다.
    ///
    /// 미체결 주문이 있는 스텝은 체결을 관찰하고, 없는 스텝은 주문을
    /// 배치합니다. 한 스텝은 틱당 한 단계만 전진합니다.
    ///
    /// # Errors
    /// - `GridError::ExchangeRejection`: 재시도 불가능한 거래소 에러
    pub async fn work_steps(&self, grid: &mut Grid) -> GridResult<()> {
        for idx in 0..grid.steps.len() {
            if !grid.steps[idx].is_active() || grid.steps[idx].qty <= Decimal::ZERO {
                continue;
            }
            if grid.steps[idx].has_open_order() {
                self.observe_step(grid, idx).await?;
            } else {
                self.place_step(grid, idx).await?;
            }
        }
        Ok(())
    }

    /// 종료된 그리드의 모든 미체결 스텝 주문을 취소하고 동결합니다.
    ///
    /// 이미 사라진 주문(`OrderNotFound`)은 무시합니다.
    pub async fn freeze(&self, grid: &mut Grid) -> GridResult<()> {
        for step in grid.steps.iter_mut() {
            self.cancel_step_order(step).await?;
        }
        info!(grid_id = %grid.id, status = %grid.status, "grid frozen");
        Ok(())
    }

    /// 스텝의 미체결 주문을 취소하고 참조를 해제합니다.
    ///
    /// 사다리 갱신으로 pegged 스텝이 옮겨지거나 제거될 때도 사용됩니다.
    pub async fn cancel_step_order(&self, step: &mut Step) -> GridResult<()> {
        let Some(order_id) = step.exchange_order_id.clone() else {
            return Ok(());
        };
        match self.exchange.cancel_order(&order_id).await {
            Ok(()) => {
                debug!(step_id = %step.id, order_id, "open order cancelled");
            }
            Err(ExchangeError::OrderNotFound(_)) => {
                debug!(step_id = %step.id, order_id, "open order already gone");
            }
            Err(e) if e.is_retryable() => {
                warn!(step_id = %step.id, order_id, error = %e, "cancel failed, will retry");
                return Ok(());
            }
            Err(e) => return Err(map_exchange_error(e)),
        }
        step.release_open_order();
        Ok(())
    }

    /// 대기 중인 스텝에 지정가 주문을 배치합니다.
    async fn place_step(&self, grid: &mut Grid, idx: usize) -> GridResult<()> {
        let (side, price) = match grid.steps[idx].status {
            StepStatus::AwaitingBuy => (Side::Buy, grid.steps[idx].buy_price),
            StepStatus::AwaitingSell => (Side::Sell, grid.steps[idx].sell_price),
            // *Placed 상태인데 주문 ID가 없으면 배치 전 상태로 되돌려
            // 다음 틱에 재배치합니다.
            _ => {
                let grid_id = grid.id;
                let step = &mut grid.steps[idx];
                warn!(
                    grid_id = %grid_id,
                    step_id = %step.id,
                    status = step.status.as_str(),
                    "step has placed status without order id, resetting"
                );
                step.release_open_order();
                return Ok(());
            }
        };
        let step = &grid.steps[idx];

        let request = LimitOrderRequest::new(grid.config.symbol.clone(), side, price, step.qty)
            .with_client_order_id(step.id.to_string());

        match self.exchange.place_limit_order(&request).await {
            Ok(order_id) => {
                let step = &mut grid.steps[idx];
                step.exchange_order_id = Some(order_id.clone());
                step.status = match side {
                    Side::Buy => StepStatus::BuyOrderPlaced,
                    Side::Sell => StepStatus::SellOrderPlaced,
                };
                debug!(
                    grid_id = %grid.id,
                    step_id = %step.id,
                    side = %side,
                    %price,
                    qty = %step.qty,
                    order_id,
                    "limit order placed"
                );
                Ok(())
            }
            Err(e) if e.is_rejection() => {
                // 스텝은 Awaiting* 상태 그대로, 다음 틱에 재시도
                warn!(
                    grid_id = %grid.id,
                    step_id = %step.id,
                    side = %side,
                    error = %e,
                    "order rejected, deferring to next tick"
                );
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    grid_id = %grid.id,
                    step_id = %step.id,
                    error = %e,
                    "order placement failed transiently"
                );
                Ok(())
            }
            Err(e) => Err(map_exchange_error(e)),
        }
    }

    /// 스텝의 미체결 주문에 보고된 체결을 반영합니다.
    ///
    /// 새 체결이 하나라도 관찰되면 주문이 완결된 것으로 보고 주문
    /// 참조를 해제하며 상태를 전진시킵니다. 매도가 사이클을 닫을 때만
    /// `(매도 명목 − 매수 명목 − 수수료)`를 실현 수익에 더합니다.
    async fn observe_step(&self, grid: &mut Grid, idx: usize) -> GridResult<()> {
        let Some(order_id) = grid.steps[idx].exchange_order_id.clone() else {
            return Ok(());
        };

        let fills = match self.exchange.order_fills(&order_id).await {
            Ok(fills) => fills,
            Err(e) if e.is_retryable() => {
                warn!(order_id, error = %e, "fill query failed transiently");
                return Ok(());
            }
            Err(e) => return Err(map_exchange_error(e)),
        };
        if fills.is_empty() {
            return Ok(());
        }

        let symbol = grid.config.symbol.clone();
        let mut quote_delta = Decimal::ZERO;
        let mut base_delta = Decimal::ZERO;
        let mut filled_side: Option<Side> = None;

        let step = &mut grid.steps[idx];
        for fill in fills {
            let record = to_order_fill(step.id, &fill);
            if !step.record_fill(record) {
                continue;
            }
            let fee_quote = fee_in_quote(&symbol, &fill.fee_currency, fill.fee, fill.price);
            match fill.side {
                Side::Buy => {
                    quote_delta -= fill.price * fill.qty + fee_quote;
                    base_delta += fill.qty;
                }
                Side::Sell => {
                    quote_delta += fill.price * fill.qty - fee_quote;
                    base_delta -= fill.qty;
                }
            }
            filled_side = Some(fill.side);
            debug!(
                step_id = %step.id,
                order_id,
                side = %fill.side,
                price = %fill.price,
                qty = %fill.qty,
                "fill recorded"
            );
        }

        let Some(side) = filled_side else {
            // 전부 재관찰된 체결
            return Ok(());
        };

        step.exchange_order_id = None;
        step.status = match side {
            Side::Buy => StepStatus::AwaitingSell,
            Side::Sell => StepStatus::AwaitingBuy,
        };
        let profit = match side {
            Side::Buy => Decimal::ZERO,
            Side::Sell => cycle_profit(step, &symbol),
        };
        let step_id = step.id;

        grid.quote_balance += quote_delta;
        grid.base_balance += base_delta;
        if side == Side::Sell && !profit.is_zero() {
            grid.realized_profit += profit;
            info!(
                grid_id = %grid.id,
                step_id = %step_id,
                %profit,
                total = %grid.realized_profit,
                "step cycle closed"
            );
            self.notifier
                .notify_info(
                    "Step cycle closed",
                    &format!(
                        "{} grid {}: profit {profit}, total {}",
                        symbol, grid.id, grid.realized_profit
                    ),
                )
                .await;
        }
        grid.touch();
        Ok(())
    }
}

/// 가장 최근에 닫힌 매수-매도 사이클의 수익을 계산합니다.
///
/// 체결 이력을 뒤에서 앞으로 훑어, 마지막 매도 묶음과 그 직전 매수
/// 묶음을 짝짓습니다. 더 이전의 매도를 만나면 사이클 경계이므로
/// 중단합니다. 대응하는 매수가 없으면(종료 스텝의 단독 매도) 0입니다.
fn cycle_profit(step: &Step, symbol: &Symbol) -> Amount {
    let mut sell_total = Decimal::ZERO;
    let mut buy_total = Decimal::ZERO;
    let mut seen_buy = false;

    for fill in step.fills.iter().rev() {
        let fee_quote = fee_in_quote(symbol, &fill.fee_currency, fill.fee, fill.price);
        match fill.side {
            Side::Sell if !seen_buy => sell_total += fill.notional() - fee_quote,
            Side::Sell => break,
            Side::Buy => {
                seen_buy = true;
                buy_total += fill.notional() + fee_quote;
            }
        }
    }

    if !seen_buy {
        return Decimal::ZERO;
    }
    sell_total - buy_total
}

/// 수수료를 호가 통화 금액으로 환산합니다.
///
/// 기준 통화로 부과된 수수료는 체결 가격으로 환산하고, 그 외 통화는
/// 환율을 알 수 없으므로 무시합니다 (수익 과대 보고 방지 차원에서는
/// 보수적이지 않지만, 교차 통화 수수료는 이 거래소에서 발생하지
/// 않습니다).
fn fee_in_quote(symbol: &Symbol, fee_currency: &str, fee: Amount, price: Price) -> Amount {
    if fee_currency == symbol.quote {
        fee
    } else if fee_currency == symbol.base {
        fee * price
    } else {
        warn!(fee_currency, symbol = %symbol, "fee in unknown currency ignored");
        Decimal::ZERO
    }
}

fn to_order_fill(step_id: Uuid, fill: &ExchangeFill) -> OrderFill {
    OrderFill {
        id: Uuid::new_v4(),
        step_id,
        exchange_order_id: fill.order_id.clone(),
        exchange_fill_id: fill.fill_id.clone(),
        side: fill.side,
        price: fill.price,
        qty: fill.qty,
        fee: fill.fee,
        fee_currency: fill.fee_currency.clone(),
        filled_at: fill.filled_at,
    }
}

fn map_exchange_error(e: ExchangeError) -> GridError {
    GridError::ExchangeRejection(e.to_string())
}
