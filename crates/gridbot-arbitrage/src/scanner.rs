//! 삼각 차익거래 스캐너.
//!
//! 각 토큰에 대해 세 마켓(메인/기준, 메인/브리지, 브리지/기준)의
//! 최우선 호가를 한 번에 받아, 고정 명목 금액으로 정방향/역방향
//! 사이클을 시뮬레이션합니다. 매수 레그는 매도 호가(ask)를 지불하고
//! 매도 레그는 매수 호가(bid)를 받습니다.
//!
//! 레그마다 결과 금액을 내림합니다. 1 단위를 넘으면 거래소 로트
//! 절사를 흉내 내 더 거친 자릿수로 내림합니다.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use gridbot_core::{Amount, ArbitrageConfig, DecimalFloorExt, Symbol, TopOfBook};
use gridbot_exchange::Exchange;
use gridbot_notification::Notifier;

/// 1 단위 이하 금액의 내림 자릿수.
const FINE_PRECISION_DP: u32 = 6;
/// 1 단위 초과 금액의 내림 자릿수.
const COARSE_PRECISION_DP: u32 = 2;

/// 레그 결과 금액을 내림합니다.
fn floor_amount(amount: Decimal) -> Decimal {
    if amount > Decimal::ONE {
        amount.floor_dp(COARSE_PRECISION_DP)
    } else {
        amount.floor_dp(FINE_PRECISION_DP)
    }
}

/// 사이클 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDirection {
    /// 기준 → 메인 → 브리지 → 기준
    Forward,
    /// 기준 → 브리지 → 메인 → 기준
    Reverse,
}

impl CycleDirection {
    /// 경로 표기를 반환합니다.
    pub fn route(&self, token: &str, config: &ArbitrageConfig) -> String {
        let base = &config.base_currency;
        let bridge = &config.bridge_currency;
        match self {
            CycleDirection::Forward => format!("{base} → {token} → {bridge} → {base}"),
            CycleDirection::Reverse => format!("{base} → {bridge} → {token} → {base}"),
        }
    }
}

/// 한 방향 사이클의 평가 결과.
#[derive(Debug, Clone)]
pub struct CycleResult {
    /// 사이클 방향
    pub direction: CycleDirection,
    /// 레그별 체결 가격
    pub leg_prices: [Decimal; 3],
    /// 레그별 결과 금액 (내림 적용 후)
    pub leg_amounts: [Decimal; 3],
    /// 잠재 수익 (기준 통화, 내림 적용)
    pub profit: Amount,
}

/// 토큰 하나의 평가 결과. 두 방향 중 수익이 큰 쪽입니다.
#[derive(Debug, Clone)]
pub struct TokenReport {
    /// 평가한 토큰
    pub token: String,
    /// 최선 사이클
    pub best: CycleResult,
}

struct RouteQuotes {
    main_base: TopOfBook,
    main_bridge: TopOfBook,
    bridge_base: TopOfBook,
}

/// 삼각 차익거래 스캐너.
pub struct ArbitrageScanner {
    exchange: Arc<dyn Exchange>,
    notifier: Arc<dyn Notifier>,
    config: ArbitrageConfig,
}

impl ArbitrageScanner {
    /// 새 스캐너를 생성합니다.
    pub fn new(
        exchange: Arc<dyn Exchange>,
        notifier: Arc<dyn Notifier>,
        config: ArbitrageConfig,
    ) -> Self {
        Self {
            exchange,
            notifier,
            config,
        }
    }

    /// 설정된 모든 토큰을 한 차례 스캔합니다.
    ///
    /// 호가 조회 실패는 해당 토큰만 건너뜁니다. 임계값을 넘는 수익은
    /// 알림으로 발송하며, 알림 실패가 스캔을 중단시키지 않습니다.
    pub async fn scan(&self) -> Vec<TokenReport> {
        let mut reports = Vec::with_capacity(self.config.tokens.len());
        for token in &self.config.tokens {
            let Some(quotes) = self.fetch_route(token).await else {
                continue;
            };
            let Some(report) = self.evaluate_token(token, &quotes) else {
                continue;
            };

            if report.best.profit > self.config.profit_threshold {
                self.announce(&report).await;
            }
            reports.push(report);
        }
        reports
    }

    async fn fetch_route(&self, token: &str) -> Option<RouteQuotes> {
        let (main_base, main_bridge, bridge_base) = self.config.route_symbols(token);
        let symbols = [main_base.clone(), main_bridge.clone(), bridge_base.clone()];

        let quotes = match self.exchange.top_of_book(&symbols).await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(token, error = %e, "route quote fetch failed, skipping token");
                return None;
            }
        };
        let mut by_symbol: HashMap<Symbol, TopOfBook> =
            quotes.into_iter().map(|q| (q.symbol.clone(), q)).collect();

        let mut take = |symbol: &Symbol| match by_symbol.remove(symbol) {
            Some(quote) => Some(quote),
            None => {
                warn!(token, %symbol, "route leg quote missing, skipping token");
                None
            }
        };
        Some(RouteQuotes {
            main_base: take(&main_base)?,
            main_bridge: take(&main_bridge)?,
            bridge_base: take(&bridge_base)?,
        })
    }

    fn evaluate_token(&self, token: &str, quotes: &RouteQuotes) -> Option<TokenReport> {
        let forward = evaluate_forward(self.config.notional, quotes)?;
        let reverse = evaluate_reverse(self.config.notional, quotes)?;

        let best = if forward.profit >= reverse.profit {
            forward
        } else {
            reverse
        };
        debug!(token, direction = ?best.direction, profit = %best.profit, "token evaluated");
        Some(TokenReport {
            token: token.to_string(),
            best,
        })
    }

    async fn announce(&self, report: &TokenReport) {
        let cycle = &report.best;
        let body = format!(
            "route: {}\nnotional: {} {}\nleg prices: {} / {} / {}\nleg amounts: {} / {} / {}\npotential profit: {} {}",
            cycle.direction.route(&report.token, &self.config),
            self.config.notional,
            self.config.base_currency,
            cycle.leg_prices[0],
            cycle.leg_prices[1],
            cycle.leg_prices[2],
            cycle.leg_amounts[0],
            cycle.leg_amounts[1],
            cycle.leg_amounts[2],
            cycle.profit,
            self.config.base_currency,
        );
        info!(token = report.token, profit = %cycle.profit, "arbitrage opportunity");
        self.notifier
            .notify_info("Arbitrage opportunity", &body)
            .await;
    }
}

/// 정방향 사이클: 기준으로 메인 매수 → 메인을 브리지로 매도 →
/// 브리지를 기준으로 매도.
fn evaluate_forward(notional: Amount, quotes: &RouteQuotes) -> Option<CycleResult> {
    let buy_main = quotes.main_base.ask;
    let sell_main = quotes.main_bridge.bid;
    let sell_bridge = quotes.bridge_base.bid;
    if buy_main <= Decimal::ZERO || sell_main <= Decimal::ZERO || sell_bridge <= Decimal::ZERO {
        return None;
    }

    let main_amount = floor_amount(notional / buy_main);
    let bridge_amount = floor_amount(main_amount * sell_main);
    let final_amount = floor_amount(bridge_amount * sell_bridge);

    Some(CycleResult {
        direction: CycleDirection::Forward,
        leg_prices: [buy_main, sell_main, sell_bridge],
        leg_amounts: [main_amount, bridge_amount, final_amount],
        profit: floor_amount(final_amount - notional),
    })
}

/// 역방향 사이클: 기준으로 브리지 매수 → 브리지로 메인 매수 →
/// 메인을 기준으로 매도.
fn evaluate_reverse(notional: Amount, quotes: &RouteQuotes) -> Option<CycleResult> {
    let buy_bridge = quotes.bridge_base.ask;
    let buy_main = quotes.main_bridge.ask;
    let sell_main = quotes.main_base.bid;
    if buy_bridge <= Decimal::ZERO || buy_main <= Decimal::ZERO || sell_main <= Decimal::ZERO {
        return None;
    }

    let bridge_amount = floor_amount(notional / buy_bridge);
    let main_amount = floor_amount(bridge_amount / buy_main);
    let final_amount = floor_amount(main_amount * sell_main);

    Some(CycleResult {
        direction: CycleDirection::Reverse,
        leg_prices: [buy_bridge, buy_main, sell_main],
        leg_amounts: [bridge_amount, main_amount, final_amount],
        profit: floor_amount(final_amount - notional),
    })
}
