//! 가격 사다리 구성.
//!
//! 설정으로부터 그리드의 가격 레벨 사다리를 구성하는 순수 함수들입니다.
//! 엔티티를 제자리에서 변경하지 않고 갱신된 값을 반환하며, 조합은
//! 오케스트레이션 서비스가 담당합니다.
//!
//! 수량은 항상 최소 증분으로 내림합니다. 봇이 설정된 예산보다 많이
//! 주문하는 일이 없어야 합니다.

use rust_decimal::Decimal;
use uuid::Uuid;

use gridbot_core::{
    DecimalFloorExt, Grid, GridConfig, GridResult, LadderConfig, Price, Quantity, Step, StepKind,
    StepStatus,
};

/// pegged 스텝 구성/갱신의 결과.
///
/// 갱신과 제거는 기존 미체결 주문의 취소를 요구할 수 있습니다.
/// 주문 취소라는 부수효과는 빌더가 아닌 호출자(리컨실러/서비스)의
/// 소유입니다.
#[derive(Debug, Clone)]
pub enum StepUpdate {
    /// 변경 없음 (멱등 no-op)
    Unchanged,
    /// 새 스텝 생성됨
    Created(Step),
    /// 기존 스텝이 갱신됨 (미체결 주문은 호출자가 취소해야 함)
    Updated(Step),
    /// 기존 스텝이 소프트 삭제됨 (미체결 주문은 호출자가 취소해야 함)
    Removed(Step),
}

/// 종료 스텝 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// 익절 경계
    TakeProfit,
    /// 손절 경계
    StopLoss,
}

impl ExitKind {
    /// 대응하는 스텝 유형.
    pub fn step_kind(&self) -> StepKind {
        match self {
            ExitKind::TakeProfit => StepKind::TakeProfit,
            ExitKind::StopLoss => StepKind::StopLoss,
        }
    }

    /// 설정된 경계 가격.
    pub fn bound(&self, config: &GridConfig) -> Option<Price> {
        match self {
            ExitKind::TakeProfit => config.take_profit,
            ExitKind::StopLoss => config.stop_loss,
        }
    }
}

/// 일반 사다리 스텝들을 구성합니다.
///
/// stepSize = (upper − lower) / n 간격으로 연속된 스텝을 만듭니다.
/// 각 스텝의 수량은 예약 비율을 제외한 스텝당 투자금을 매수 가격으로
/// 나눠 최소 증분으로 내림한 값입니다.
///
/// # 불변식
/// - 정확히 `number_of_grids`개의 연속·단조 증가 스텝
///   (`buy[i+1] == sell[i]`)
/// - `sum(qty × buy_price) ≤ (1 − reserved_fraction) × investment`
///
/// # Errors
/// - `GridError::Validation`: 설정 검증 실패
pub fn build_normal_steps(
    grid_id: Uuid,
    config: &GridConfig,
    ladder: &LadderConfig,
) -> GridResult<Vec<Step>> {
    config.validate()?;

    let n = Decimal::from(config.number_of_grids);
    let step_size = (config.upper_price - config.lower_price) / n;
    let investment_per_step =
        (Decimal::ONE - ladder.reserved_fraction) * config.investment / n;

    let mut steps = Vec::with_capacity(config.number_of_grids as usize);
    for i in 0..config.number_of_grids {
        let buy_price = config.lower_price + step_size * Decimal::from(i);
        let sell_price = buy_price + step_size;
        let qty = (investment_per_step / buy_price).floor_to_increment(ladder.qty_increment);
        steps.push(Step::new_normal(grid_id, buy_price, sell_price, qty));
    }
    Ok(steps)
}

/// 초기 진입 스텝을 구성하거나 갱신합니다.
///
/// 트리거 가격에 고정된 매수 스텝이며, 수량은 예약 비율만큼의 호가
/// 잔고를 트리거 가격으로 나눠 내림한 값입니다.
///
/// 트리거가 바뀌지 않았으면 no-op입니다. 멱등성이 불필요한 주문
/// 취소/재배치를 막습니다. 트리거가 바뀌었으면 가격/수량을 재설정하고
/// 주문 참조를 비웁니다. 이전 미체결 주문의 취소는 호출자 몫입니다.
pub fn build_or_update_initial_step(grid: &Grid, ladder: &LadderConfig) -> StepUpdate {
    let trigger = grid.config.trigger_price;
    let qty = initial_qty(grid.quote_balance, trigger, ladder);

    match grid.find_step_by_kind(StepKind::Initial) {
        None => StepUpdate::Created(Step::new_pegged(
            grid.id,
            StepKind::Initial,
            trigger,
            qty,
            StepStatus::AwaitingBuy,
        )),
        Some(existing) if existing.buy_price == trigger => StepUpdate::Unchanged,
        Some(existing) => {
            let mut step = existing.clone();
            step.buy_price = trigger;
            step.sell_price = trigger;
            step.qty = qty;
            step.exchange_order_id = None;
            step.status = StepStatus::AwaitingBuy;
            StepUpdate::Updated(step)
        }
    }
}

/// 종료 스텝(익절/손절)을 구성하거나 갱신합니다.
///
/// 경계가 해제되면 기존 스텝을 소프트 삭제하고 주문 참조를 비웁니다.
/// 경계가 설정되어 있으면 초기 스텝과 같은 멱등 규칙으로 해당 경계에
/// 고정된 매도 스텝을 생성/갱신합니다. 수량은 구성 시점의 기준 통화
/// 잔고를 내림한 값입니다.
pub fn build_or_update_exit_step(
    grid: &Grid,
    kind: ExitKind,
    ladder: &LadderConfig,
) -> StepUpdate {
    let existing = grid.find_step_by_kind(kind.step_kind());

    match (kind.bound(&grid.config), existing) {
        (None, None) => StepUpdate::Unchanged,
        (None, Some(existing)) => {
            let mut step = existing.clone();
            step.lifecycle = gridbot_core::Lifecycle::Deleted;
            step.exchange_order_id = None;
            step.status = step.status.to_awaiting();
            StepUpdate::Removed(step)
        }
        (Some(bound), None) => StepUpdate::Created(Step::new_pegged(
            grid.id,
            kind.step_kind(),
            bound,
            exit_qty(grid, ladder),
            StepStatus::AwaitingSell,
        )),
        (Some(bound), Some(existing)) if existing.buy_price == bound => StepUpdate::Unchanged,
        (Some(bound), Some(existing)) => {
            let mut step = existing.clone();
            step.buy_price = bound;
            step.sell_price = bound;
            step.qty = exit_qty(grid, ladder);
            step.exchange_order_id = None;
            step.status = StepStatus::AwaitingSell;
            StepUpdate::Updated(step)
        }
    }
}

fn initial_qty(quote_balance: Decimal, trigger: Price, ladder: &LadderConfig) -> Quantity {
    (ladder.reserved_fraction * quote_balance / trigger).floor_to_increment(ladder.qty_increment)
}

fn exit_qty(grid: &Grid, ladder: &LadderConfig) -> Quantity {
    grid.base_balance.floor_to_increment(ladder.qty_increment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridbot_core::{GridError, GridMode, Symbol};
    use rust_decimal_macros::dec;

    fn config() -> GridConfig {
        GridConfig {
            symbol: Symbol::new("BTC", "USDT"),
            lower_price: dec!(90),
            upper_price: dec!(110),
            trigger_price: dec!(100),
            number_of_grids: 10,
            investment: dec!(1000),
            take_profit: Some(dec!(150)),
            stop_loss: None,
            mode: GridMode::Paper,
        }
    }

    fn grid() -> Grid {
        Grid::new(Uuid::new_v4(), config()).unwrap()
    }

    #[test]
    fn test_normal_steps_are_contiguous_and_increasing() {
        let cfg = config();
        let steps = build_normal_steps(Uuid::new_v4(), &cfg, &LadderConfig::default()).unwrap();

        assert_eq!(steps.len(), 10);
        assert_eq!(steps[0].buy_price, dec!(90));
        assert_eq!(steps[9].sell_price, dec!(110));
        for pair in steps.windows(2) {
            // 연속: 다음 매수가 == 이전 매도가
            assert_eq!(pair[1].buy_price, pair[0].sell_price);
            assert!(pair[1].buy_price > pair[0].buy_price);
        }
        for step in &steps {
            assert_eq!(step.kind, StepKind::Normal);
            assert_eq!(step.status, StepStatus::AwaitingBuy);
            assert_eq!(step.sell_price - step.buy_price, dec!(2));
        }
    }

    #[test]
    fn test_normal_steps_never_exceed_budget() {
        let ladder = LadderConfig::default();
        for investment in [dec!(100), dec!(1000), dec!(12345.67), dec!(999999)] {
            let mut cfg = config();
            cfg.investment = investment;
            let steps = build_normal_steps(Uuid::new_v4(), &cfg, &ladder).unwrap();

            let committed: Decimal = steps.iter().map(|s| s.qty * s.buy_price).sum();
            let budget = (Decimal::ONE - ladder.reserved_fraction) * investment;
            assert!(
                committed <= budget,
                "committed {committed} exceeds budget {budget}"
            );
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = config();
        cfg.upper_price = dec!(90);
        assert!(matches!(
            build_normal_steps(Uuid::new_v4(), &cfg, &LadderConfig::default()),
            Err(GridError::Validation(_))
        ));
    }

    #[test]
    fn test_initial_step_created_then_idempotent() {
        let mut grid = grid();
        let ladder = LadderConfig::default();

        let StepUpdate::Created(step) = build_or_update_initial_step(&grid, &ladder) else {
            panic!("expected Created");
        };
        assert_eq!(step.kind, StepKind::Initial);
        assert_eq!(step.buy_price, dec!(100));
        assert_eq!(step.sell_price, dec!(100));
        // qty = floor(0.25 * 1000 / 100)
        assert_eq!(step.qty, dec!(2.5));
        grid.steps.push(step);

        // 트리거 불변 → no-op, 주문 ID 변동 없음
        let first = grid.find_step_by_kind(StepKind::Initial).unwrap().clone();
        assert!(matches!(
            build_or_update_initial_step(&grid, &ladder),
            StepUpdate::Unchanged
        ));
        let second = grid.find_step_by_kind(StepKind::Initial).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.exchange_order_id, second.exchange_order_id);
        assert_eq!(first.qty, second.qty);
    }

    #[test]
    fn test_initial_step_reset_on_trigger_change() {
        let mut grid = grid();
        let ladder = LadderConfig::default();

        let StepUpdate::Created(mut step) = build_or_update_initial_step(&grid, &ladder) else {
            panic!("expected Created");
        };
        step.exchange_order_id = Some("o-1".to_string());
        step.status = StepStatus::BuyOrderPlaced;
        grid.steps.push(step);

        grid.config.trigger_price = dec!(95);
        let StepUpdate::Updated(updated) = build_or_update_initial_step(&grid, &ladder) else {
            panic!("expected Updated");
        };
        assert_eq!(updated.buy_price, dec!(95));
        assert_eq!(updated.sell_price, dec!(95));
        assert!(updated.exchange_order_id.is_none());
        assert_eq!(updated.status, StepStatus::AwaitingBuy);
    }

    #[test]
    fn test_exit_step_lifecycle() {
        let mut grid = grid();
        let ladder = LadderConfig::default();

        // 익절 경계 설정됨 → 생성
        let StepUpdate::Created(step) =
            build_or_update_exit_step(&grid, ExitKind::TakeProfit, &ladder)
        else {
            panic!("expected Created");
        };
        assert_eq!(step.kind, StepKind::TakeProfit);
        assert_eq!(step.buy_price, dec!(150));
        assert_eq!(step.status, StepStatus::AwaitingSell);
        grid.steps.push(step);

        // 경계 불변 → no-op
        assert!(matches!(
            build_or_update_exit_step(&grid, ExitKind::TakeProfit, &ladder),
            StepUpdate::Unchanged
        ));

        // 경계 해제 → 소프트 삭제
        grid.config.take_profit = None;
        let StepUpdate::Removed(removed) =
            build_or_update_exit_step(&grid, ExitKind::TakeProfit, &ladder)
        else {
            panic!("expected Removed");
        };
        assert_eq!(removed.lifecycle, gridbot_core::Lifecycle::Deleted);

        // 손절 경계는 설정된 적 없음 → no-op
        assert!(matches!(
            build_or_update_exit_step(&grid, ExitKind::StopLoss, &ladder),
            StepUpdate::Unchanged
        ));
    }
}
