//! 그리드 상태 전이.
//!
//! 현재가에 의해 구동되는 순수 전이 함수와, 수동 일시정지/재개
//! 전이를 제공합니다. 평가(evaluate)는 읽기 전용이며 적용(apply)이
//! 분리되어 있어, 전이에 수반되는 부수효과(주문 취소 등)를 호출자가
//! 전이 전후에 배치할 수 있습니다.

use tracing::info;

use gridbot_core::{Grid, GridError, GridResult, GridStatus, Price};

/// 현재가에 대한 그리드의 다음 상태를 평가합니다.
///
/// 전이가 없으면 `None`을 반환합니다. 가격이 0 이하이면 해당 틱에서는
/// 판단하지 않습니다 (결측 시세로 인한 오동작 방지).
///
/// - `New`: 현재가 < 트리거 ⇒ `Running`. 사다리는 트리거 아래로의
///   되돌림을 잡기 위해 존재합니다.
/// - `Running`: 현재가 ≥ 익절 경계 ⇒ `TakeProfit`,
///   그렇지 않고 현재가 ≤ 손절 경계 ⇒ `StopLoss`.
/// - `Paused` 및 종료 상태는 가격으로 전이하지 않습니다.
pub fn evaluate(grid: &Grid, current_price: Price) -> Option<GridStatus> {
    if current_price <= Price::ZERO {
        return None;
    }

    match grid.status {
        GridStatus::New => {
            if current_price < grid.config.trigger_price {
                Some(GridStatus::Running)
            } else {
                None
            }
        }
        GridStatus::Running => {
            if let Some(take_profit) = grid.config.take_profit {
                if current_price >= take_profit {
                    return Some(GridStatus::TakeProfit);
                }
            }
            if let Some(stop_loss) = grid.config.stop_loss {
                if current_price <= stop_loss {
                    return Some(GridStatus::StopLoss);
                }
            }
            None
        }
        GridStatus::Paused | GridStatus::TakeProfit | GridStatus::StopLoss => None,
    }
}

/// 평가된 전이를 그리드에 적용합니다.
pub fn apply(grid: &mut Grid, next: GridStatus) {
    let previous = grid.status;
    grid.status = next;
    grid.touch();
    info!(
        grid_id = %grid.id,
        symbol = %grid.config.symbol,
        from = %previous,
        to = %next,
        "grid status transition"
    );
}

/// 그리드를 수동으로 일시정지합니다.
///
/// # Errors
/// - `GridError::Validation`: `Running` 상태가 아닌 그리드
pub fn pause(grid: &mut Grid) -> GridResult<()> {
    if grid.status != GridStatus::Running {
        return Err(GridError::validation(format!(
            "cannot pause grid in status {}",
            grid.status
        )));
    }
    apply(grid, GridStatus::Paused);
    Ok(())
}

/// 일시정지된 그리드를 재개합니다.
///
/// # Errors
/// - `GridError::Validation`: `Paused` 상태가 아닌 그리드
pub fn resume(grid: &mut Grid) -> GridResult<()> {
    if grid.status != GridStatus::Paused {
        return Err(GridError::validation(format!(
            "cannot resume grid in status {}",
            grid.status
        )));
    }
    apply(grid, GridStatus::Running);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridbot_core::{GridConfig, GridMode, Symbol};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn grid() -> Grid {
        Grid::new(
            Uuid::new_v4(),
            GridConfig {
                symbol: Symbol::new("BTC", "USDT"),
                lower_price: dec!(90),
                upper_price: dec!(110),
                trigger_price: dec!(100),
                number_of_grids: 10,
                investment: dec!(1000),
                take_profit: Some(dec!(150)),
                stop_loss: Some(dec!(50)),
                mode: GridMode::Paper,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_new_grid_triggers_below_trigger_price() {
        let grid = grid();
        assert_eq!(evaluate(&grid, dec!(99)), Some(GridStatus::Running));
        assert_eq!(evaluate(&grid, dec!(100)), None);
        assert_eq!(evaluate(&grid, dec!(101)), None);
    }

    #[test]
    fn test_running_grid_hits_exit_bounds() {
        let mut grid = grid();
        grid.status = GridStatus::Running;

        assert_eq!(evaluate(&grid, dec!(150)), Some(GridStatus::TakeProfit));
        assert_eq!(evaluate(&grid, dec!(151)), Some(GridStatus::TakeProfit));
        assert_eq!(evaluate(&grid, dec!(50)), Some(GridStatus::StopLoss));
        assert_eq!(evaluate(&grid, dec!(100)), None);
    }

    #[test]
    fn test_unset_bounds_never_exit() {
        let mut grid = grid();
        grid.status = GridStatus::Running;
        grid.config.take_profit = None;
        grid.config.stop_loss = None;

        assert_eq!(evaluate(&grid, dec!(999999)), None);
        assert_eq!(evaluate(&grid, dec!(0.0001)), None);
    }

    #[test]
    fn test_terminal_grid_never_transitions() {
        let mut grid = grid();
        grid.status = GridStatus::TakeProfit;
        assert_eq!(evaluate(&grid, dec!(50)), None);
        assert_eq!(evaluate(&grid, dec!(99)), None);

        grid.status = GridStatus::StopLoss;
        assert_eq!(evaluate(&grid, dec!(150)), None);
    }

    #[test]
    fn test_zero_price_is_ignored() {
        let mut grid = grid();
        grid.status = GridStatus::Running;
        assert_eq!(evaluate(&grid, dec!(0)), None);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut grid = grid();
        assert!(pause(&mut grid).is_err());

        grid.status = GridStatus::Running;
        pause(&mut grid).unwrap();
        assert_eq!(grid.status, GridStatus::Paused);

        // 일시정지 중에는 가격 전이 없음
        assert_eq!(evaluate(&grid, dec!(150)), None);

        resume(&mut grid).unwrap();
        assert_eq!(grid.status, GridStatus::Running);

        grid.status = GridStatus::TakeProfit;
        assert!(pause(&mut grid).is_err());
        assert!(resume(&mut grid).is_err());
    }
}
