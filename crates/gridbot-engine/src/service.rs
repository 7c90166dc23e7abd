//! 그리드 오케스트레이션 서비스.
//!
//! 생성/수정/삭제/일시정지/재개와 주기적 틱을 묶습니다. 틱은 외부에서
//! 주기적으로 호출되는 배치 작업이며, 상주 백그라운드 스레드는 없습니다.
//!
//! 한 그리드의 틱 내 모든 스텝/잔고 변경은 `save_grid`를 통해 단일
//! 트랜잭션으로 커밋됩니다. 그리드 간 실패는 격리됩니다. 한 그리드의
//! 실패가 같은 배치의 다른 그리드를 막지 않습니다.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{error, info, warn};
use uuid::Uuid;

use gridbot_core::{
    Grid, GridConfig, GridError, GridResult, GridStatus, GridStore, LadderConfig, Price, Symbol,
};
use gridbot_exchange::Exchange;
use gridbot_notification::Notifier;

use crate::ladder::{
    build_normal_steps, build_or_update_exit_step, build_or_update_initial_step, ExitKind,
    StepUpdate,
};
use crate::reconciler::StepReconciler;
use crate::state;

/// 한 차례 틱 배치의 결과 집계.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// 변경이 커밋된 그리드 수
    pub committed: usize,
    /// 건너뛴 그리드 수 (종료 상태, 시세 결측)
    pub skipped: usize,
    /// 실패한 그리드 수 (다른 그리드에 영향 없음)
    pub failed: usize,
}

/// 그리드 오케스트레이션 서비스.
pub struct GridService {
    store: Arc<dyn GridStore>,
    exchange: Arc<dyn Exchange>,
    notifier: Arc<dyn Notifier>,
    reconciler: StepReconciler,
    ladder: LadderConfig,
}

impl GridService {
    /// 새 서비스를 생성합니다.
    pub fn new(
        store: Arc<dyn GridStore>,
        exchange: Arc<dyn Exchange>,
        notifier: Arc<dyn Notifier>,
        ladder: LadderConfig,
    ) -> Self {
        Self {
            store,
            reconciler: StepReconciler::new(exchange.clone(), notifier.clone()),
            exchange,
            notifier,
            ladder,
        }
    }

    /// 새 그리드를 생성하고 사다리를 구성합니다.
    ///
    /// # Errors
    /// - `GridError::Validation`: 설정 검증 실패
    pub async fn create_grid(&self, owner: Uuid, config: GridConfig) -> GridResult<Grid> {
        let mut grid = Grid::new(owner, config)?;
        grid.steps = build_normal_steps(grid.id, &grid.config, &self.ladder)?;
        let update = build_or_update_initial_step(&grid, &self.ladder);
        self.apply_step_update(&mut grid, update).await?;
        let update = build_or_update_exit_step(&grid, ExitKind::TakeProfit, &self.ladder);
        self.apply_step_update(&mut grid, update).await?;
        let update = build_or_update_exit_step(&grid, ExitKind::StopLoss, &self.ladder);
        self.apply_step_update(&mut grid, update).await?;

        self.store.insert_grid(&grid).await?;
        info!(
            grid_id = %grid.id,
            symbol = %grid.config.symbol,
            steps = grid.steps.len(),
            investment = %grid.config.investment,
            "grid created"
        );
        Ok(grid)
    }

    /// 그리드 설정을 수정합니다.
    ///
    /// 트리거/익절/손절만 변경할 수 있으며, 바뀐 경계에 고정된 스텝만
    /// 제자리에서 재생성됩니다. 일반 사다리 스텝은 건드리지 않습니다.
    ///
    /// # Errors
    /// - `GridError::NotFound`: 그리드 없음
    /// - `GridError::Validation`: 종료된 그리드, 불변 필드 변경 시도
    pub async fn update_grid(&self, id: Uuid, config: GridConfig) -> GridResult<Grid> {
        let mut grid = self.load(id).await?;
        if grid.is_terminal() {
            return Err(GridError::validation(format!(
                "grid {id} is terminal, config is immutable"
            )));
        }

        let current = &grid.config;
        if config.symbol != current.symbol
            || config.lower_price != current.lower_price
            || config.upper_price != current.upper_price
            || config.number_of_grids != current.number_of_grids
            || config.investment != current.investment
        {
            return Err(GridError::validation(
                "only trigger_price, take_profit and stop_loss can be updated",
            ));
        }
        config.validate()?;

        grid.config = config;
        let update = build_or_update_initial_step(&grid, &self.ladder);
        self.apply_step_update(&mut grid, update).await?;
        let update = build_or_update_exit_step(&grid, ExitKind::TakeProfit, &self.ladder);
        self.apply_step_update(&mut grid, update).await?;
        let update = build_or_update_exit_step(&grid, ExitKind::StopLoss, &self.ladder);
        self.apply_step_update(&mut grid, update).await?;

        grid.touch();
        self.store.save_grid(&grid).await?;
        info!(grid_id = %id, "grid config updated");
        Ok(grid)
    }

    /// 그리드를 소프트 삭제합니다. 미체결 스텝 주문은 먼저 취소됩니다.
    pub async fn delete_grid(&self, id: Uuid) -> GridResult<()> {
        let mut grid = self.load(id).await?;
        for step in grid.steps.iter_mut() {
            self.reconciler.cancel_step_order(step).await?;
        }
        self.store.save_grid(&grid).await?;
        self.store.mark_grid_deleted(id, Utc::now()).await?;
        info!(grid_id = %id, "grid deleted");
        Ok(())
    }

    /// 가동 중인 그리드를 일시정지합니다. 미체결 주문은 유지됩니다.
    pub async fn pause_grid(&self, id: Uuid) -> GridResult<Grid> {
        let mut grid = self.load(id).await?;
        state::pause(&mut grid)?;
        self.store.save_grid(&grid).await?;
        Ok(grid)
    }

    /// 일시정지된 그리드를 재개합니다.
    pub async fn resume_grid(&self, id: Uuid) -> GridResult<Grid> {
        let mut grid = self.load(id).await?;
        state::resume(&mut grid)?;
        self.store.save_grid(&grid).await?;
        Ok(grid)
    }

    /// 모든 활성 그리드를 한 차례 틱합니다.
    ///
    /// 심볼별 시세는 틱당 한 번만 조회해 같은 심볼의 모든 그리드에
    /// 전파합니다. 시세 조회 실패와 그리드 처리 실패는 모두 해당
    /// 심볼/그리드로 격리됩니다.
    pub async fn tick_all_grids(&self) -> GridResult<TickReport> {
        let mut grids = self.store.load_active_grids().await?;
        let prices = self.fetch_prices(&grids).await;

        let mut report = TickReport::default();
        for grid in grids.iter_mut() {
            let price = prices.get(&grid.config.symbol).copied();
            match self.tick_grid(grid, price).await {
                Ok(true) => report.committed += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(grid_id = %grid.id, error = %e, "grid tick failed");
                    self.notifier
                        .notify_error("Grid tick failed", &format!("grid {}: {e}", grid.id))
                        .await;
                }
            }
        }
        info!(
            committed = report.committed,
            skipped = report.skipped,
            failed = report.failed,
            "tick batch finished"
        );
        Ok(report)
    }

    /// 배치 내 고유 심볼들의 현재가를 동시 조회합니다.
    ///
    /// 실패한 심볼은 결과에서 빠지고, 해당 심볼의 그리드들은 이번 틱을
    /// 건너뜁니다.
    async fn fetch_prices(&self, grids: &[Grid]) -> HashMap<Symbol, Price> {
        let mut symbols: Vec<Symbol> = Vec::new();
        for grid in grids.iter().filter(|g| !g.is_terminal()) {
            if !symbols.contains(&grid.config.symbol) {
                symbols.push(grid.config.symbol.clone());
            }
        }

        let fetches = symbols.iter().map(|symbol| {
            let exchange = self.exchange.clone();
            async move {
                match exchange.top_of_book(std::slice::from_ref(symbol)).await {
                    Ok(quotes) => quotes.into_iter().next().map(|q| (symbol.clone(), q.last)),
                    Err(e) => {
                        warn!(%symbol, error = %e, "price fetch failed, skipping symbol");
                        None
                    }
                }
            }
        });
        join_all(fetches).await.into_iter().flatten().collect()
    }

    /// 한 그리드를 틱합니다.
    ///
    /// # Returns
    /// 변경이 커밋되면 `true`, 건너뛰면 `false`.
    async fn tick_grid(&self, grid: &mut Grid, price: Option<Price>) -> GridResult<bool> {
        if grid.is_terminal() {
            return Ok(false);
        }
        let Some(price) = price else {
            return Ok(false);
        };

        if let Some(next) = state::evaluate(grid, price) {
            state::apply(grid, next);
            if next.is_terminal() {
                self.reconciler.freeze(grid).await?;
                self.notifier
                    .notify_info(
                        &format!("Grid {next}"),
                        &format!(
                            "{} grid {} closed at {price}, realized profit {}",
                            grid.config.symbol, grid.id, grid.realized_profit
                        ),
                    )
                    .await;
                self.store.save_grid(grid).await?;
                return Ok(true);
            }
        }

        if grid.status == GridStatus::Running {
            self.reconciler.work_steps(grid).await?;
        }
        self.store.save_grid(grid).await?;
        Ok(true)
    }

    /// pegged 스텝 갱신을 그리드에 적용합니다.
    ///
    /// 교체/제거되는 스텝의 미체결 주문은 적용 전에 취소합니다.
    async fn apply_step_update(&self, grid: &mut Grid, update: StepUpdate) -> GridResult<()> {
        match update {
            StepUpdate::Unchanged => Ok(()),
            StepUpdate::Created(step) => {
                grid.steps.push(step);
                Ok(())
            }
            StepUpdate::Updated(step) | StepUpdate::Removed(step) => {
                let Some(idx) = grid.steps.iter().position(|s| s.id == step.id) else {
                    return Err(GridError::not_found(format!(
                        "step {} not in grid {}",
                        step.id, grid.id
                    )));
                };
                self.reconciler.cancel_step_order(&mut grid.steps[idx]).await?;
                grid.steps[idx] = step;
                Ok(())
            }
        }
    }

    async fn load(&self, id: Uuid) -> GridResult<Grid> {
        self.store
            .load_grid(id)
            .await?
            .ok_or_else(|| GridError::not_found(format!("grid {id}")))
    }
}
