//! Postgres 저장소 구현.
//!
//! 그리드 애그리거트는 `grids`/`grid_steps`/`order_fills` 세 테이블에
//! 걸쳐 저장되며, `save_grid`는 단일 트랜잭션으로 스텝 집합을 통째로
//! 교체합니다. 한 틱의 변경이 부분적으로만 커밋되는 일은 없습니다.
//!
//! 거래 이력은 (symbol, trade_id) 기본 키와 `ON CONFLICT DO NOTHING`으로
//! 중복 삽입을 no-op으로 만듭니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use gridbot_core::{
    DatabaseConfig, Grid, GridConfig, GridMode, GridStatus, GridStore, Lifecycle, OrderFill, Side,
    Step, StepKind, StepStatus, StoreError, StoreResult, SyncCheckpoint, SyncStore, Symbol,
    TradeHistoryRecord,
};

/// 설정으로 Postgres 연결 풀을 생성합니다.
pub async fn connect_pool(config: &DatabaseConfig) -> StoreResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(db_err)
}

/// 스키마 마이그레이션을 실행합니다.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn parse_err(field: &str, value: &str) -> StoreError {
    StoreError::Serialization(format!("unknown {field}: {value}"))
}

fn parse_grid_status(s: &str) -> StoreResult<GridStatus> {
    match s {
        "new" => Ok(GridStatus::New),
        "running" => Ok(GridStatus::Running),
        "take_profit" => Ok(GridStatus::TakeProfit),
        "stop_loss" => Ok(GridStatus::StopLoss),
        "paused" => Ok(GridStatus::Paused),
        other => Err(parse_err("grid status", other)),
    }
}

fn parse_step_kind(s: &str) -> StoreResult<StepKind> {
    match s {
        "initial" => Ok(StepKind::Initial),
        "normal" => Ok(StepKind::Normal),
        "take_profit" => Ok(StepKind::TakeProfit),
        "stop_loss" => Ok(StepKind::StopLoss),
        other => Err(parse_err("step kind", other)),
    }
}

fn parse_step_status(s: &str) -> StoreResult<StepStatus> {
    match s {
        "awaiting_buy" => Ok(StepStatus::AwaitingBuy),
        "buy_order_placed" => Ok(StepStatus::BuyOrderPlaced),
        "awaiting_sell" => Ok(StepStatus::AwaitingSell),
        "sell_order_placed" => Ok(StepStatus::SellOrderPlaced),
        other => Err(parse_err("step status", other)),
    }
}

fn parse_lifecycle(s: &str) -> StoreResult<Lifecycle> {
    match s {
        "active" => Ok(Lifecycle::Active),
        "deleted" => Ok(Lifecycle::Deleted),
        other => Err(parse_err("lifecycle", other)),
    }
}

fn parse_mode(s: &str) -> StoreResult<GridMode> {
    match s {
        "live" => Ok(GridMode::Live),
        "paper" => Ok(GridMode::Paper),
        other => Err(parse_err("grid mode", other)),
    }
}

fn parse_side(s: &str) -> StoreResult<Side> {
    match s {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(parse_err("side", other)),
    }
}

fn lifecycle_str(l: Lifecycle) -> &'static str {
    match l {
        Lifecycle::Active => "active",
        Lifecycle::Deleted => "deleted",
    }
}

fn mode_str(m: GridMode) -> &'static str {
    match m {
        GridMode::Live => "live",
        GridMode::Paper => "paper",
    }
}

fn parse_symbol(s: &str) -> StoreResult<Symbol> {
    Symbol::parse(s).ok_or_else(|| parse_err("symbol", s))
}

#[derive(sqlx::FromRow)]
struct GridRow {
    id: Uuid,
    owner: Uuid,
    symbol: String,
    lower_price: Decimal,
    upper_price: Decimal,
    trigger_price: Decimal,
    number_of_grids: i32,
    investment: Decimal,
    take_profit: Option<Decimal>,
    stop_loss: Option<Decimal>,
    mode: String,
    status: String,
    quote_balance: Decimal,
    base_balance: Decimal,
    realized_profit: Decimal,
    lifecycle: String,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GridRow {
    fn into_grid(self, steps: Vec<Step>) -> StoreResult<Grid> {
        Ok(Grid {
            id: self.id,
            owner: self.owner,
            config: GridConfig {
                symbol: parse_symbol(&self.symbol)?,
                lower_price: self.lower_price,
                upper_price: self.upper_price,
                trigger_price: self.trigger_price,
                number_of_grids: self.number_of_grids as u32,
                investment: self.investment,
                take_profit: self.take_profit,
                stop_loss: self.stop_loss,
                mode: parse_mode(&self.mode)?,
            },
            status: parse_grid_status(&self.status)?,
            quote_balance: self.quote_balance,
            base_balance: self.base_balance,
            realized_profit: self.realized_profit,
            lifecycle: parse_lifecycle(&self.lifecycle)?,
            deleted_at: self.deleted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            steps,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StepRow {
    id: Uuid,
    grid_id: Uuid,
    buy_price: Decimal,
    sell_price: Decimal,
    qty: Decimal,
    kind: String,
    status: String,
    exchange_order_id: Option<String>,
    lifecycle: String,
}

impl StepRow {
    fn into_step(self, fills: Vec<OrderFill>) -> StoreResult<Step> {
        Ok(Step {
            id: self.id,
            grid_id: self.grid_id,
            buy_price: self.buy_price,
            sell_price: self.sell_price,
            qty: self.qty,
            kind: parse_step_kind(&self.kind)?,
            status: parse_step_status(&self.status)?,
            exchange_order_id: self.exchange_order_id,
            lifecycle: parse_lifecycle(&self.lifecycle)?,
            fills,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FillRow {
    id: Uuid,
    step_id: Uuid,
    exchange_order_id: String,
    exchange_fill_id: String,
    side: String,
    price: Decimal,
    qty: Decimal,
    fee: Decimal,
    fee_currency: String,
    filled_at: DateTime<Utc>,
}

impl FillRow {
    fn into_fill(self) -> StoreResult<OrderFill> {
        Ok(OrderFill {
            id: self.id,
            step_id: self.step_id,
            exchange_order_id: self.exchange_order_id,
            exchange_fill_id: self.exchange_fill_id,
            side: parse_side(&self.side)?,
            price: self.price,
            qty: self.qty,
            fee: self.fee,
            fee_currency: self.fee_currency,
            filled_at: self.filled_at,
        })
    }
}

/// Postgres 그리드 저장소.
#[derive(Clone)]
pub struct PgGridStore {
    pool: PgPool,
}

impl PgGridStore {
    /// 새 그리드 저장소를 생성합니다.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_steps(&self, grid_id: Uuid) -> StoreResult<Vec<Step>> {
        let step_rows: Vec<StepRow> = sqlx::query_as(
            r#"
            SELECT id, grid_id, buy_price, sell_price, qty, kind, status,
                   exchange_order_id, lifecycle
            FROM grid_steps
            WHERE grid_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(grid_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let fill_rows: Vec<FillRow> = sqlx::query_as(
            r#"
            SELECT f.id, f.step_id, f.exchange_order_id, f.exchange_fill_id,
                   f.side, f.price, f.qty, f.fee, f.fee_currency, f.filled_at
            FROM order_fills f
            JOIN grid_steps s ON s.id = f.step_id
            WHERE s.grid_id = $1
            ORDER BY f.filled_at ASC
            "#,
        )
        .bind(grid_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut fills_by_step: std::collections::HashMap<Uuid, Vec<OrderFill>> =
            std::collections::HashMap::new();
        for row in fill_rows {
            let fill = row.into_fill()?;
            fills_by_step.entry(fill.step_id).or_default().push(fill);
        }

        step_rows
            .into_iter()
            .map(|row| {
                let fills = fills_by_step.remove(&row.id).unwrap_or_default();
                row.into_step(fills)
            })
            .collect()
    }

    async fn write_steps(
        tx: &mut Transaction<'_, Postgres>,
        grid: &Grid,
    ) -> StoreResult<()> {
        sqlx::query("DELETE FROM grid_steps WHERE grid_id = $1")
            .bind(grid.id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

        for (position, step) in grid.steps.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO grid_steps
                    (id, grid_id, position, buy_price, sell_price, qty, kind,
                     status, exchange_order_id, lifecycle)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(step.id)
            .bind(grid.id)
            .bind(position as i32)
            .bind(step.buy_price)
            .bind(step.sell_price)
            .bind(step.qty)
            .bind(step.kind.as_str())
            .bind(step.status.as_str())
            .bind(&step.exchange_order_id)
            .bind(lifecycle_str(step.lifecycle))
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

            for fill in &step.fills {
                sqlx::query(
                    r#"
                    INSERT INTO order_fills
                        (id, step_id, exchange_order_id, exchange_fill_id,
                         side, price, qty, fee, fee_currency, filled_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(fill.id)
                .bind(step.id)
                .bind(&fill.exchange_order_id)
                .bind(&fill.exchange_fill_id)
                .bind(fill.side.as_str())
                .bind(fill.price)
                .bind(fill.qty)
                .bind(fill.fee)
                .bind(&fill.fee_currency)
                .bind(fill.filled_at)
                .execute(&mut **tx)
                .await
                .map_err(db_err)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GridStore for PgGridStore {
    #[instrument(skip(self, grid), fields(grid_id = %grid.id))]
    async fn insert_grid(&self, grid: &Grid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO grids
                (id, owner, symbol, lower_price, upper_price, trigger_price,
                 number_of_grids, investment, take_profit, stop_loss, mode,
                 status, quote_balance, base_balance, realized_profit,
                 lifecycle, deleted_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(grid.id)
        .bind(grid.owner)
        .bind(grid.config.symbol.exchange_code())
        .bind(grid.config.lower_price)
        .bind(grid.config.upper_price)
        .bind(grid.config.trigger_price)
        .bind(grid.config.number_of_grids as i32)
        .bind(grid.config.investment)
        .bind(grid.config.take_profit)
        .bind(grid.config.stop_loss)
        .bind(mode_str(grid.config.mode))
        .bind(grid.status.as_str())
        .bind(grid.quote_balance)
        .bind(grid.base_balance)
        .bind(grid.realized_profit)
        .bind(lifecycle_str(grid.lifecycle))
        .bind(grid.deleted_at)
        .bind(grid.created_at)
        .bind(grid.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        Self::write_steps(&mut tx, grid).await?;
        tx.commit().await.map_err(db_err)?;
        debug!(steps = grid.steps.len(), "grid inserted");
        Ok(())
    }

    async fn load_grid(&self, id: Uuid) -> StoreResult<Option<Grid>> {
        let row: Option<GridRow> = sqlx::query_as(
            r#"
            SELECT id, owner, symbol, lower_price, upper_price, trigger_price,
                   number_of_grids, investment, take_profit, stop_loss, mode,
                   status, quote_balance, base_balance, realized_profit,
                   lifecycle, deleted_at, created_at, updated_at
            FROM grids
            WHERE id = $1 AND lifecycle = 'active'
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => {
                let steps = self.load_steps(row.id).await?;
                Ok(Some(row.into_grid(steps)?))
            }
            None => Ok(None),
        }
    }

    async fn load_active_grids(&self) -> StoreResult<Vec<Grid>> {
        let rows: Vec<GridRow> = sqlx::query_as(
            r#"
            SELECT id, owner, symbol, lower_price, upper_price, trigger_price,
                   number_of_grids, investment, take_profit, stop_loss, mode,
                   status, quote_balance, base_balance, realized_profit,
                   lifecycle, deleted_at, created_at, updated_at
            FROM grids
            WHERE lifecycle = 'active'
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut grids = Vec::with_capacity(rows.len());
        for row in rows {
            let steps = self.load_steps(row.id).await?;
            grids.push(row.into_grid(steps)?);
        }
        Ok(grids)
    }

    #[instrument(skip(self, grid), fields(grid_id = %grid.id))]
    async fn save_grid(&self, grid: &Grid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let result = sqlx::query(
            r#"
            UPDATE grids SET
                trigger_price = $2, take_profit = $3, stop_loss = $4,
                status = $5, quote_balance = $6, base_balance = $7,
                realized_profit = $8, lifecycle = $9, deleted_at = $10,
                updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(grid.id)
        .bind(grid.config.trigger_price)
        .bind(grid.config.take_profit)
        .bind(grid.config.stop_loss)
        .bind(grid.status.as_str())
        .bind(grid.quote_balance)
        .bind(grid.base_balance)
        .bind(grid.realized_profit)
        .bind(lifecycle_str(grid.lifecycle))
        .bind(grid.deleted_at)
        .bind(grid.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("grid {} not inserted", grid.id)));
        }

        Self::write_steps(&mut tx, grid).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn mark_grid_deleted(&self, id: Uuid, when: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE grids
            SET lifecycle = 'deleted', deleted_at = $2, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(when)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("grid {id} not found")));
        }
        Ok(())
    }
}

/// Postgres 동기화 체크포인트/거래 이력 저장소.
#[derive(Clone)]
pub struct PgSyncStore {
    pool: PgPool,
}

impl PgSyncStore {
    /// 새 동기화 저장소를 생성합니다.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CheckpointRow {
    user_id: Uuid,
    symbol: String,
    configured_start: DateTime<Utc>,
    last_synced_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl SyncStore for PgSyncStore {
    async fn load_checkpoint(
        &self,
        user_id: Uuid,
        symbol: &Symbol,
    ) -> StoreResult<Option<SyncCheckpoint>> {
        let row: Option<CheckpointRow> = sqlx::query_as(
            r#"
            SELECT user_id, symbol, configured_start, last_synced_at, updated_at
            FROM sync_checkpoints
            WHERE user_id = $1 AND symbol = $2
            "#,
        )
        .bind(user_id)
        .bind(symbol.exchange_code())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| {
            Ok(SyncCheckpoint {
                user_id: r.user_id,
                symbol: parse_symbol(&r.symbol)?,
                configured_start: r.configured_start,
                last_synced_at: r.last_synced_at,
                updated_at: r.updated_at,
            })
        })
        .transpose()
    }

    async fn upsert_checkpoint(&self, checkpoint: &SyncCheckpoint) -> StoreResult<()> {
        // 워터마크는 저장소 수준에서도 뒤로 이동하지 않음
        sqlx::query(
            r#"
            INSERT INTO sync_checkpoints
                (user_id, symbol, configured_start, last_synced_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, symbol) DO UPDATE SET
                configured_start = EXCLUDED.configured_start,
                last_synced_at = GREATEST(sync_checkpoints.last_synced_at,
                                          EXCLUDED.last_synced_at),
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(checkpoint.user_id)
        .bind(checkpoint.symbol.exchange_code())
        .bind(checkpoint.configured_start)
        .bind(checkpoint.last_synced_at)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn insert_trades(&self, rows: &[TradeHistoryRecord]) -> StoreResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        // UNNEST 패턴으로 일괄 삽입
        for chunk in rows.chunks(500) {
            let symbols: Vec<String> =
                chunk.iter().map(|r| r.symbol.exchange_code()).collect();
            let trade_ids: Vec<&str> = chunk.iter().map(|r| r.trade_id.as_str()).collect();
            let order_ids: Vec<&str> = chunk.iter().map(|r| r.order_id.as_str()).collect();
            let sides: Vec<&str> = chunk.iter().map(|r| r.side.as_str()).collect();
            let prices: Vec<Decimal> = chunk.iter().map(|r| r.price).collect();
            let sizes: Vec<Decimal> = chunk.iter().map(|r| r.size).collect();
            let funds: Vec<Decimal> = chunk.iter().map(|r| r.funds).collect();
            let fees: Vec<Decimal> = chunk.iter().map(|r| r.fee).collect();
            let traded_ats: Vec<DateTime<Utc>> = chunk.iter().map(|r| r.traded_at).collect();

            let result = sqlx::query(
                r#"
                INSERT INTO trade_history
                    (symbol, trade_id, order_id, side, price, size, funds, fee, traded_at)
                SELECT * FROM UNNEST(
                    $1::text[], $2::text[], $3::text[], $4::text[],
                    $5::numeric[], $6::numeric[], $7::numeric[], $8::numeric[],
                    $9::timestamptz[]
                )
                ON CONFLICT (symbol, trade_id) DO NOTHING
                "#,
            )
            .bind(&symbols)
            .bind(&trade_ids)
            .bind(&order_ids)
            .bind(&sides)
            .bind(&prices)
            .bind(&sizes)
            .bind(&funds)
            .bind(&fees)
            .bind(&traded_ats)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn count_trades(&self, symbol: &Symbol) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trade_history WHERE symbol = $1")
            .bind(symbol.exchange_code())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as u64)
    }
}
