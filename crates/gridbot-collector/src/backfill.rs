//! 체크포인트 기반 거래 이력 백필.
//!
//! (사용자, 심볼)별 워터마크에서 "지금"까지를 고정 크기 윈도우로
//! 나눠 순서대로 가져옵니다. 각 윈도우는 `저장 → 워터마크 전진`
//! 순서로 커밋되므로, 중간에 중단돼도 마지막 커밋 지점부터 재개할
//! 수 있습니다. 최대 한 윈도우만 다시 가져오며, 중복 행은 저장소의
//! (symbol, trade_id) 키가 걸러냅니다.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use gridbot_core::{
    BackfillConfig, GridError, GridResult, SyncCheckpoint, SyncStore, Symbol, TradeHistoryRecord,
};
use gridbot_exchange::{Exchange, ExchangeTrade};

/// 백필 한 차례의 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    /// 가져온 윈도우 수
    pub windows_fetched: u32,
    /// 새로 저장된 거래 행 수
    pub rows_inserted: u64,
    /// 동기화가 도달한 시각
    pub synced_through: DateTime<Utc>,
}

/// 거래 이력 백필 추적기.
pub struct SyncCheckpointTracker {
    store: Arc<dyn SyncStore>,
    exchange: Arc<dyn Exchange>,
    config: BackfillConfig,
}

impl SyncCheckpointTracker {
    /// 새 추적기를 생성합니다.
    pub fn new(
        store: Arc<dyn SyncStore>,
        exchange: Arc<dyn Exchange>,
        config: BackfillConfig,
    ) -> Self {
        Self {
            store,
            exchange,
            config,
        }
    }

    /// (사용자, 심볼)의 체크포인트를 조회하거나 생성합니다.
    ///
    /// 이미 있는 체크포인트의 시작 시각을 바꿔도 전진한 워터마크는
    /// 뒤로 이동하지 않습니다.
    pub async fn get_or_create(
        &self,
        user_id: Uuid,
        symbol: &Symbol,
        requested_start: DateTime<Utc>,
    ) -> GridResult<SyncCheckpoint> {
        let checkpoint = match self.store.load_checkpoint(user_id, symbol).await? {
            Some(mut existing) => {
                existing.configured_start = requested_start;
                existing.updated_at = Utc::now();
                existing
            }
            None => SyncCheckpoint::new(user_id, symbol.clone(), requested_start),
        };
        self.store.upsert_checkpoint(&checkpoint).await?;
        Ok(checkpoint)
    }

    /// 체크포인트부터 "지금"까지 백필합니다.
    ///
    /// 체크포인트가 없으면 기본 조회 범위만큼 과거에서 시작합니다.
    ///
    /// # Errors
    /// - `GridError::TransientFetch`: 거래소 조회 실패 (커밋된
    ///   워터마크는 유지되므로 재호출로 이어갈 수 있음)
    pub async fn run_backfill(&self, user_id: Uuid, symbol: &Symbol) -> GridResult<BackfillReport> {
        let mut checkpoint = match self.store.load_checkpoint(user_id, symbol).await? {
            Some(existing) => existing,
            None => {
                let start = Utc::now() - Duration::days(self.config.default_lookback_days);
                self.get_or_create(user_id, symbol, start).await?
            }
        };

        let now = Utc::now();
        let window = Duration::days(self.config.window_days);
        let mut report = BackfillReport {
            windows_fetched: 0,
            rows_inserted: 0,
            synced_through: checkpoint.last_synced_at,
        };

        loop {
            let start = checkpoint.window_start();
            if start >= now {
                break;
            }
            let end = (start + window).min(now);

            let trades = self
                .exchange
                .trade_history(symbol, start, end)
                .await
                .map_err(|e| GridError::TransientFetch(e.to_string()))?;
            let rows: Vec<TradeHistoryRecord> = trades
                .iter()
                .map(|t| to_record(symbol, t))
                .collect();

            let inserted = self.store.insert_trades(&rows).await?;
            checkpoint.advance_to(end);
            self.store.upsert_checkpoint(&checkpoint).await?;

            debug!(
                %symbol,
                window_start = %start,
                window_end = %end,
                fetched = rows.len(),
                inserted,
                "backfill window committed"
            );
            report.windows_fetched += 1;
            report.rows_inserted += inserted;
            report.synced_through = checkpoint.last_synced_at;
        }

        info!(
            user_id = %user_id,
            %symbol,
            windows = report.windows_fetched,
            inserted = report.rows_inserted,
            synced_through = %report.synced_through,
            "backfill finished"
        );
        Ok(report)
    }
}

fn to_record(symbol: &Symbol, trade: &ExchangeTrade) -> TradeHistoryRecord {
    TradeHistoryRecord {
        symbol: symbol.clone(),
        trade_id: trade.trade_id.clone(),
        order_id: trade.order_id.clone(),
        side: trade.side,
        price: trade.price,
        size: trade.size,
        funds: trade.funds,
        fee: trade.fee,
        traded_at: trade.traded_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridbot_core::Side;
    use gridbot_data::MemoryStore;
    use gridbot_exchange::SimulatedExchange;
    use rust_decimal_macros::dec;

    fn config() -> BackfillConfig {
        BackfillConfig {
            window_days: 7,
            default_lookback_days: 90,
        }
    }

    fn trade(id: u32, traded_at: DateTime<Utc>) -> ExchangeTrade {
        ExchangeTrade {
            trade_id: format!("t-{id}"),
            order_id: format!("o-{id}"),
            side: Side::Buy,
            price: dec!(100),
            size: dec!(1),
            funds: dec!(100),
            fee: dec!(0.1),
            traded_at,
        }
    }

    fn tracker(
        store: Arc<MemoryStore>,
        exchange: Arc<SimulatedExchange>,
    ) -> SyncCheckpointTracker {
        SyncCheckpointTracker::new(store, exchange, config())
    }

    #[tokio::test]
    async fn test_twenty_day_span_takes_three_windows() {
        let store = Arc::new(MemoryStore::new());
        let exchange = Arc::new(SimulatedExchange::new());
        let symbol = Symbol::new("BTC", "USDT");
        let user = Uuid::new_v4();

        let start = Utc::now() - Duration::days(20);
        // 하루 한 건씩 20건
        let trades: Vec<ExchangeTrade> = (0..20)
            .map(|i| trade(i, start + Duration::days(i as i64) + Duration::hours(1)))
            .collect();
        exchange.seed_trades(symbol.clone(), trades).await;

        let tracker = tracker(store.clone(), exchange.clone());
        tracker.get_or_create(user, &symbol, start).await.unwrap();
        let report = tracker.run_backfill(user, &symbol).await.unwrap();

        // 7 + 7 + 6일(now로 클램프)
        assert_eq!(report.windows_fetched, 3);
        assert_eq!(exchange.history_fetch_count().await, 3);
        assert_eq!(report.rows_inserted, 20);
        assert_eq!(store.count_trades(&symbol).await.unwrap(), 20);

        // 워터마크가 "지금"까지 도달
        let checkpoint = store.load_checkpoint(user, &symbol).await.unwrap().unwrap();
        assert!(checkpoint.last_synced_at >= start + Duration::days(20));
    }

    #[tokio::test]
    async fn test_rerun_after_catchup_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let exchange = Arc::new(SimulatedExchange::new());
        let symbol = Symbol::new("BTC", "USDT");
        let user = Uuid::new_v4();

        let tracker = tracker(store.clone(), exchange.clone());
        tracker
            .get_or_create(user, &symbol, Utc::now() - Duration::days(10))
            .await
            .unwrap();
        tracker.run_backfill(user, &symbol).await.unwrap();

        let fetches = exchange.history_fetch_count().await;
        let report = tracker.run_backfill(user, &symbol).await.unwrap();
        assert_eq!(report.windows_fetched, 0);
        assert_eq!(exchange.history_fetch_count().await, fetches);
    }

    #[tokio::test]
    async fn test_crash_mid_backfill_resumes_without_duplicates() {
        let store = Arc::new(MemoryStore::new());
        let exchange = Arc::new(SimulatedExchange::new());
        let symbol = Symbol::new("BTC", "USDT");
        let user = Uuid::new_v4();

        let start = Utc::now() - Duration::days(20);
        let trades: Vec<ExchangeTrade> = (0..20)
            .map(|i| trade(i, start + Duration::days(i as i64) + Duration::hours(1)))
            .collect();
        exchange.seed_trades(symbol.clone(), trades).await;

        let tracker = tracker(store.clone(), exchange.clone());
        tracker.get_or_create(user, &symbol, start).await.unwrap();

        // 첫 윈도우 저장이 실패 → 워터마크는 전진하지 않음
        store.fail_next_trade_insert().await;
        assert!(tracker.run_backfill(user, &symbol).await.is_err());
        let checkpoint = store.load_checkpoint(user, &symbol).await.unwrap().unwrap();
        assert_eq!(checkpoint.last_synced_at, start);

        // 재시작: 실패한 윈도우부터 다시 가져오고, 중복 없이 완주
        let report = tracker.run_backfill(user, &symbol).await.unwrap();
        assert_eq!(report.windows_fetched, 3);
        assert_eq!(store.count_trades(&symbol).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_crash_after_insert_refetches_one_window_without_duplicates() {
        let store = Arc::new(MemoryStore::new());
        let exchange = Arc::new(SimulatedExchange::new());
        let symbol = Symbol::new("BTC", "USDT");
        let user = Uuid::new_v4();

        let start = Utc::now() - Duration::days(20);
        let trades: Vec<ExchangeTrade> = (0..20)
            .map(|i| trade(i, start + Duration::days(i as i64) + Duration::hours(1)))
            .collect();
        exchange.seed_trades(symbol.clone(), trades).await;

        let tracker = tracker(store.clone(), exchange.clone());
        tracker.get_or_create(user, &symbol, start).await.unwrap();

        // 첫 윈도우의 행은 저장됐지만 워터마크 전진이 실패
        store.fail_next_checkpoint_upsert().await;
        assert!(tracker.run_backfill(user, &symbol).await.is_err());
        assert_eq!(store.count_trades(&symbol).await.unwrap(), 7);
        let checkpoint = store.load_checkpoint(user, &symbol).await.unwrap().unwrap();
        assert_eq!(checkpoint.last_synced_at, start);

        // 재시작: 첫 윈도우만 다시 가져오고, 그 행들은 키 중복으로 걸러짐
        let report = tracker.run_backfill(user, &symbol).await.unwrap();
        assert_eq!(report.windows_fetched, 3);
        assert_eq!(report.rows_inserted, 13);
        assert_eq!(exchange.history_fetch_count().await, 4);
        assert_eq!(store.count_trades(&symbol).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_changing_start_never_moves_watermark_backward() {
        let store = Arc::new(MemoryStore::new());
        let exchange = Arc::new(SimulatedExchange::new());
        let symbol = Symbol::new("BTC", "USDT");
        let user = Uuid::new_v4();

        let tracker = tracker(store.clone(), exchange.clone());
        tracker
            .get_or_create(user, &symbol, Utc::now() - Duration::days(10))
            .await
            .unwrap();
        tracker.run_backfill(user, &symbol).await.unwrap();
        let synced = store
            .load_checkpoint(user, &symbol)
            .await
            .unwrap()
            .unwrap()
            .last_synced_at;

        // 더 이른 시작 시각으로 재설정해도 워터마크는 유지
        let checkpoint = tracker
            .get_or_create(user, &symbol, Utc::now() - Duration::days(60))
            .await
            .unwrap();
        assert_eq!(checkpoint.last_synced_at, synced);
        // 다음 윈도우는 워터마크에서 시작
        assert_eq!(checkpoint.window_start(), synced);
    }

    #[tokio::test]
    async fn test_missing_checkpoint_uses_default_lookback() {
        let store = Arc::new(MemoryStore::new());
        let exchange = Arc::new(SimulatedExchange::new());
        let symbol = Symbol::new("BTC", "USDT");
        let user = Uuid::new_v4();

        let tracker = tracker(store.clone(), exchange.clone());
        let report = tracker.run_backfill(user, &symbol).await.unwrap();

        // 90일 / 7일 = 13개 윈도우
        assert_eq!(report.windows_fetched, 13);
        let checkpoint = store.load_checkpoint(user, &symbol).await.unwrap().unwrap();
        assert!(checkpoint.configured_start <= Utc::now() - Duration::days(89));
    }
}
