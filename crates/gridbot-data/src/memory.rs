//! 테스트용 인메모리 저장소.
//!
//! Postgres 구현과 같은 trait 계약을 따르며, 실패 주입으로 부분 커밋
//! 방지와 재시작 복구 경로를 테스트할 수 있습니다. 저장은 전체
//! 애그리거트 교체이므로 자연히 원자적입니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use gridbot_core::{
    Grid, GridStore, Lifecycle, StoreError, StoreResult, SyncCheckpoint, SyncStore, Symbol,
    TradeHistoryRecord,
};

#[derive(Default)]
struct Inner {
    grids: HashMap<Uuid, Grid>,
    checkpoints: HashMap<(Uuid, Symbol), SyncCheckpoint>,
    trades: HashMap<(Symbol, String), TradeHistoryRecord>,
    fail_next_save: bool,
    fail_next_trade_insert: bool,
    fail_next_checkpoint_upsert: bool,
}

/// 인메모리 저장소.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// 새 인메모리 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 다음 `save_grid` 호출이 실패하도록 설정합니다.
    pub async fn fail_next_save(&self) {
        self.inner.lock().await.fail_next_save = true;
    }

    /// 다음 `insert_trades` 호출이 실패하도록 설정합니다.
    ///
    /// 백필 도중 크래시를 흉내 내는 데 씁니다.
    pub async fn fail_next_trade_insert(&self) {
        self.inner.lock().await.fail_next_trade_insert = true;
    }

    /// 다음 `upsert_checkpoint` 호출이 실패하도록 설정합니다.
    ///
    /// 행은 저장됐지만 워터마크 전진이 커밋되지 못한 크래시를
    /// 흉내 내는 데 씁니다.
    pub async fn fail_next_checkpoint_upsert(&self) {
        self.inner.lock().await.fail_next_checkpoint_upsert = true;
    }

    /// 소프트 삭제된 것을 포함해 저장된 그리드 수를 반환합니다.
    pub async fn grid_count(&self) -> usize {
        self.inner.lock().await.grids.len()
    }
}

#[async_trait]
impl GridStore for MemoryStore {
    async fn insert_grid(&self, grid: &Grid) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.grids.contains_key(&grid.id) {
            return Err(StoreError::Conflict(format!(
                "grid {} already exists",
                grid.id
            )));
        }
        inner.grids.insert(grid.id, grid.clone());
        Ok(())
    }

    async fn load_grid(&self, id: Uuid) -> StoreResult<Option<Grid>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .grids
            .get(&id)
            .filter(|g| g.lifecycle == Lifecycle::Active)
            .cloned())
    }

    async fn load_active_grids(&self) -> StoreResult<Vec<Grid>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .grids
            .values()
            .filter(|g| g.lifecycle == Lifecycle::Active)
            .cloned()
            .collect())
    }

    async fn save_grid(&self, grid: &Grid) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.fail_next_save {
            inner.fail_next_save = false;
            return Err(StoreError::Database("injected save failure".to_string()));
        }
        if !inner.grids.contains_key(&grid.id) {
            return Err(StoreError::Conflict(format!("grid {} not inserted", grid.id)));
        }
        inner.grids.insert(grid.id, grid.clone());
        Ok(())
    }

    async fn mark_grid_deleted(&self, id: Uuid, when: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        match inner.grids.get_mut(&id) {
            Some(grid) => {
                grid.mark_deleted(when);
                Ok(())
            }
            None => Err(StoreError::Conflict(format!("grid {id} not found"))),
        }
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn load_checkpoint(
        &self,
        user_id: Uuid,
        symbol: &Symbol,
    ) -> StoreResult<Option<SyncCheckpoint>> {
        let inner = self.inner.lock().await;
        Ok(inner.checkpoints.get(&(user_id, symbol.clone())).cloned())
    }

    async fn upsert_checkpoint(&self, checkpoint: &SyncCheckpoint) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.fail_next_checkpoint_upsert {
            inner.fail_next_checkpoint_upsert = false;
            return Err(StoreError::Database("injected upsert failure".to_string()));
        }
        inner.checkpoints.insert(
            (checkpoint.user_id, checkpoint.symbol.clone()),
            checkpoint.clone(),
        );
        Ok(())
    }

    async fn insert_trades(&self, rows: &[TradeHistoryRecord]) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        if inner.fail_next_trade_insert {
            inner.fail_next_trade_insert = false;
            return Err(StoreError::Database("injected insert failure".to_string()));
        }
        let mut inserted = 0;
        for row in rows {
            let key = (row.symbol.clone(), row.trade_id.clone());
            if inner.trades.contains_key(&key) {
                continue;
            }
            inner.trades.insert(key, row.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn count_trades(&self, symbol: &Symbol) -> StoreResult<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.trades.keys().filter(|(s, _)| s == symbol).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridbot_core::{GridConfig, GridMode, Side};
    use rust_decimal_macros::dec;

    fn grid() -> Grid {
        Grid::new(
            Uuid::new_v4(),
            GridConfig {
                symbol: Symbol::new("BTC", "USDT"),
                lower_price: dec!(90),
                upper_price: dec!(110),
                trigger_price: dec!(100),
                number_of_grids: 5,
                investment: dec!(1000),
                take_profit: None,
                stop_loss: None,
                mode: GridMode::Paper,
            },
        )
        .unwrap()
    }

    fn trade(trade_id: &str) -> TradeHistoryRecord {
        TradeHistoryRecord {
            symbol: Symbol::new("BTC", "USDT"),
            trade_id: trade_id.to_string(),
            order_id: "o-1".to_string(),
            side: Side::Buy,
            price: dec!(100),
            size: dec!(1),
            funds: dec!(100),
            fee: dec!(0.1),
            traded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_deleted_grid_is_invisible() {
        let store = MemoryStore::new();
        let grid = grid();
        store.insert_grid(&grid).await.unwrap();

        assert!(store.load_grid(grid.id).await.unwrap().is_some());
        store.mark_grid_deleted(grid.id, Utc::now()).await.unwrap();

        assert!(store.load_grid(grid.id).await.unwrap().is_none());
        assert!(store.load_active_grids().await.unwrap().is_empty());
        // 행 자체는 남아 있음 (soft delete)
        assert_eq!(store.grid_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_trade_insert_is_noop() {
        let store = MemoryStore::new();
        let symbol = Symbol::new("BTC", "USDT");

        let inserted = store
            .insert_trades(&[trade("t-1"), trade("t-2")])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let inserted = store
            .insert_trades(&[trade("t-2"), trade("t-3")])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.count_trades(&symbol).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_injected_save_failure_is_one_shot() {
        let store = MemoryStore::new();
        let grid = grid();
        store.insert_grid(&grid).await.unwrap();

        store.fail_next_save().await;
        assert!(store.save_grid(&grid).await.is_err());
        assert!(store.save_grid(&grid).await.is_ok());
    }
}
