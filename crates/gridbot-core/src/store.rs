//! 저장소 추상화.
//!
//! 그리드/스텝/체결과 체크포인트/거래 이력에 대한 저장소 중립
//! 인터페이스입니다. Postgres 구현과 테스트용 인메모리 구현은
//! `gridbot-data` 크레이트에 있습니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Grid, SyncCheckpoint, TradeHistoryRecord};
use crate::types::Symbol;

/// 저장소 에러.
#[derive(Debug, Error)]
pub enum StoreError {
    /// 데이터베이스 에러
    #[error("Database error: {0}")]
    Database(String),

    /// 직렬화/역직렬화 에러
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 제약 조건 위반
    #[error("Constraint violation: {0}")]
    Conflict(String),
}

/// 저장소 작업을 위한 Result 타입.
pub type StoreResult<T> = Result<T, StoreError>;

/// 그리드 애그리거트 저장소.
///
/// `save_grid`는 그리드/스텝/체결을 단일 트랜잭션으로 커밋해야 합니다.
/// 한 틱 내 한 그리드의 변경은 원자적이어야 하며, 부분 실패로 일부
/// 스텝만 전진한 상태가 남으면 안 됩니다.
#[async_trait]
pub trait GridStore: Send + Sync {
    /// 새 그리드 애그리거트를 삽입합니다.
    async fn insert_grid(&self, grid: &Grid) -> StoreResult<()>;

    /// ID로 그리드를 조회합니다. 소프트 삭제된 그리드는 제외됩니다.
    async fn load_grid(&self, id: Uuid) -> StoreResult<Option<Grid>>;

    /// 모든 활성 그리드를 조회합니다 (틱 대상).
    async fn load_active_grids(&self) -> StoreResult<Vec<Grid>>;

    /// 그리드 애그리거트 전체를 단일 트랜잭션으로 저장합니다.
    async fn save_grid(&self, grid: &Grid) -> StoreResult<()>;

    /// 그리드를 소프트 삭제 상태로 표시합니다.
    async fn mark_grid_deleted(&self, id: Uuid, when: DateTime<Utc>) -> StoreResult<()>;
}

/// 동기화 체크포인트/거래 이력 저장소.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// (사용자, 심볼)의 체크포인트를 조회합니다.
    async fn load_checkpoint(
        &self,
        user_id: Uuid,
        symbol: &Symbol,
    ) -> StoreResult<Option<SyncCheckpoint>>;

    /// 체크포인트를 생성하거나 갱신합니다.
    async fn upsert_checkpoint(&self, checkpoint: &SyncCheckpoint) -> StoreResult<()>;

    /// 거래 이력 행들을 삽입합니다.
    ///
    /// (symbol, trade_id) 중복 삽입은 no-op입니다.
    ///
    /// # Returns
    /// 실제로 삽입된 행 수.
    async fn insert_trades(&self, rows: &[TradeHistoryRecord]) -> StoreResult<u64>;

    /// 심볼의 저장된 거래 수를 반환합니다.
    async fn count_trades(&self, symbol: &Symbol) -> StoreResult<u64>;
}
