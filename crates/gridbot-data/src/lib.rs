//! # Gridbot Data
//!
//! 저장소 구현 크레이트입니다:
//! - `postgres`: sqlx 기반 Postgres 저장소 (운영용)
//! - `memory`: 인메모리 저장소 (테스트용, 실패 주입 지원)
//!
//! 두 구현 모두 `gridbot-core`의 `GridStore`/`SyncStore` trait을
//! 구현합니다. 그리드 애그리거트 저장은 항상 단일 트랜잭션입니다.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{connect_pool, run_migrations, PgGridStore, PgSyncStore};
