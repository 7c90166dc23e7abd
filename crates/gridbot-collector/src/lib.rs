//! # Gridbot Collector
//!
//! 거래소 거래 이력을 체크포인트 기반으로 백필합니다. 고정 크기
//! 윈도우 단위로 가져와 저장하고, 윈도우마다 워터마크를 전진시켜
//! 재시작 시 마지막 커밋 지점부터 이어갑니다.

pub mod backfill;

pub use backfill::{BackfillReport, SyncCheckpointTracker};
