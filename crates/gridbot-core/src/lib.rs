//! # Gridbot Core
//!
//! 스팟 그리드 트레이딩 봇의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 시스템 전반에서 사용되는 기본 타입을 제공합니다:
//! - 그리드/스텝 도메인 엔티티 및 상태 열거형
//! - 체결 기록 및 거래 이력 타입
//! - 동기화 체크포인트
//! - 심볼 및 정밀 소수점 타입
//! - 저장소 추상화 (trait)
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use store::*;
pub use types::*;
