//! # Gridbot Engine
//!
//! 그리드 봇의 핵심 로직을 제공합니다:
//! - `ladder`: 설정으로부터 가격 사다리를 순수하게 구성/갱신
//! - `state`: 실시간 가격이 구동하는 그리드 상태 전이
//! - `reconciler`: 거래소에 대한 스텝별 주문 생명주기와 체결 반영
//! - `service`: 생성/수정/삭제/틱을 묶는 오케스트레이션 서비스
//!
//! 사다리 구성과 상태 평가는 순수 연산이며 안전하게 재실행할 수
//! 있습니다. 거래소 상태를 변경하는 것은 주문 배치와 취소뿐입니다.
//! 같은 그리드에 대한 틱 중첩 방지는 호출자의 책임입니다.

pub mod ladder;
pub mod reconciler;
pub mod service;
pub mod state;

pub use ladder::{
    build_normal_steps, build_or_update_exit_step, build_or_update_initial_step, ExitKind,
    StepUpdate,
};
pub use reconciler::StepReconciler;
pub use service::{GridService, TickReport};
