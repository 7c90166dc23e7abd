//! 그리드 트레이딩 시스템의 에러 타입.
//!
//! 에러 분류는 실패 격리 단위를 따릅니다: 검증 실패는 호출자에게 즉시
//! 반환되고, 거래소 거부와 일시적 조회 실패는 해당 그리드/심볼에만
//! 영향을 주며, 저장소 실패는 해당 그리드의 커밋만 중단시킵니다.

use thiserror::Error;

use crate::store::StoreError;

/// 핵심 그리드 에러.
#[derive(Debug, Error)]
pub enum GridError {
    /// 잘못된 설정 (예: upper_price <= lower_price)
    #[error("Validation error: {0}")]
    Validation(String),

    /// 그리드/체크포인트를 찾을 수 없음
    #[error("Not found: {0}")]
    NotFound(String),

    /// 거래소가 주문을 거부함 (잔고 부족, 필터 위반 등)
    #[error("Exchange rejection: {0}")]
    ExchangeRejection(String),

    /// 일시적 조회 실패 (가격/호가/체결 조회)
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    /// 저장소 에러
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl GridError {
    /// 잘못된 설정 에러를 생성합니다.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// 대상 부재 에러를 생성합니다.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// 그리드 작업을 위한 Result 타입.
pub type GridResult<T> = Result<T, GridError>;
