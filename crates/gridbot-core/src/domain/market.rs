//! 시장 데이터 타입.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Price, Symbol};

/// 한 심볼의 최우선 호가 (top-of-book).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopOfBook {
    /// 심볼
    pub symbol: Symbol,
    /// 최우선 매수 호가
    pub bid: Price,
    /// 최우선 매도 호가
    pub ask: Price,
    /// 최근 체결 가격
    pub last: Price,
    /// 조회 시각
    pub fetched_at: DateTime<Utc>,
}

impl TopOfBook {
    /// 중간 가격 반환.
    pub fn mid(&self) -> Price {
        (self.bid + self.ask) / Price::TWO
    }
}
