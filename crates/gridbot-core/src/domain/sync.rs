//! 거래 이력 동기화 타입.
//!
//! 체크포인트는 (사용자, 심볼) 쌍에 대해 마지막으로 동기화된 거래
//! 시각의 워터마크입니다. 단조 비감소를 보장합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::Side;
use crate::types::{Amount, Price, Quantity, Symbol};

/// (사용자, 심볼)별 동기화 체크포인트.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    /// 사용자 ID
    pub user_id: Uuid,
    /// 심볼
    pub symbol: Symbol,
    /// 설정된 동기화 시작 시각
    pub configured_start: DateTime<Utc>,
    /// 마지막으로 동기화된 시각 (단조 비감소)
    pub last_synced_at: DateTime<Utc>,
    /// 마지막 갱신 시각
    pub updated_at: DateTime<Utc>,
}

impl SyncCheckpoint {
    /// 요청된 시작 시각으로 새 체크포인트를 생성합니다.
    pub fn new(user_id: Uuid, symbol: Symbol, start: DateTime<Utc>) -> Self {
        Self {
            user_id,
            symbol,
            configured_start: start,
            last_synced_at: start,
            updated_at: Utc::now(),
        }
    }

    /// 워터마크를 전진시킵니다. 뒤로는 절대 이동하지 않습니다.
    pub fn advance_to(&mut self, when: DateTime<Utc>) {
        if when > self.last_synced_at {
            self.last_synced_at = when;
            self.updated_at = Utc::now();
        }
    }

    /// 다음 백필 윈도우의 시작 시각.
    pub fn window_start(&self) -> DateTime<Utc> {
        self.configured_start.max(self.last_synced_at)
    }
}

/// 거래소에서 백필된 체결 거래 한 건.
///
/// (symbol, trade_id)에 대한 유일성 불변식을 가집니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistoryRecord {
    /// 심볼
    pub symbol: Symbol,
    /// 거래소 체결 ID
    pub trade_id: String,
    /// 거래소 주문 ID
    pub order_id: String,
    /// 방향
    pub side: Side,
    /// 체결 가격
    pub price: Price,
    /// 체결 수량
    pub size: Quantity,
    /// 체결 금액 (호가 통화)
    pub funds: Amount,
    /// 수수료
    pub fee: Amount,
    /// 체결 시각
    pub traded_at: DateTime<Utc>,
}
