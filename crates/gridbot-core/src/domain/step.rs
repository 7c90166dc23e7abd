//! 그리드 스텝 및 체결 기록.
//!
//! 스텝은 가격 사다리의 한 칸으로, 매수/매도 가격 쌍과 수량을 가집니다.
//! 스텝은 한 번에 최대 하나의 미체결 주문만 보유하며, 체결 기록은
//! append-only입니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::grid::Lifecycle;
use crate::domain::order::Side;
use crate::types::{Amount, Price, Quantity};

/// 스텝 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// 트리거 가격에 고정된 초기 진입 스텝
    Initial,
    /// 사다리의 일반 스텝
    Normal,
    /// 익절 경계에 고정된 스텝
    TakeProfit,
    /// 손절 경계에 고정된 스텝
    StopLoss,
}

impl StepKind {
    /// 매수가와 매도가가 같은 고정(pegged) 스텝인지 확인합니다.
    pub fn is_pegged(&self) -> bool {
        !matches!(self, StepKind::Normal)
    }

    /// 문자열로 변환.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Normal => "normal",
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
        }
    }
}

/// 스텝 상태.
///
/// 스텝 사이클: `AwaitingBuy → BuyOrderPlaced → AwaitingSell →
/// SellOrderPlaced → AwaitingBuy` (레벨은 무기한 재사용됩니다).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// 매수 주문 배치 대기
    AwaitingBuy,
    /// 매수 주문이 거래소에 배치됨
    BuyOrderPlaced,
    /// 매도 주문 배치 대기
    AwaitingSell,
    /// 매도 주문이 거래소에 배치됨
    SellOrderPlaced,
}

impl StepStatus {
    /// 미체결 주문을 보유한 상태인지 확인합니다.
    pub fn has_open_order(&self) -> bool {
        matches!(self, StepStatus::BuyOrderPlaced | StepStatus::SellOrderPlaced)
    }

    /// 미체결 주문의 방향을 반환합니다.
    pub fn open_side(&self) -> Option<Side> {
        match self {
            StepStatus::BuyOrderPlaced => Some(Side::Buy),
            StepStatus::SellOrderPlaced => Some(Side::Sell),
            _ => None,
        }
    }

    /// 주문 배치 전 상태로 되돌립니다.
    pub fn to_awaiting(&self) -> Self {
        match self {
            StepStatus::BuyOrderPlaced => StepStatus::AwaitingBuy,
            StepStatus::SellOrderPlaced => StepStatus::AwaitingSell,
            other => *other,
        }
    }

    /// 문자열로 변환.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingBuy => "awaiting_buy",
            Self::BuyOrderPlaced => "buy_order_placed",
            Self::AwaitingSell => "awaiting_sell",
            Self::SellOrderPlaced => "sell_order_placed",
        }
    }
}

/// 거래소가 보고한 체결의 도메인 기록.
///
/// 한 번 기록되면 불변이며, `exchange_fill_id` 기준으로 유일합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    /// 고유 ID
    pub id: Uuid,
    /// 소속 스텝
    pub step_id: Uuid,
    /// 거래소 주문 ID
    pub exchange_order_id: String,
    /// 거래소 체결 ID (멱등성 키)
    pub exchange_fill_id: String,
    /// 체결 방향
    pub side: Side,
    /// 체결 가격
    pub price: Price,
    /// 체결 수량
    pub qty: Quantity,
    /// 수수료
    pub fee: Amount,
    /// 수수료 통화
    pub fee_currency: String,
    /// 체결 시각
    pub filled_at: DateTime<Utc>,
}

impl OrderFill {
    /// 체결 명목 금액 (가격 × 수량).
    pub fn notional(&self) -> Amount {
        self.price * self.qty
    }
}

/// 가격 사다리의 한 칸.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// 고유 ID
    pub id: Uuid,
    /// 소속 그리드
    pub grid_id: Uuid,
    /// 매수 가격
    pub buy_price: Price,
    /// 매도 가격
    pub sell_price: Price,
    /// 거래 수량
    pub qty: Quantity,
    /// 스텝 유형
    pub kind: StepKind,
    /// 현재 상태
    pub status: StepStatus,
    /// 미체결 주문의 거래소 주문 ID
    pub exchange_order_id: Option<String>,
    /// 생애주기 태그
    pub lifecycle: Lifecycle,
    /// 체결 이력 (append-only)
    pub fills: Vec<OrderFill>,
}

impl Step {
    /// 일반 사다리 스텝을 생성합니다.
    pub fn new_normal(grid_id: Uuid, buy_price: Price, sell_price: Price, qty: Quantity) -> Self {
        Self {
            id: Uuid::new_v4(),
            grid_id,
            buy_price,
            sell_price,
            qty,
            kind: StepKind::Normal,
            status: StepStatus::AwaitingBuy,
            exchange_order_id: None,
            lifecycle: Lifecycle::Active,
            fills: Vec::new(),
        }
    }

    /// 단일 가격에 고정된 스텝을 생성합니다 (Initial/TakeProfit/StopLoss).
    pub fn new_pegged(
        grid_id: Uuid,
        kind: StepKind,
        price: Price,
        qty: Quantity,
        status: StepStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            grid_id,
            buy_price: price,
            sell_price: price,
            qty,
            kind,
            status,
            exchange_order_id: None,
            lifecycle: Lifecycle::Active,
            fills: Vec::new(),
        }
    }

    /// 활성 스텝인지 확인합니다.
    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    /// 미체결 주문을 보유 중인지 확인합니다.
    pub fn has_open_order(&self) -> bool {
        self.exchange_order_id.is_some() && self.status.has_open_order()
    }

    /// 체결을 기록합니다.
    ///
    /// 같은 `exchange_fill_id`는 최대 한 번만 적용됩니다.
    ///
    /// # Returns
    /// 새 체결이 추가되면 `true`, 이미 기록된 체결이면 `false`.
    pub fn record_fill(&mut self, fill: OrderFill) -> bool {
        if self
            .fills
            .iter()
            .any(|f| f.exchange_fill_id == fill.exchange_fill_id)
        {
            return false;
        }
        self.fills.push(fill);
        true
    }

    /// 미체결 주문 참조를 해제하고 배치 전 상태로 되돌립니다.
    ///
    /// 종료 상태 진입 시 주문 취소 후 호출됩니다.
    pub fn release_open_order(&mut self) {
        self.exchange_order_id = None;
        self.status = self.status.to_awaiting();
    }
}
