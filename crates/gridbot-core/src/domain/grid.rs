//! 그리드 엔티티 및 상태.
//!
//! 그리드는 한 심볼과 한 사용자에 묶인 트레이딩 봇 인스턴스입니다.
//! 고정된 호가 통화 예산을 가격 레벨들에 분배하여, 낮은 가격에 사고
//! 높은 가격에 파는 동작을 반복합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::step::{Step, StepKind};
use crate::error::{GridError, GridResult};
use crate::types::{Amount, Price, Symbol};

/// 엔티티 생애주기 태그.
///
/// soft-delete는 nullable 타임스탬프 대신 명시적 태그로 표현하고,
/// 저장소 경계에서 필터링합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// 활성 상태
    Active,
    /// 소프트 삭제됨
    Deleted,
}

/// 그리드 운용 모드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridMode {
    /// 실제 거래소에 주문
    Live,
    /// 모의 거래 (시뮬레이션 거래소)
    Paper,
}

impl Default for GridMode {
    fn default() -> Self {
        Self::Paper
    }
}

/// 그리드 상태.
///
/// `New → Running → {TakeProfit | StopLoss}`는 전진 단방향이며,
/// `Running ⇄ Paused`만 수동으로 되돌릴 수 있습니다.
/// `TakeProfit`/`StopLoss`는 종료 상태입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridStatus {
    /// 생성됨, 트리거 대기
    New,
    /// 가동 중
    Running,
    /// 익절로 종료됨
    TakeProfit,
    /// 손절로 종료됨
    StopLoss,
    /// 수동 일시정지
    Paused,
}

impl GridStatus {
    /// 종료 상태인지 확인합니다.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GridStatus::TakeProfit | GridStatus::StopLoss)
    }

    /// 문자열로 변환.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Running => "running",
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
            Self::Paused => "paused",
        }
    }
}

impl std::fmt::Display for GridStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 그리드 설정.
///
/// 종료 상태에 도달한 그리드의 설정은 불변입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 사다리 하한 가격
    pub lower_price: Price,
    /// 사다리 상한 가격
    pub upper_price: Price,
    /// 가동 트리거 가격
    pub trigger_price: Price,
    /// 사다리 스텝 수
    pub number_of_grids: u32,
    /// 투자 예산 (호가 통화)
    pub investment: Amount,
    /// 익절 경계 (선택)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Price>,
    /// 손절 경계 (선택)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Price>,
    /// 운용 모드
    #[serde(default)]
    pub mode: GridMode,
}

impl GridConfig {
    /// 설정을 검증합니다.
    ///
    /// # Errors
    /// - `GridError::Validation`: upper_price <= lower_price,
    ///   number_of_grids < 1, 0 이하의 가격/예산
    pub fn validate(&self) -> GridResult<()> {
        if self.upper_price <= self.lower_price {
            return Err(GridError::validation(format!(
                "upper_price {} must exceed lower_price {}",
                self.upper_price, self.lower_price
            )));
        }
        if self.number_of_grids < 1 {
            return Err(GridError::validation("number_of_grids must be at least 1"));
        }
        if self.trigger_price <= Decimal::ZERO {
            return Err(GridError::validation("trigger_price must be positive"));
        }
        if self.investment <= Decimal::ZERO {
            return Err(GridError::validation("investment must be positive"));
        }
        Ok(())
    }
}

/// 그리드 봇 인스턴스.
///
/// 스텝들의 순서 있는 컬렉션을 독점적으로 소유합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    /// 고유 ID
    pub id: Uuid,
    /// 소유 사용자
    pub owner: Uuid,
    /// 설정
    pub config: GridConfig,
    /// 현재 상태
    pub status: GridStatus,
    /// 호가 통화 잔고
    pub quote_balance: Amount,
    /// 기준 통화 잔고
    pub base_balance: Amount,
    /// 실현 수익 (호가 통화)
    pub realized_profit: Amount,
    /// 생애주기 태그
    pub lifecycle: Lifecycle,
    /// 소프트 삭제 시각
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 마지막 수정 시각
    pub updated_at: DateTime<Utc>,
    /// 소유한 스텝들
    pub steps: Vec<Step>,
}

impl Grid {
    /// 검증된 설정으로 새 그리드를 생성합니다.
    ///
    /// 초기 호가 잔고는 투자 예산 전액이며, 사다리는 별도로 구성됩니다.
    ///
    /// # Errors
    /// - `GridError::Validation`: 설정 검증 실패
    pub fn new(owner: Uuid, config: GridConfig) -> GridResult<Self> {
        config.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            owner,
            quote_balance: config.investment,
            base_balance: Decimal::ZERO,
            realized_profit: Decimal::ZERO,
            config,
            status: GridStatus::New,
            lifecycle: Lifecycle::Active,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            steps: Vec::new(),
        })
    }

    /// 종료 상태인지 확인합니다.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 활성(삭제되지 않은) 스텝 반복자.
    pub fn active_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.is_active())
    }

    /// 유형으로 활성 스텝을 찾습니다 (pegged 스텝은 유형별 최대 1개).
    pub fn find_step_by_kind(&self, kind: StepKind) -> Option<&Step> {
        self.active_steps().find(|s| s.kind == kind)
    }

    /// 유형으로 활성 스텝의 인덱스를 찾습니다.
    pub fn find_step_index_by_kind(&self, kind: StepKind) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.is_active() && s.kind == kind)
    }

    /// 그리드를 소프트 삭제합니다.
    pub fn mark_deleted(&mut self, when: DateTime<Utc>) {
        self.lifecycle = Lifecycle::Deleted;
        self.deleted_at = Some(when);
        self.updated_at = when;
    }

    /// 수정 시각을 갱신합니다.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> GridConfig {
        GridConfig {
            symbol: Symbol::new("BTC", "USDT"),
            lower_price: dec!(90),
            upper_price: dec!(110),
            trigger_price: dec!(100),
            number_of_grids: 10,
            investment: dec!(1000),
            take_profit: Some(dec!(150)),
            stop_loss: Some(dec!(50)),
            mode: GridMode::Paper,
        }
    }

    #[test]
    fn test_new_grid_starts_with_full_quote_balance() {
        let grid = Grid::new(Uuid::new_v4(), config()).unwrap();
        assert_eq!(grid.status, GridStatus::New);
        assert_eq!(grid.quote_balance, dec!(1000));
        assert_eq!(grid.base_balance, Decimal::ZERO);
        assert_eq!(grid.realized_profit, Decimal::ZERO);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let mut cfg = config();
        cfg.upper_price = dec!(80);
        assert!(matches!(
            Grid::new(Uuid::new_v4(), cfg),
            Err(GridError::Validation(_))
        ));

        let mut cfg = config();
        cfg.number_of_grids = 0;
        assert!(matches!(
            Grid::new(Uuid::new_v4(), cfg),
            Err(GridError::Validation(_))
        ));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(GridStatus::TakeProfit.is_terminal());
        assert!(GridStatus::StopLoss.is_terminal());
        assert!(!GridStatus::Running.is_terminal());
        assert!(!GridStatus::Paused.is_terminal());
    }
}
