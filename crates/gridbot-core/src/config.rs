//! 설정 관리.
//!
//! 애플리케이션 설정을 정의하고 TOML 파일과 환경 변수에서 로드합니다.
//! 예약 비율, 백필 윈도우, 차익거래 임계값 같은 운용 상수는 전부
//! 이름 있는 설정 값입니다.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GridError, GridResult};
use crate::types::Symbol;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 데이터베이스 설정
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 거래소 설정
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// 사다리 구성 설정
    #[serde(default)]
    pub ladder: LadderConfig,
    /// 거래 이력 백필 설정
    #[serde(default)]
    pub backfill: BackfillConfig,
    /// 차익거래 스캐너 설정
    #[serde(default)]
    pub arbitrage: ArbitrageConfig,
    /// 알림 설정
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl AppConfig {
    /// TOML 파일과 `GRIDBOT_` 접두사 환경 변수에서 설정을 로드합니다.
    ///
    /// 환경 변수가 파일 값을 덮어씁니다 (예:
    /// `GRIDBOT_DATABASE__MAX_CONNECTIONS=20`).
    ///
    /// # Errors
    /// - `GridError::Validation`: 파일 파싱 또는 역직렬화 실패
    pub fn load(path: impl AsRef<Path>) -> GridResult<Self> {
        // .env 파일이 있으면 먼저 로드
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("GRIDBOT")
                    .separator("__")
                    .try_parsing(true),
            );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| GridError::validation(format!("config load failed: {e}")))
    }
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// 연결 URL (`DATABASE_URL` 환경 변수로도 설정 가능)
    pub url: String,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL").unwrap_or_default(),
            max_connections: 10,
            connection_timeout_secs: 30,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 거래소 연결 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExchangeConfig {
    /// REST API 기본 URL
    #[serde(default = "default_exchange_base_url")]
    pub base_url: String,
    /// API 키
    #[serde(default)]
    pub api_key: String,
    /// API 시크릿
    #[serde(default)]
    pub api_secret: String,
    /// API 패스프레이즈
    #[serde(default)]
    pub api_passphrase: String,
}

fn default_exchange_base_url() -> String {
    "https://api.kucoin.com".to_string()
}

/// 사다리 구성 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LadderConfig {
    /// 초기 스텝용으로 예약하는 투자 비율 (0.25 = 25%)
    pub reserved_fraction: Decimal,
    /// 수량 최소 증분 (내림 기준)
    pub qty_increment: Decimal,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            reserved_fraction: dec!(0.25),
            qty_increment: dec!(0.000001),
        }
    }
}

/// 거래 이력 백필 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackfillConfig {
    /// 백필 윈도우 크기 (일)
    pub window_days: i64,
    /// 체크포인트가 없을 때의 기본 조회 범위 (일)
    pub default_lookback_days: i64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            default_lookback_days: 90,
        }
    }
}

/// 차익거래 스캐너 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArbitrageConfig {
    /// 기준 통화 (사이클의 시작과 끝)
    pub base_currency: String,
    /// 브리지 통화 (중간 다리)
    pub bridge_currency: String,
    /// 평가에 사용할 고정 명목 금액 (기준 통화)
    pub notional: Decimal,
    /// 알림을 발송하는 수익 임계값 (기준 통화)
    pub profit_threshold: Decimal,
    /// 평가 대상 토큰 목록
    pub tokens: Vec<String>,
}

impl ArbitrageConfig {
    /// 토큰에 대한 세 마켓 심볼을 반환합니다:
    /// (메인/기준, 메인/브리지, 브리지/기준).
    pub fn route_symbols(&self, token: &str) -> (Symbol, Symbol, Symbol) {
        (
            Symbol::new(token, &self.base_currency),
            Symbol::new(token, &self.bridge_currency),
            Symbol::new(&self.bridge_currency, &self.base_currency),
        )
    }
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            base_currency: "USDT".to_string(),
            bridge_currency: "BTC".to_string(),
            notional: dec!(100),
            profit_threshold: dec!(0.5),
            tokens: Vec::new(),
        }
    }
}

/// 알림 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// 알림 발송 활성화 여부
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.ladder.reserved_fraction, dec!(0.25));
        assert_eq!(cfg.backfill.window_days, 7);
        assert_eq!(cfg.arbitrage.notional, dec!(100));
    }

    #[test]
    fn test_route_symbols() {
        let cfg = ArbitrageConfig::default();
        let (main_base, main_bridge, bridge_base) = cfg.route_symbols("ETH");
        assert_eq!(main_base.to_string(), "ETH-USDT");
        assert_eq!(main_bridge.to_string(), "ETH-BTC");
        assert_eq!(bridge_base.to_string(), "BTC-USDT");
    }
}
