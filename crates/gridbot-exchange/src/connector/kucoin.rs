//! KuCoin 거래소 커넥터.
//!
//! KuCoin 현물용 REST API 구현. 서명이 필요한 엔드포인트는
//! KC-API v2 서명 방식(HMAC-SHA256 + base64)을 사용합니다.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use gridbot_core::{ExchangeConfig, LimitOrderRequest, Side, Symbol, TopOfBook};

use crate::traits::{Exchange, ExchangeFill, ExchangeResult, ExchangeTrade};
use crate::ExchangeError;

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// 설정
// ============================================================================

/// KuCoin 클라이언트 설정.
///
/// # 보안
/// - `Debug` 구현은 민감 정보(`api_key`, `api_secret`, `api_passphrase`)를
///   마스킹합니다.
#[derive(Clone)]
pub struct KucoinConfig {
    /// REST API 기본 URL
    pub base_url: String,
    /// API 키
    pub api_key: String,
    /// API 시크릿
    pub api_secret: String,
    /// API 패스프레이즈
    pub api_passphrase: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl fmt::Debug for KucoinConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KucoinConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"***REDACTED***")
            .field("api_secret", &"***REDACTED***")
            .field("api_passphrase", &"***REDACTED***")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl KucoinConfig {
    /// 새 설정 생성.
    pub fn new(api_key: String, api_secret: String, api_passphrase: String) -> Self {
        Self {
            base_url: "https://api.kucoin.com".to_string(),
            api_key,
            api_secret,
            api_passphrase,
            timeout_secs: 30,
        }
    }

    /// 환경 변수에서 생성.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            base_url: std::env::var("KUCOIN_BASE_URL")
                .unwrap_or_else(|_| "https://api.kucoin.com".to_string()),
            api_key: std::env::var("KUCOIN_API_KEY").ok()?,
            api_secret: std::env::var("KUCOIN_API_SECRET").ok()?,
            api_passphrase: std::env::var("KUCOIN_API_PASSPHRASE").ok()?,
            timeout_secs: 30,
        })
    }
}

impl From<ExchangeConfig> for KucoinConfig {
    fn from(cfg: ExchangeConfig) -> Self {
        Self {
            base_url: cfg.base_url,
            api_key: cfg.api_key,
            api_secret: cfg.api_secret,
            api_passphrase: cfg.api_passphrase,
            timeout_secs: 30,
        }
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

/// 공통 응답 봉투.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Level1Response {
    price: Option<String>,
    best_bid: Option<String>,
    best_ask: Option<String>,
    time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderResponse {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct FillsPage {
    items: Vec<FillItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillItem {
    trade_id: String,
    order_id: String,
    side: String,
    price: String,
    size: String,
    funds: String,
    fee: String,
    fee_currency: String,
    created_at: i64,
}

// ============================================================================
// 클라이언트
// ============================================================================

/// KuCoin REST 클라이언트.
pub struct KucoinClient {
    config: KucoinConfig,
    client: Client,
}

impl KucoinClient {
    /// 새 클라이언트를 생성합니다.
    pub fn new(config: KucoinConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// 요청 서명을 생성합니다 (KC-API v2).
    ///
    /// 서명 대상 문자열은 `timestamp + method + endpoint + body`입니다.
    fn sign(&self, payload: &str) -> ExchangeResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Unauthorized(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// 서명 헤더를 붙여 요청을 전송하고 응답 봉투를 풉니다.
    async fn send_signed<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> ExchangeResult<T> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let body_str = body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_default();
        let signature = self.sign(&format!("{timestamp}{method}{endpoint}{body_str}"))?;
        let passphrase = self.sign(&self.config.api_passphrase)?;

        let url = format!("{}{}", self.config.base_url, endpoint);
        let mut request = self
            .client
            .request(method, &url)
            .header("KC-API-KEY", &self.config.api_key)
            .header("KC-API-SIGN", signature)
            .header("KC-API-TIMESTAMP", timestamp)
            .header("KC-API-PASSPHRASE", passphrase)
            .header("KC-API-KEY-VERSION", "2");

        if let Some(b) = body {
            request = request.json(&b);
        }

        let response = request.send().await?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ExchangeError::Parse(e.to_string()))?;
        Self::unwrap_envelope(envelope)
    }

    /// 공개 엔드포인트 GET.
    async fn get_public<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let response = self.client.get(&url).send().await?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ExchangeError::Parse(e.to_string()))?;
        Self::unwrap_envelope(envelope)
    }

    fn unwrap_envelope<T>(envelope: Envelope<T>) -> ExchangeResult<T> {
        if envelope.code == "200000" {
            envelope
                .data
                .ok_or_else(|| ExchangeError::Parse("missing data field".to_string()))
        } else {
            let message = envelope.msg.unwrap_or_default();
            Err(match envelope.code.as_str() {
                "200004" => ExchangeError::InsufficientBalance(message),
                "400100" | "300000" => ExchangeError::OrderRejected(message),
                "429000" => ExchangeError::RateLimited,
                "400003" | "400004" | "400005" | "400006" | "400007" => {
                    ExchangeError::Unauthorized(message)
                }
                "404000" => ExchangeError::OrderNotFound(message),
                _ => ExchangeError::Api {
                    code: envelope.code,
                    message,
                },
            })
        }
    }
}

fn parse_decimal(s: &str) -> ExchangeResult<Decimal> {
    s.parse()
        .map_err(|_| ExchangeError::Parse(format!("invalid decimal: {s}")))
}

fn parse_side(s: &str) -> ExchangeResult<Side> {
    match s {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(ExchangeError::Parse(format!("invalid side: {other}"))),
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn fill_from_item(item: FillItem) -> ExchangeResult<ExchangeFill> {
    Ok(ExchangeFill {
        fill_id: item.trade_id.clone(),
        order_id: item.order_id.clone(),
        side: parse_side(&item.side)?,
        price: parse_decimal(&item.price)?,
        qty: parse_decimal(&item.size)?,
        fee: parse_decimal(&item.fee)?,
        fee_currency: item.fee_currency.clone(),
        filled_at: millis_to_datetime(item.created_at),
    })
}

fn trade_from_item(item: FillItem) -> ExchangeResult<ExchangeTrade> {
    Ok(ExchangeTrade {
        trade_id: item.trade_id.clone(),
        order_id: item.order_id.clone(),
        side: parse_side(&item.side)?,
        price: parse_decimal(&item.price)?,
        size: parse_decimal(&item.size)?,
        funds: parse_decimal(&item.funds)?,
        fee: parse_decimal(&item.fee)?,
        traded_at: millis_to_datetime(item.created_at),
    })
}

#[async_trait]
impl Exchange for KucoinClient {
    fn name(&self) -> &str {
        "kucoin"
    }

    async fn top_of_book(&self, symbols: &[Symbol]) -> ExchangeResult<Vec<TopOfBook>> {
        let mut quotes = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            let endpoint = format!(
                "/api/v1/market/orderbook/level1?symbol={}",
                symbol.exchange_code()
            );
            // 심볼 하나의 조회 실패가 나머지를 막지 않는다
            match self.get_public::<Level1Response>(&endpoint).await {
                Ok(level1) => {
                    let (Some(price), Some(bid), Some(ask)) =
                        (&level1.price, &level1.best_bid, &level1.best_ask)
                    else {
                        warn!(%symbol, "level1 response missing prices, skipping");
                        continue;
                    };
                    quotes.push(TopOfBook {
                        symbol: symbol.clone(),
                        bid: parse_decimal(bid)?,
                        ask: parse_decimal(ask)?,
                        last: parse_decimal(price)?,
                        fetched_at: level1
                            .time
                            .map(millis_to_datetime)
                            .unwrap_or_else(Utc::now),
                    });
                }
                Err(e) if e.is_retryable() => {
                    warn!(%symbol, error = %e, "quote fetch failed, skipping symbol");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(quotes)
    }

    async fn place_limit_order(&self, request: &LimitOrderRequest) -> ExchangeResult<String> {
        let client_oid = request
            .client_order_id
            .clone()
            .unwrap_or_else(|| uuid_like_oid());
        let body = json!({
            "clientOid": client_oid,
            "symbol": request.symbol.exchange_code(),
            "side": request.side.as_str(),
            "type": "limit",
            "price": request.price.to_string(),
            "size": request.quantity.to_string(),
        });

        debug!(symbol = %request.symbol, side = %request.side, price = %request.price, qty = %request.quantity, "placing limit order");

        let response: PlaceOrderResponse = self
            .send_signed(reqwest::Method::POST, "/api/v1/orders", Some(body))
            .await?;
        Ok(response.order_id)
    }

    async fn order_fills(&self, order_id: &str) -> ExchangeResult<Vec<ExchangeFill>> {
        let endpoint = format!("/api/v1/fills?orderId={order_id}");
        let page: FillsPage = self
            .send_signed(reqwest::Method::GET, &endpoint, None)
            .await?;
        page.items.into_iter().map(fill_from_item).collect()
    }

    async fn cancel_order(&self, order_id: &str) -> ExchangeResult<()> {
        let endpoint = format!("/api/v1/orders/{order_id}");
        let _: serde_json::Value = self
            .send_signed(reqwest::Method::DELETE, &endpoint, None)
            .await?;
        Ok(())
    }

    async fn trade_history(
        &self,
        symbol: &Symbol,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ExchangeResult<Vec<ExchangeTrade>> {
        let endpoint = format!(
            "/api/v1/fills?symbol={}&startAt={}&endAt={}",
            symbol.exchange_code(),
            from.timestamp_millis(),
            to.timestamp_millis()
        );
        let page: FillsPage = self
            .send_signed(reqwest::Method::GET, &endpoint, None)
            .await?;
        page.items.into_iter().map(trade_from_item).collect()
    }
}

/// 클라이언트 주문 ID 생성 (KuCoin clientOid 요구사항).
fn uuid_like_oid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
