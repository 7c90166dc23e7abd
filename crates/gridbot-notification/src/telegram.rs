//! 텔레그램 알림 서비스.
//!
//! Telegram Bot API를 통해 그리드/차익거래 알림을 전송합니다.
//! 전송 실패는 경고 로그만 남기고 삼킵니다.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::types::Notifier;

/// 텔레그램 알림 전송 설정.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// @BotFather에서 받은 봇 토큰
    pub bot_token: String,
    /// 메시지를 보낼 채팅 ID
    pub chat_id: String,
    /// 전송 활성화 여부
    pub enabled: bool,
}

impl TelegramConfig {
    /// 새 텔레그램 설정을 생성합니다.
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            enabled: true,
        }
    }

    /// 환경 변수에서 설정을 생성합니다.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        let enabled = std::env::var("TELEGRAM_ENABLED")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(true);

        Some(Self {
            bot_token,
            chat_id,
            enabled,
        })
    }
}

/// 텔레그램 알림 전송기.
pub struct TelegramSender {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramSender {
    /// 새 텔레그램 전송기를 생성합니다.
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// 환경 변수에서 전송기를 생성합니다.
    pub fn from_env() -> Option<Self> {
        TelegramConfig::from_env().map(Self::new)
    }

    /// HTML 특수 문자를 이스케이프합니다.
    fn escape_html(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    }

    /// 메시지를 전송합니다. 실패는 경고 로그만 남깁니다.
    async fn send(&self, emoji: &str, title: &str, body: &str) {
        if !self.config.enabled {
            return;
        }

        let text = format!(
            "{emoji} <b>{}</b>\n\n{}",
            Self::escape_html(title),
            Self::escape_html(body)
        );
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.bot_token
        );
        let payload = json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        match self.client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(title, "telegram notification sent");
            }
            Ok(response) => {
                warn!(title, status = %response.status(), "telegram API returned error");
            }
            Err(e) => {
                warn!(title, error = %e, "telegram notification failed");
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramSender {
    async fn notify_info(&self, title: &str, body: &str) {
        self.send("📊", title, body).await;
    }

    async fn notify_error(&self, title: &str, detail: &str) {
        self.send("🚨", title, detail).await;
    }
}
