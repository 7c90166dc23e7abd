//! # Gridbot Notification
//!
//! fire-and-forget 알림 서비스를 제공합니다.
//!
//! 알림 전송 실패는 절대 호출자의 작업을 중단시키지 않습니다.
//! 전송기는 내부에서 실패를 로그로 남기고 삼킵니다.

pub mod telegram;
pub mod types;

pub use telegram::{TelegramConfig, TelegramSender};
pub use types::{Notifier, NullNotifier, RecordingNotifier};
