//! 알림 타입 및 trait 정의.

use async_trait::async_trait;
use tokio::sync::Mutex;

/// 알림 협력자 trait.
///
/// 두 연산 모두 fire-and-forget입니다. 구현은 전송 실패를 내부에서
/// 로그로 남기고 삼켜야 하며, 에러를 반환하지 않습니다.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 정보성 알림을 전송합니다.
    async fn notify_info(&self, title: &str, body: &str);

    /// 오류 알림을 전송합니다.
    async fn notify_error(&self, title: &str, detail: &str);
}

/// 아무것도 전송하지 않는 알림기.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify_info(&self, _title: &str, _body: &str) {}

    async fn notify_error(&self, _title: &str, _detail: &str) {}
}

/// 전송된 알림을 기록하는 테스트용 알림기.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    /// 새 기록 알림기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기록된 (제목, 본문) 목록을 반환합니다.
    pub async fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_info(&self, title: &str, body: &str) {
        self.messages
            .lock()
            .await
            .push((title.to_string(), body.to_string()));
    }

    async fn notify_error(&self, title: &str, detail: &str) {
        self.messages
            .lock()
            .await
            .push((title.to_string(), detail.to_string()));
    }
}
