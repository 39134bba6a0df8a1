//! 세션 이탈 알림(beacon).
//!
//! `LeaveBeacon` 포트 구현. 요청을 분리된 tokio 태스크로 띄우고 즉시 반환한다.
//! 실패는 로그로만 남긴다. 띄운 태스크는 `TaskTracker`로 추적하고 종료 직전 `drain`으로 기다린다.

use async_trait::async_trait;
use rehearse_core::error::CoreError;
use rehearse_core::models::destinations::leave_path;
use rehearse_core::models::interview::LeaveNotice;
use rehearse_core::ports::beacon::LeaveBeacon;
use rehearse_core::ports::credential::TokenStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// HTTP 이탈 알림: `POST {base}/api/interviews/{sessionId}/leave`
pub struct HttpLeaveBeacon {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    tasks: TaskTracker,
}

impl HttpLeaveBeacon {
    pub fn new(
        base_url: &str,
        tokens: Arc<dyn TokenStore>,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            tasks: TaskTracker::new(),
        })
    }
}

#[async_trait]
impl LeaveBeacon for HttpLeaveBeacon {
    fn dispatch(&self, notice: LeaveNotice) -> bool {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(session_id = %notice.session_id, "tokio 런타임 없음, 이탈 알림 미발송");
                return false;
            }
        };

        let url = format!("{}{}", self.base_url, leave_path(&notice.session_id));
        let mut request = self.client.post(&url).json(&notice);
        if let Some(token) = self.tokens.access_token() {
            request = request.bearer_auth(token);
        }

        let session_id = notice.session_id;
        let send = async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(%session_id, "이탈 알림 전달 완료");
                }
                Ok(resp) => {
                    warn!(%session_id, status = %resp.status(), "이탈 알림 거부됨");
                }
                Err(e) => {
                    warn!(%session_id, "이탈 알림 전송 실패: {e}");
                }
            }
        };
        self.tasks.spawn_on(send, &runtime);
        true
    }

    async fn drain(&self, timeout: Duration) {
        if self.tasks.is_empty() {
            return;
        }
        info!(pending = self.tasks.len(), "진행 중인 이탈 알림 대기");
        self.tasks.close();
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            warn!(pending = self.tasks.len(), "이탈 알림 대기 시간 초과");
        }
        self.tasks.reopen();
    }
}
