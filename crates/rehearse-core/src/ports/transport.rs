//! 실시간 전송 계층 포트.
//!
//! 구현: `rehearse-network` crate (tokio-tungstenite 기반 STOMP)

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::CoreError;

/// 구독 프레임 수신 콜백: 프레임 본문(텍스트)을 받는다
pub type FrameHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// 핸드셰이크 시 첨부하는 인증 정보
///
/// 커스텀 헤더를 버리는 전송 계층을 위해 토큰을 `Authorization`과
/// `token` 두 곳에 모두 싣는다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectHeaders {
    pub token: Option<String>,
}

impl ConnectHeaders {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// `Authorization: Bearer <token>` 값
    pub fn authorization(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {t}"))
    }

    /// 프레임에 실을 헤더 목록 (토큰이 없으면 비어 있음)
    pub fn pairs(&self) -> Vec<(String, String)> {
        match (&self.token, self.authorization()) {
            (Some(token), Some(auth)) => vec![
                ("Authorization".to_string(), auth),
                ("token".to_string(), token.clone()),
            ],
            _ => Vec::new(),
        }
    }
}

/// 실시간 전송 핸들 (STOMP 클라이언트 1개에 해당)
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// 전송 계층 연결 + 애플리케이션 핸드셰이크
    async fn handshake(&self, headers: &ConnectHeaders) -> Result<(), CoreError>;

    /// 핸들 스스로 보고하는 연결 상태
    fn is_connected(&self) -> bool;

    /// 목적지 구독. 이후 수신 프레임마다 `handler` 호출
    fn subscribe(&self, destination: &str, handler: FrameHandler) -> Result<(), CoreError>;

    /// 목적지로 본문 발행
    ///
    /// 동기적으로 실패를 보고한다. 실패는 연결 유실로 간주된다.
    fn publish(&self, destination: &str, body: &str) -> Result<(), CoreError>;

    /// 정상 종료 요청 (종료 확인까지 대기)
    async fn close(&self) -> Result<(), CoreError>;
}

/// 전송 핸들 팩토리: 연결 시도마다 새 핸들 생성
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Arc<dyn RealtimeTransport>;
}
