//! SockJS WebSocket 프레이밍.
//!
//! SockJS 서버는 WebSocket 위에 한 글자 접두사 프레임을 쓴다:
//! `o`(open), `h`(heartbeat), `a[...]`(메시지 배열), `m"..."`(단일 메시지),
//! `c[code,"reason"]`(close). 클라이언트는 JSON 문자열 배열로 보낸다.

use rehearse_core::error::CoreError;
use url::Url;
use uuid::Uuid;

/// 서버 → 클라이언트 SockJS 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close { code: u16, reason: String },
}

impl SockJsFrame {
    pub fn decode(text: &str) -> Result<Self, CoreError> {
        let mut chars = text.chars();
        let prefix = chars
            .next()
            .ok_or_else(|| CoreError::Protocol("빈 SockJS 프레임".to_string()))?;
        let payload = chars.as_str();

        match prefix {
            'o' => Ok(Self::Open),
            'h' => Ok(Self::Heartbeat),
            'a' => {
                let messages: Vec<String> = serde_json::from_str(payload).map_err(|e| {
                    CoreError::Protocol(format!("SockJS 메시지 배열 파싱 실패: {e}"))
                })?;
                Ok(Self::Messages(messages))
            }
            'm' => {
                let message: String = serde_json::from_str(payload).map_err(|e| {
                    CoreError::Protocol(format!("SockJS 메시지 파싱 실패: {e}"))
                })?;
                Ok(Self::Messages(vec![message]))
            }
            'c' => {
                let (code, reason): (u16, String) = serde_json::from_str(payload).map_err(|e| {
                    CoreError::Protocol(format!("SockJS close 프레임 파싱 실패: {e}"))
                })?;
                Ok(Self::Close { code, reason })
            }
            other => Err(CoreError::Protocol(format!(
                "알 수 없는 SockJS 프레임 접두사: {other}"
            ))),
        }
    }
}

/// 클라이언트 송신 메시지를 SockJS 형식(JSON 문자열 배열)으로 감싼다
pub fn encode_messages(messages: &[&str]) -> Result<String, CoreError> {
    Ok(serde_json::to_string(messages)?)
}

/// HTTP 기본 URL + 엔드포인트 → WebSocket URL
///
/// SockJS 모드에서는 `/{server-id}/{session-id}/websocket`을 덧붙인다.
pub fn websocket_url(base_url: &str, endpoint: &str, sockjs: bool) -> Result<Url, CoreError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| CoreError::Config(format!("잘못된 서버 URL '{base_url}': {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CoreError::Config(format!(
                "지원하지 않는 URL 스킴: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| CoreError::Config(format!("스킴 변경 실패: {base_url}")))?;

    let mut path = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        endpoint.trim_matches('/')
    );
    if sockjs {
        let (server_id, session_id) = transport_ids();
        path.push_str(&format!("/{server_id}/{session_id}/websocket"));
    }
    url.set_path(&path);
    url.set_query(None);
    Ok(url)
}

/// SockJS 서버 ID(3자리)와 세션 ID(임의 문자열)
fn transport_ids() -> (String, String) {
    let id = Uuid::new_v4();
    let bytes = id.as_bytes();
    let server = u16::from_le_bytes([bytes[0], bytes[1]]) % 1000;
    (format!("{server:03}"), id.simple().to_string())
}
