//! 애플리케이션 설정 구조체.
//!
//! 서버 URL, 실시간 엔드포인트, 타임아웃, 토큰 위치 등 런타임 설정을 정의한다.
//! JSON 파일에서 로드하며 누락 필드는 기본값으로 채운다.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;
use crate::models::destinations::DEFAULT_ENDPOINT;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 서버 연결 설정
    pub server: ServerConfig,
    /// 실시간 채널 설정
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// 인증 토큰 설정
    #[serde(default)]
    pub auth: AuthConfig,
}

/// 서버 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// API 서버 기본 URL (예: "https://api.example.com")
    pub base_url: String,
    /// HTTP 요청 타임아웃 (밀리초)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

// ============================================================
// 실시간 채널 설정
// ============================================================

/// 실시간(STOMP over WebSocket) 채널 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// 엔드포인트 경로
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// SockJS 프레이밍 사용 여부 (false면 순수 WebSocket)
    #[serde(default = "default_true")]
    pub sockjs: bool,
    /// 핸드셰이크(CONNECT → CONNECTED) 타임아웃 (밀리초)
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// 종료 확인(DISCONNECT receipt) 대기 시간 (밀리초)
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    /// 재연결 전 정리 대기 시간 (밀리초)
    #[serde(default = "default_reconnect_settle_ms")]
    pub reconnect_settle_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            sockjs: true,
            handshake_timeout_ms: default_handshake_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            reconnect_settle_ms: default_reconnect_settle_ms(),
        }
    }
}

// ============================================================
// 인증 설정
// ============================================================

/// 액세스 토큰 위치 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// 토큰 파일 경로 (None이면 플랫폼 기본 경로)
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// 토큰을 담은 환경 변수 이름 (파일보다 우선)
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_file: None,
            token_env: default_token_env(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_close_timeout_ms() -> u64 {
    3_000
}

fn default_reconnect_settle_ms() -> u64 {
    500
}

fn default_token_env() -> String {
    "REHEARSE_ACCESS_TOKEN".to_string()
}

impl AppConfig {
    /// 기본 설정
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://localhost:8080".to_string(),
                request_timeout_ms: default_request_timeout_ms(),
            },
            realtime: RealtimeConfig::default(),
            auth: AuthConfig::default(),
        }
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        let base = self.server.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(CoreError::Config(format!(
                "server.base_url은 http(s) URL이어야 함: {base}"
            )));
        }
        if !self.realtime.endpoint.starts_with('/') {
            return Err(CoreError::Config(format!(
                "realtime.endpoint는 '/'로 시작해야 함: {}",
                self.realtime.endpoint
            )));
        }
        if self.realtime.handshake_timeout_ms == 0 {
            return Err(CoreError::Config(
                "realtime.handshake_timeout_ms는 0보다 커야 함".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.realtime.handshake_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.realtime.close_timeout_ms)
    }

    pub fn reconnect_settle(&self) -> Duration {
        Duration::from_millis(self.realtime.reconnect_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"server":{"base_url":"https://api.test"}}"#).unwrap();
        assert_eq!(config.server.request_timeout_ms, 10_000);
        assert_eq!(config.realtime.endpoint, "/ws/interview");
        assert_eq!(config.realtime.close_timeout_ms, 3_000);
        assert!(config.auth.token_file.is_none());
    }

    #[test]
    fn validate_rejects_non_http_base() {
        let mut config = AppConfig::default_config();
        config.server.base_url = "ftp://x".to_string();
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn validate_rejects_relative_endpoint() {
        let mut config = AppConfig::default_config();
        config.realtime.endpoint = "ws/interview".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default_config().validate().is_ok());
    }

    #[test]
    fn duration_conversions() {
        let config = AppConfig::default_config();
        assert_eq!(config.reconnect_settle(), Duration::from_millis(500));
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.close_timeout(), Duration::from_secs(3));
    }
}
