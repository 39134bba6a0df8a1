//! 액세스 토큰 저장소.
//!
//! 클라이언트 저장소(환경 변수, 토큰 파일)에 보관된 토큰을 읽기 전용으로 조회한다.
//! 토큰 발급/갱신은 이 크레이트의 범위 밖이다.

use rehearse_core::ports::credential::TokenStore;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 토큰 파일 형식: `{"accessToken": "..."}`
#[derive(Debug, Deserialize)]
struct StoredToken {
    #[serde(rename = "accessToken", alias = "access_token")]
    access_token: String,
}

/// 환경 변수 → 토큰 파일 순서로 조회하는 저장소
///
/// 호출할 때마다 다시 읽으므로 다른 프로세스가 갱신한 토큰도 반영된다.
#[derive(Debug, Clone, Default)]
pub struct PersistedTokenStore {
    env_var: Option<String>,
    file: Option<PathBuf>,
}

impl PersistedTokenStore {
    pub fn new(env_var: Option<String>, file: Option<PathBuf>) -> Self {
        Self { env_var, file }
    }

    /// 토큰 파일 경로
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    fn from_env(&self) -> Option<String> {
        let var = self.env_var.as_deref()?;
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn from_file(&self) -> Option<String> {
        let path = self.file.as_deref()?;
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("토큰 파일 읽기 실패 ({}): {e}", path.display());
                return None;
            }
        };
        parse_token(&content)
    }
}

/// JSON(`accessToken`) 또는 평문 토큰 파싱
fn parse_token(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        return match serde_json::from_str::<StoredToken>(trimmed) {
            Ok(stored) => Some(stored.access_token).filter(|t| !t.is_empty()),
            Err(e) => {
                debug!("토큰 파일 파싱 실패: {e}");
                None
            }
        };
    }
    Some(trimmed.to_string())
}

impl TokenStore for PersistedTokenStore {
    fn access_token(&self) -> Option<String> {
        self.from_env().or_else(|| self.from_file())
    }
}

/// 고정 토큰 저장소 (CLI 인자, 테스트)
#[derive(Debug, Clone, Default)]
pub struct StaticTokenStore {
    token: Option<String>,
}

impl StaticTokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl TokenStore for StaticTokenStore {
    fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}
