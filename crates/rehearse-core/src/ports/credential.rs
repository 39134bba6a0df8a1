//! 자격증명 저장소 포트.
//!
//! 클라이언트 저장소에 보관된 액세스 토큰을 읽기 전용으로 조회한다.

/// 액세스 토큰 저장소
pub trait TokenStore: Send + Sync {
    /// 저장된 액세스 토큰 (없으면 `None`)
    fn access_token(&self) -> Option<String>;
}
