//! rehearse 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 라이브러리 에러를 `map_err`로 `CoreError`에 매핑한다.

use thiserror::Error;

/// 코어 레이어 에러.
/// 직렬화, 설정, 실시간 연결, 프로토콜 등 도메인 공통 에러를 정의한다.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 인증 실패 (토큰 없음, 서버 거부 등)
    #[error("인증 에러: {0}")]
    Auth(String),

    /// 네트워크 에러 (연결 실패, 소켓 종료)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 핸드셰이크 실패 (STOMP CONNECT 거부, 업그레이드 실패)
    #[error("핸드셰이크 실패: {0}")]
    Handshake(String),

    /// 프레임 형식 오류 (STOMP/SockJS)
    #[error("프로토콜 에러: {0}")]
    Protocol(String),

    /// 연결되지 않은 상태에서 전송 시도
    #[error("연결되지 않음")]
    NotConnected,

    /// 타임아웃
    #[error("타임아웃: {timeout_ms}ms 초과")]
    Timeout {
        /// 초과된 타임아웃 시간 (밀리초)
        timeout_ms: u64,
    },

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),
}
