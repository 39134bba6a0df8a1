//! # rehearse-core
//!
//! 면접 세션 실시간 클라이언트의 도메인 모델, 포트(trait) 정의, 에러 타입.
//! 모든 크레이트가 공유하는 핵심 타입과 인터페이스를 제공한다.
//!
//! ## 구조
//!
//! - [`models`]: 도메인 데이터 구조체 (serde Serialize/Deserialize)
//! - [`ports`]: Hexagonal Architecture 포트 인터페이스 (async_trait)
//! - [`error`]: 핵심 에러 타입 (thiserror)
//! - [`config`]: 애플리케이션 설정 구조체
//! - [`config_manager`]: 설정 파일 관리 (로드/저장)

pub mod config;
pub mod config_manager;
pub mod error;
pub mod models;
pub mod ports;

#[cfg(test)]
mod tests {
    use crate::models::interview::{AnswerPayload, InboundMessage};

    #[test]
    fn answer_serializes_camel_case() {
        let answer = AnswerPayload::new("q1", "I am...");
        let json = serde_json::to_value(&answer).unwrap();

        assert_eq!(json["questionId"], "q1");
        assert_eq!(json["content"], "I am...");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn inbound_question_parses() {
        let msg = InboundMessage::from_json(
            r#"{"type":"question","nextQuestion":{"questionId":"q1","content":"자기소개"}}"#,
        )
        .unwrap();
        assert!(matches!(msg, InboundMessage::Question { .. }));
    }

    #[test]
    fn config_defaults() {
        let config = crate::config::AppConfig::default_config();
        assert_eq!(config.realtime.endpoint, "/ws/interview");
        assert!(config.realtime.sockjs);
        assert_eq!(config.realtime.reconnect_settle_ms, 500);
        assert_eq!(config.auth.token_env, "REHEARSE_ACCESS_TOKEN");
    }
}
