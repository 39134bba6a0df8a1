//! 면접 세션 메시지 모델.
//!
//! 세션 토픽으로 수신하는 서버 푸시 메시지와 클라이언트가 보내는 답변/알림.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// 다음 질문 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// 질문 ID (서버가 숫자로 보내도 문자열로 보관)
    #[serde(deserialize_with = "string_or_number")]
    pub question_id: String,
    /// 질문 본문
    pub content: String,
}

/// 세션 토픽 수신 메시지: `type` 필드로 구분되는 닫힌 태그 타입
///
/// 모든 변형은 원본 JSON(`raw`)을 함께 보관한다.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// 다음 질문 (`type: "question"`)
    Question {
        next_question: Option<Question>,
        raw: Value,
    },
    /// 면접 종료 (`type: "end"`)
    End { feedback: Option<Value>, raw: Value },
    /// 서버 에러 (`type: "error"`)
    Error { message: Option<String>, raw: Value },
    /// 알 수 없는 타입 또는 `type` 누락
    Unknown { kind: Option<String>, raw: Value },
}

impl InboundMessage {
    /// 프레임 본문(JSON 텍스트) 파싱
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        let raw: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(raw))
    }

    /// 이미 파싱된 JSON 값에서 변형 결정
    pub fn from_value(raw: Value) -> Self {
        let kind = raw.get("type").and_then(Value::as_str).map(str::to_string);

        match kind.as_deref() {
            Some("question") => {
                let next_question = raw
                    .get("nextQuestion")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok());
                Self::Question { next_question, raw }
            }
            Some("end") => {
                let feedback = raw.get("feedback").filter(|v| !v.is_null()).cloned();
                Self::End { feedback, raw }
            }
            Some("error") => {
                let message = raw
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Self::Error { message, raw }
            }
            _ => Self::Unknown { kind, raw },
        }
    }

    /// 메시지 타입 이름 (로그용)
    pub fn kind(&self) -> &str {
        match self {
            Self::Question { .. } => "question",
            Self::End { .. } => "end",
            Self::Error { .. } => "error",
            Self::Unknown { kind, .. } => kind.as_deref().unwrap_or("unknown"),
        }
    }

    /// 원본 JSON
    pub fn raw(&self) -> &Value {
        match self {
            Self::Question { raw, .. }
            | Self::End { raw, .. }
            | Self::Error { raw, .. }
            | Self::Unknown { raw, .. } => raw,
        }
    }
}

/// 답변 전송 페이로드
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub question_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl AnswerPayload {
    /// 현재 시각으로 답변 생성
    pub fn new(question_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// 세션 이탈 알림: HTTP 사이드 채널로 전송
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveNotice {
    pub session_id: String,
    pub reason: String,
    pub elapsed_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

impl LeaveNotice {
    pub fn new(session_id: &str, reason: &str, elapsed_seconds: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
            elapsed_seconds,
            timestamp: Utc::now(),
        }
    }
}

/// 사용자 비활성 알림: `/app/user-inactive`로 발행
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InactiveNotice {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl InactiveNotice {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "questionId는 문자열 또는 숫자여야 함: {other}"
        ))),
    }
}
