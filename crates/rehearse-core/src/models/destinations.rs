//! STOMP 목적지 및 HTTP 경로.

/// 실시간 엔드포인트 기본 경로
pub const DEFAULT_ENDPOINT: &str = "/ws/interview";

/// 사용자 비활성 알림 발행 목적지
pub const USER_INACTIVE_DESTINATION: &str = "/app/user-inactive";

/// 세션 수신 토픽: `/topic/interview/{sessionId}`
pub fn topic_for(session_id: &str) -> String {
    format!("/topic/interview/{session_id}")
}

/// 답변 발행 목적지: `/app/interview/{sessionId}/answer`
pub fn answer_destination(session_id: &str) -> String {
    format!("/app/interview/{session_id}/answer")
}

/// 이탈 알림 HTTP 경로: `/api/interviews/{sessionId}/leave`
pub fn leave_path(session_id: &str) -> String {
    format!("/api/interviews/{session_id}/leave")
}
