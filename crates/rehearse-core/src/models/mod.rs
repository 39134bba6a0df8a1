//! rehearse 도메인 모델.
//!
//! 서버-클라이언트 간 주고받는 면접 세션 메시지와 연결 상태를 정의한다.

pub mod connection;
pub mod destinations;
pub mod interview;
