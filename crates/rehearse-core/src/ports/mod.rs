//! 포트 인터페이스 (trait).
//!
//! Hexagonal Architecture의 포트 레이어.
//! `rehearse-network`가 이 trait들을 구현하며,
//! `rehearse-app`에서 `Arc<dyn T>`로 와이어링한다.
//! 테스트에서는 가짜 구현으로 교체한다.

pub mod beacon;
pub mod credential;
pub mod transport;
