//! # rehearse-network
//!
//! 면접 세션 실시간 채널 어댑터.
//! STOMP over WebSocket(SockJS 프레이밍 선택) 전송 계층, 토큰 저장소,
//! HTTP 이탈 알림, 그리고 세션당 하나의 채널을 관리하는 연결 관리자를 제공한다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use rehearse_network::connection_manager::ConnectionManager;
//! use rehearse_network::stomp_client::StompTransportFactory;
//!
//! let manager = ConnectionManager::new(factory, tokens, beacon);
//! manager.connect("abc", on_message).await?;
//! ```

pub mod auth;
pub mod connection_manager;
pub mod leave_beacon;
pub mod sockjs;
pub mod stomp;
pub mod stomp_client;
