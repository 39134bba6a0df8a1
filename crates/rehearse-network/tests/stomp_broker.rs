//! STOMP 브로커 통합 테스트.
//!
//! 로컬 WebSocket 위에 최소 STOMP 브로커를 띄워 연결 관리자 → STOMP 전송 계층 →
//! 브로커 전체 흐름(연결, 구독, 질문 수신, 답변 전송, 종료)을 검증한다.

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rehearse_core::error::CoreError;
use rehearse_core::models::connection::ConnectOutcome;
use rehearse_core::models::interview::{AnswerPayload, InboundMessage, LeaveNotice};
use rehearse_core::ports::beacon::LeaveBeacon;
use rehearse_network::auth::StaticTokenStore;
use rehearse_network::connection_manager::{ConnectionManager, MessageHandler};
use rehearse_network::stomp::{Command, Frame};
use rehearse_core::ports::transport::{ConnectHeaders, RealtimeTransport};
use rehearse_network::stomp_client::{StompTransport, StompTransportFactory, TransportSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

const QUESTION: &str =
    r#"{"type":"question","nextQuestion":{"questionId":7,"content":"자기소개를 해주세요"}}"#;

/// 브로커가 관찰한 것
#[derive(Default)]
struct BrokerLog {
    upgrade_auth: Mutex<Option<String>>,
    frames: Mutex<Vec<Frame>>,
}

impl BrokerLog {
    fn commands(&self) -> Vec<Command> {
        self.frames.lock().iter().map(|f| f.command).collect()
    }

    fn find(&self, command: Command) -> Option<Frame> {
        self.frames
            .lock()
            .iter()
            .find(|f| f.command == command)
            .cloned()
    }
}

/// 연결별 브로커 동작
#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    /// CONNECTED, 구독 시 질문 1건, DISCONNECT에 RECEIPT
    Normal,
    /// CONNECT에 ERROR
    Reject,
    /// CONNECTED 직후 소켓 종료
    CloseAfterConnected,
    /// SockJS 프레이밍, CONNECTED와 ERROR를 한 배치로 전송
    SockJsConnectedThenError,
}

/// `script` 순서대로 연결을 하나씩 받아 처리하는 브로커
async fn spawn_broker(script: Vec<Mode>) -> (SocketAddr, Arc<BrokerLog>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(BrokerLog::default());
    let shared = Arc::clone(&log);

    tokio::spawn(async move {
        for mode in script {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(serve(stream, mode, Arc::clone(&shared)));
        }
    });

    (addr, log)
}

fn replies(frame: &Frame, mode: Mode) -> Vec<Frame> {
    match (frame.command, mode) {
        (Command::Connect, Mode::Reject) => vec![Frame::new(Command::Error)
            .with_header("message", "invalid token")
            .with_body("인증 실패")],
        (Command::Connect, Mode::SockJsConnectedThenError) => vec![
            Frame::new(Command::Connected).with_header("version", "1.2"),
            Frame::new(Command::Error).with_header("message", "session expired"),
        ],
        (Command::Connect, _) => {
            vec![Frame::new(Command::Connected).with_header("version", "1.2")]
        }
        (Command::Subscribe, _) => vec![Frame::new(Command::Message)
            .with_header("subscription", frame.header("id").unwrap_or_default())
            .with_header("destination", frame.header("destination").unwrap_or_default())
            .with_header("message-id", "m-1")
            .with_header("content-length", QUESTION.len().to_string())
            .with_body(QUESTION)],
        (Command::Disconnect, _) => vec![Frame::new(Command::Receipt)
            .with_header("receipt-id", frame.header("receipt").unwrap_or_default())],
        _ => Vec::new(),
    }
}

async fn serve(stream: TcpStream, mode: Mode, log: Arc<BrokerLog>) {
    let upgrade = Arc::clone(&log);
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        *upgrade.upgrade_auth.lock() = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(resp)
    };
    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    let sockjs = mode == Mode::SockJsConnectedThenError;
    if sockjs && write.send(Message::Text("o".into())).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = read.next().await {
        let text = match msg {
            Message::Text(text) => text.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };
        let texts: Vec<String> = if sockjs {
            serde_json::from_str(&text).unwrap()
        } else {
            vec![text]
        };

        for text in texts {
            let frame = Frame::decode(&text).unwrap();
            log.frames.lock().push(frame.clone());

            let encoded: Vec<String> = replies(&frame, mode).iter().map(Frame::encode).collect();
            let outgoing = if sockjs && !encoded.is_empty() {
                vec![format!("a{}", serde_json::to_string(&encoded).unwrap())]
            } else {
                encoded
            };
            for out in outgoing {
                if write.send(Message::Text(out.into())).await.is_err() {
                    return;
                }
            }

            if mode == Mode::CloseAfterConnected && frame.command == Command::Connect {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
        }
    }
}

struct NoopBeacon;

impl LeaveBeacon for NoopBeacon {
    fn dispatch(&self, _notice: LeaveNotice) -> bool {
        true
    }
}

fn settings_for(addr: SocketAddr, sockjs: bool) -> TransportSettings {
    TransportSettings {
        base_url: format!("http://{addr}"),
        endpoint: "/ws/interview".to_string(),
        sockjs,
        handshake_timeout: Duration::from_secs(5),
        close_timeout: Duration::from_secs(2),
    }
}

fn manager_for(addr: SocketAddr) -> ConnectionManager {
    ConnectionManager::new(
        Arc::new(StompTransportFactory::new(settings_for(addr, false))),
        Arc::new(StaticTokenStore::new(Some("jwt_abc".to_string()))),
        Arc::new(NoopBeacon),
    )
    .with_settle_delay(Duration::from_millis(20))
}

fn recorder() -> (MessageHandler, Arc<Mutex<Vec<InboundMessage>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let handler: MessageHandler = Arc::new(move |msg| sink.lock().push(msg));
    (handler, received)
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for condition");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_session_over_stomp() {
    let (addr, log) = spawn_broker(vec![Mode::Normal]).await;
    let manager = manager_for(addr);
    let (on_message, received) = recorder();

    let outcome = manager.connect("abc", on_message).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Connected);
    assert!(manager.status().transport_connected);

    // 토큰은 업그레이드 요청과 CONNECT 프레임 양쪽에 실린다
    assert_eq!(log.upgrade_auth.lock().as_deref(), Some("Bearer jwt_abc"));
    let connect = log.find(Command::Connect).unwrap();
    assert_eq!(connect.header("Authorization"), Some("Bearer jwt_abc"));
    assert_eq!(connect.header("token"), Some("jwt_abc"));

    eventually(|| !received.lock().is_empty()).await;
    let subscribe = log.find(Command::Subscribe).unwrap();
    assert_eq!(subscribe.header("destination"), Some("/topic/interview/abc"));
    match &received.lock()[0] {
        InboundMessage::Question { next_question, .. } => {
            let question = next_question.as_ref().unwrap();
            assert_eq!(question.question_id, "7");
            assert_eq!(question.content, "자기소개를 해주세요");
        }
        other => panic!("unexpected message: {other:?}"),
    }

    assert!(manager.send("abc", &AnswerPayload::new("7", "안녕하세요")));
    eventually(|| log.find(Command::Send).is_some()).await;
    let send = log.find(Command::Send).unwrap();
    assert_eq!(send.header("destination"), Some("/app/interview/abc/answer"));
    let body: serde_json::Value = serde_json::from_str(&send.body).unwrap();
    assert_eq!(body["questionId"], "7");
    assert_eq!(body["content"], "안녕하세요");

    manager.disconnect(Some("abc"));
    assert!(!manager.status().connected);
    eventually(|| !manager.status().disconnecting).await;
    assert_eq!(
        log.commands(),
        vec![
            Command::Connect,
            Command::Subscribe,
            Command::Send,
            Command::Disconnect
        ]
    );
    assert!(!manager.send("abc", &AnswerPayload::new("7", "late")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_connect_surfaces_handshake_error() {
    let (addr, log) = spawn_broker(vec![Mode::Reject]).await;
    let manager = manager_for(addr);
    let on_message: MessageHandler = Arc::new(|_: InboundMessage| {});

    let result = manager.connect("abc", on_message).await;
    assert_matches!(result, Err(CoreError::Handshake(_)));
    assert!(manager.status().is_idle());
    assert_eq!(log.commands(), vec![Command::Connect]);
}

#[tokio::test]
async fn unreachable_broker_fails_without_leaving_state() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = manager_for(addr);
    let result = manager.connect("abc", Arc::new(|_: InboundMessage| {})).await;

    assert!(result.is_err());
    assert!(manager.status().is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn server_close_after_connected_is_reported_as_disconnected() {
    const ROUNDS: usize = 30;
    let (addr, _log) = spawn_broker(vec![Mode::CloseAfterConnected; ROUNDS]).await;

    for round in 0..ROUNDS {
        let transport = StompTransport::new(settings_for(addr, false));
        transport
            .handshake(&ConnectHeaders::default())
            .await
            .unwrap_or_else(|e| panic!("round {round}: {e}"));
        eventually(|| !transport.is_connected()).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ensure_connected_repairs_connection_closed_by_server() {
    let (addr, log) = spawn_broker(vec![Mode::CloseAfterConnected, Mode::Normal]).await;
    let manager = manager_for(addr);
    let (on_message, received) = recorder();

    // 구독 전에 소켓이 닫히면 구독 실패로 보고될 수 있다
    let first = manager.connect("abc", Arc::clone(&on_message)).await;
    assert!(
        matches!(first, Ok(ConnectOutcome::Connected) | Err(CoreError::NotConnected)),
        "unexpected first connect result: {first:?}"
    );
    eventually(|| !manager.status().transport_connected).await;
    assert!(!manager.send("abc", &AnswerPayload::new("7", "lost")));

    let outcome = manager.ensure_connected("abc", on_message).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Connected);
    assert!(manager.status().transport_connected);

    eventually(|| !received.lock().is_empty()).await;
    assert!(manager.send("abc", &AnswerPayload::new("7", "다시 연결됨")));
    eventually(|| log.find(Command::Send).is_some()).await;
    manager.disconnect(Some("abc"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frames_batched_with_connected_are_not_dropped() {
    let (addr, log) = spawn_broker(vec![Mode::SockJsConnectedThenError]).await;
    let transport = StompTransport::new(settings_for(addr, true));

    transport
        .handshake(&ConnectHeaders::new(Some("jwt_abc".to_string())))
        .await
        .unwrap();

    // 같은 배치의 ERROR가 처리되어 연결이 끊긴 것으로 보고된다
    eventually(|| !transport.is_connected()).await;
    assert_eq!(log.commands(), vec![Command::Connect]);
}
