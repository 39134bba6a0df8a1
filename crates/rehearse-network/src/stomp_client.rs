//! STOMP over WebSocket 전송 계층.
//!
//! `tokio-tungstenite` 기반 `RealtimeTransport` 포트 구현.
//! 송신은 unbounded 채널 → 송신 태스크, 수신은 별도 태스크가 구독별 핸들러로 분배한다.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rehearse_core::config::AppConfig;
use rehearse_core::error::CoreError;
use rehearse_core::ports::transport::{
    ConnectHeaders, FrameHandler, RealtimeTransport, TransportFactory,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::sockjs::{self, SockJsFrame};
use crate::stomp::{Command, Frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// 핸드셰이크 결과: 소켓 양쪽 + CONNECTED와 같은 배치로 도착한 나머지 프레임
type OpenedSession = (WsWrite, WsRead, Vec<String>);

/// 전송 계층 설정
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// HTTP 기본 URL (ws/wss로 변환됨)
    pub base_url: String,
    /// 엔드포인트 경로 (예: "/ws/interview")
    pub endpoint: String,
    /// SockJS 프레이밍 사용 여부
    pub sockjs: bool,
    /// CONNECT → CONNECTED 대기 한도
    pub handshake_timeout: Duration,
    /// DISCONNECT receipt 대기 한도
    pub close_timeout: Duration,
}

impl TransportSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.server.base_url.trim_end_matches('/').to_string(),
            endpoint: config.realtime.endpoint.clone(),
            sockjs: config.realtime.sockjs,
            handshake_timeout: config.handshake_timeout(),
            close_timeout: config.close_timeout(),
        }
    }
}

/// 수신 WebSocket 메시지 분류 결과
#[derive(Debug, PartialEq)]
enum Inbound {
    /// STOMP 프레임 텍스트 목록
    Frames(Vec<String>),
    /// SockJS open
    Open,
    /// 연결 종료 (사유)
    Closed(String),
    /// Ping/Pong, SockJS 하트비트
    Ignore,
}

fn classify(sockjs: bool, msg: Message) -> Result<Inbound, CoreError> {
    let text = match msg {
        Message::Text(text) => text.to_string(),
        Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
        Message::Close(frame) => {
            let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
            return Ok(Inbound::Closed(reason));
        }
        _ => return Ok(Inbound::Ignore),
    };

    if !sockjs {
        return Ok(Inbound::Frames(vec![text]));
    }

    match SockJsFrame::decode(&text)? {
        SockJsFrame::Open => Ok(Inbound::Open),
        SockJsFrame::Heartbeat => Ok(Inbound::Ignore),
        SockJsFrame::Messages(messages) => Ok(Inbound::Frames(messages)),
        SockJsFrame::Close { code, reason } => Ok(Inbound::Closed(format!("{code} {reason}"))),
    }
}

async fn next_inbound(read: &mut WsRead, sockjs: bool) -> Result<Inbound, CoreError> {
    match read.next().await {
        Some(Ok(msg)) => classify(sockjs, msg),
        Some(Err(e)) => Err(CoreError::Network(format!("WebSocket 수신 에러: {e}"))),
        None => Ok(Inbound::Closed("스트림 종료".to_string())),
    }
}

/// STOMP 클라이언트 핸들: 연결 시도 1회에 하나
pub struct StompTransport {
    settings: TransportSettings,
    connected: Arc<AtomicBool>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    subscriptions: Arc<Mutex<HashMap<String, FrameHandler>>>,
    pending_receipt: Arc<Mutex<Option<(String, oneshot::Sender<()>)>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl StompTransport {
    pub fn new(settings: TransportSettings) -> Self {
        Self {
            settings,
            connected: Arc::new(AtomicBool::new(false)),
            outbound: Mutex::new(None),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            pending_receipt: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// 송신할 STOMP 프레임을 WebSocket 텍스트로 변환
    fn wrap(&self, frame: &Frame) -> Result<String, CoreError> {
        let text = frame.encode();
        if self.settings.sockjs {
            sockjs::encode_messages(&[&text])
        } else {
            Ok(text)
        }
    }

    fn send_frame(&self, frame: &Frame) -> Result<(), CoreError> {
        let payload = self.wrap(frame)?;
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(CoreError::NotConnected)?;
        tx.send(payload).map_err(|_| {
            self.connected.store(false, Ordering::SeqCst);
            CoreError::Network("송신 채널 닫힘".to_string())
        })
    }

    /// WebSocket 연결 + CONNECT/CONNECTED 교환
    async fn open_session(
        &self,
        request: Request,
        host: &str,
        headers: &ConnectHeaders,
    ) -> Result<OpenedSession, CoreError> {
        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| CoreError::Handshake(format!("WebSocket 연결 실패: {e}")))?;
        let (mut write, mut read) = ws.split();
        let sockjs = self.settings.sockjs;

        if sockjs {
            loop {
                match next_inbound(&mut read, true).await? {
                    Inbound::Open => break,
                    Inbound::Closed(reason) => {
                        return Err(CoreError::Handshake(format!("SockJS 세션 거부: {reason}")))
                    }
                    _ => {}
                }
            }
        }

        let connect = self.wrap(&Frame::connect(host, headers))?;
        write
            .send(Message::Text(connect.into()))
            .await
            .map_err(|e| CoreError::Handshake(format!("CONNECT 전송 실패: {e}")))?;

        loop {
            match next_inbound(&mut read, sockjs).await? {
                Inbound::Frames(frames) => {
                    let mut frames = frames.into_iter();
                    while let Some(text) = frames.next() {
                        if Frame::is_heartbeat(&text) {
                            continue;
                        }
                        let frame = Frame::decode(&text)?;
                        match frame.command {
                            Command::Connected => {
                                debug!(
                                    version = frame.header("version").unwrap_or("?"),
                                    "CONNECTED 수신"
                                );
                                return Ok((write, read, frames.collect()));
                            }
                            Command::Error => {
                                let reason = frame
                                    .header("message")
                                    .map(str::to_string)
                                    .unwrap_or(frame.body);
                                return Err(CoreError::Handshake(format!(
                                    "서버가 CONNECT 거부: {reason}"
                                )));
                            }
                            other => debug!("핸드셰이크 중 무시한 프레임: {other}"),
                        }
                    }
                }
                Inbound::Closed(reason) => {
                    return Err(CoreError::Handshake(format!(
                        "핸드셰이크 중 연결 종료: {reason}"
                    )))
                }
                Inbound::Open | Inbound::Ignore => {}
            }
        }
    }

    /// 송신/수신 태스크 시작
    ///
    /// `connected`는 태스크 생성 전에 올린다. 이후에는 루프와 `teardown`만 내린다.
    fn start(&self, write: WsWrite, read: WsRead, pending: Vec<String>) {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        *self.outbound.lock() = Some(tx);
        self.connected.store(true, Ordering::SeqCst);

        tokio::spawn(Self::write_loop(write, rx, Arc::clone(&self.connected)));
        let reader = tokio::spawn(Self::read_loop(
            read,
            pending,
            self.settings.sockjs,
            Arc::clone(&self.connected),
            Arc::clone(&self.subscriptions),
            Arc::clone(&self.pending_receipt),
        ));

        if let Some(previous) = self.reader.lock().replace(reader) {
            previous.abort();
        }
    }

    /// 송신 루프: 채널이 닫히면 소켓을 닫는다
    async fn write_loop(
        mut write: WsWrite,
        mut rx: mpsc::UnboundedReceiver<String>,
        connected: Arc<AtomicBool>,
    ) {
        while let Some(text) = rx.recv().await {
            if let Err(e) = write.send(Message::Text(text.into())).await {
                warn!("WebSocket 송신 실패: {e}");
                connected.store(false, Ordering::SeqCst);
                return;
            }
        }
        let _ = write.send(Message::Close(None)).await;
        let _ = write.close().await;
        debug!("WebSocket 송신 루프 종료");
    }

    /// 수신 루프
    async fn read_loop(
        mut read: WsRead,
        pending: Vec<String>,
        sockjs: bool,
        connected: Arc<AtomicBool>,
        subscriptions: Arc<Mutex<HashMap<String, FrameHandler>>>,
        pending_receipt: Arc<Mutex<Option<(String, oneshot::Sender<()>)>>>,
    ) {
        if !Self::handle_frames(pending, &subscriptions, &pending_receipt) {
            connected.store(false, Ordering::SeqCst);
            debug!("STOMP 수신 루프 종료 (핸드셰이크 배치)");
            return;
        }

        loop {
            let inbound = match next_inbound(&mut read, sockjs).await {
                Ok(inbound) => inbound,
                Err(CoreError::Protocol(e)) => {
                    warn!("잘못된 프레임 무시: {e}");
                    continue;
                }
                Err(e) => {
                    warn!("{e}");
                    break;
                }
            };

            match inbound {
                Inbound::Frames(frames) => {
                    if !Self::handle_frames(frames, &subscriptions, &pending_receipt) {
                        break;
                    }
                }
                Inbound::Closed(reason) => {
                    info!("서버가 연결 종료: {reason}");
                    break;
                }
                Inbound::Open | Inbound::Ignore => {}
            }
        }
        connected.store(false, Ordering::SeqCst);
        debug!("STOMP 수신 루프 종료");
    }

    /// 프레임 텍스트 묶음 처리. 연결을 계속 유지할지 반환
    fn handle_frames(
        frames: Vec<String>,
        subscriptions: &Mutex<HashMap<String, FrameHandler>>,
        pending_receipt: &Mutex<Option<(String, oneshot::Sender<()>)>>,
    ) -> bool {
        for text in frames {
            if Frame::is_heartbeat(&text) {
                continue;
            }
            match Frame::decode(&text) {
                Ok(frame) => {
                    if !Self::dispatch(frame, subscriptions, pending_receipt) {
                        return false;
                    }
                }
                Err(e) => warn!("STOMP 프레임 디코딩 실패: {e}"),
            }
        }
        true
    }

    /// 수신 프레임 처리. 연결을 계속 유지할지 반환
    fn dispatch(
        frame: Frame,
        subscriptions: &Mutex<HashMap<String, FrameHandler>>,
        pending_receipt: &Mutex<Option<(String, oneshot::Sender<()>)>>,
    ) -> bool {
        match frame.command {
            Command::Message => {
                let handler = frame
                    .header("subscription")
                    .and_then(|id| subscriptions.lock().get(id).cloned());
                match handler {
                    Some(handler) => handler(&frame.body),
                    None => debug!("구독 없는 MESSAGE 무시"),
                }
                true
            }
            Command::Receipt => {
                let receipt_id = frame.header("receipt-id");
                let mut pending = pending_receipt.lock();
                let matches = pending
                    .as_ref()
                    .is_some_and(|(expected, _)| Some(expected.as_str()) == receipt_id);
                if matches {
                    if let Some((_, tx)) = pending.take() {
                        let _ = tx.send(());
                    }
                }
                true
            }
            Command::Error => {
                warn!(
                    reason = frame.header("message").unwrap_or(""),
                    "STOMP ERROR 수신: {}",
                    frame.body
                );
                false
            }
            other => {
                debug!("무시한 프레임: {other}");
                true
            }
        }
    }

    fn teardown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        // 송신 채널을 닫으면 송신 루프가 소켓을 닫는다
        self.outbound.lock().take();
        self.subscriptions.lock().clear();
        self.pending_receipt.lock().take();
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

#[async_trait]
impl RealtimeTransport for StompTransport {
    async fn handshake(&self, headers: &ConnectHeaders) -> Result<(), CoreError> {
        let url = sockjs::websocket_url(
            &self.settings.base_url,
            &self.settings.endpoint,
            self.settings.sockjs,
        )?;
        let host = url.host_str().unwrap_or("localhost").to_string();
        info!("STOMP 연결: {url}");

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| CoreError::Handshake(format!("업그레이드 요청 생성 실패: {e}")))?;
        if let Some(auth) = headers.authorization() {
            let value = HeaderValue::from_str(&auth)
                .map_err(|e| CoreError::Auth(format!("토큰 헤더 값이 올바르지 않음: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let timeout = self.settings.handshake_timeout;
        let (write, read, pending) =
            tokio::time::timeout(timeout, self.open_session(request, &host, headers))
                .await
                .map_err(|_| CoreError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })??;

        if !pending.is_empty() {
            debug!(count = pending.len(), "CONNECTED 이후 같은 배치의 프레임 전달");
        }
        self.start(write, read, pending);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self, destination: &str, handler: FrameHandler) -> Result<(), CoreError> {
        if !self.is_connected() {
            return Err(CoreError::NotConnected);
        }
        let id = format!("sub-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().insert(id.clone(), handler);

        if let Err(e) = self.send_frame(&Frame::subscribe(&id, destination)) {
            self.subscriptions.lock().remove(&id);
            return Err(e);
        }
        debug!(%destination, %id, "구독 요청");
        Ok(())
    }

    fn publish(&self, destination: &str, body: &str) -> Result<(), CoreError> {
        if !self.is_connected() {
            return Err(CoreError::NotConnected);
        }
        self.send_frame(&Frame::send(destination, body))
    }

    async fn close(&self) -> Result<(), CoreError> {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            let receipt = format!("disconnect-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
            let (tx, rx) = oneshot::channel();
            *self.pending_receipt.lock() = Some((receipt.clone(), tx));

            match self.send_frame(&Frame::disconnect(&receipt)) {
                Ok(()) => match tokio::time::timeout(self.settings.close_timeout, rx).await {
                    Ok(Ok(())) => debug!("DISCONNECT receipt 수신"),
                    _ => debug!("DISCONNECT receipt 미수신, 소켓 종료 진행"),
                },
                Err(e) => debug!("DISCONNECT 전송 실패: {e}"),
            }
        }
        self.teardown();
        Ok(())
    }
}

impl Drop for StompTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

/// `StompTransport` 팩토리
pub struct StompTransportFactory {
    settings: TransportSettings,
}

impl StompTransportFactory {
    pub fn new(settings: TransportSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(TransportSettings::from_config(config))
    }
}

impl TransportFactory for StompTransportFactory {
    fn create(&self) -> Arc<dyn RealtimeTransport> {
        Arc::new(StompTransport::new(self.settings.clone()))
    }
}
