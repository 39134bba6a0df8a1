//! 면접 세션 실시간 연결 관리자.
//!
//! 세션당 하나의 실시간 채널을 관리한다. 연결/전송/종료/상태 조회/복구를 제공하며
//! 비동기 연결 수립과 종료 사이의 경합을 세대(generation) 번호로 막는다.
//!
//! - 현재 핸들은 항상 최대 1개. 교체된 핸들은 재사용하지 않는다.
//! - `connected`는 현재 세대의 핸드셰이크 성공 후에만 참이 된다.
//! - `disconnect`는 종료 확인을 기다리기 전에 핸들과 플래그를 먼저 비운다.

use parking_lot::Mutex;
use rehearse_core::error::CoreError;
use rehearse_core::models::connection::{ConnectOutcome, ConnectionStatus};
use rehearse_core::models::destinations::{
    answer_destination, topic_for, USER_INACTIVE_DESTINATION,
};
use rehearse_core::models::interview::{InactiveNotice, InboundMessage, LeaveNotice};
use rehearse_core::ports::beacon::LeaveBeacon;
use rehearse_core::ports::credential::TokenStore;
use rehearse_core::ports::transport::{
    ConnectHeaders, FrameHandler, RealtimeTransport, TransportFactory,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 재연결 전 기본 정리 대기 시간
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// 수신 메시지 콜백: 메시지 1건당 1회 호출
pub type MessageHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// 세대 번호가 붙은 전송 핸들
struct Handle {
    generation: u64,
    transport: Arc<dyn RealtimeTransport>,
}

/// 관리자 내부 상태: 하나의 Mutex로 보호
#[derive(Default)]
struct ManagerState {
    handle: Option<Handle>,
    connected: bool,
    connecting: bool,
    /// 종료 확인 대기 중인 핸들의 세대
    closing: Option<u64>,
    generation: u64,
}

impl ManagerState {
    fn is_current(&self, generation: u64) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.generation == generation)
    }

    fn snapshot(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.connected,
            connecting: self.connecting,
            disconnecting: self.closing.is_some(),
            has_handle: self.handle.is_some(),
            transport_connected: self
                .handle
                .as_ref()
                .is_some_and(|h| h.transport.is_connected()),
        }
    }
}

fn publish_status(tx: &watch::Sender<ConnectionStatus>, state: &ManagerState) {
    let next = state.snapshot();
    tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

/// 실시간 연결 관리자
///
/// 면접 화면 하나가 소유하는 인스턴스. 전송 계층은 팩토리로 주입받는다.
pub struct ConnectionManager {
    factory: Arc<dyn TransportFactory>,
    tokens: Arc<dyn TokenStore>,
    beacon: Arc<dyn LeaveBeacon>,
    settle_delay: Duration,
    state: Arc<Mutex<ManagerState>>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
}

impl ConnectionManager {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        tokens: Arc<dyn TokenStore>,
        beacon: Arc<dyn LeaveBeacon>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::default());
        Self {
            factory,
            tokens,
            beacon,
            settle_delay: DEFAULT_SETTLE_DELAY,
            state: Arc::new(Mutex::new(ManagerState::default())),
            status_tx: Arc::new(status_tx),
        }
    }

    /// `ensure_connected`의 정리 대기 시간 설정
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// 세션 채널 연결
    ///
    /// 이미 연결되어 있거나 다른 연결 시도가 진행 중이면 새 전송 핸들을 만들지 않고
    /// 즉시 반환한다. 핸드셰이크 실패만 `Err`로 보고된다.
    pub async fn connect(
        &self,
        session_id: &str,
        on_message: MessageHandler,
    ) -> Result<ConnectOutcome, CoreError> {
        let (generation, transport) = {
            let mut state = self.state.lock();

            if let Some(handle) = &state.handle {
                if handle.transport.is_connected() {
                    debug!(session_id, "이미 연결됨, 기존 연결 재사용");
                    return Ok(ConnectOutcome::AlreadyConnected);
                }
            }
            if state.connecting {
                debug!(session_id, "연결 시도 진행 중, 중복 요청 무시");
                return Ok(ConnectOutcome::InProgress);
            }
            if state.handle.take().is_some() {
                // 끊어진 핸들은 닫지 않고 버린다
                warn!(session_id, "끊어진 이전 핸들 폐기");
                state.connected = false;
            }

            state.generation += 1;
            let generation = state.generation;
            let transport = self.factory.create();
            state.handle = Some(Handle {
                generation,
                transport: Arc::clone(&transport),
            });
            state.connecting = true;
            publish_status(&self.status_tx, &state);
            (generation, transport)
        };

        let headers = ConnectHeaders::new(self.tokens.access_token());
        if headers.token.is_none() {
            debug!(session_id, "저장된 액세스 토큰 없음, 인증 헤더 없이 연결");
        }
        info!(session_id, generation, "실시간 채널 연결 시작");

        if let Err(e) = transport.handshake(&headers).await {
            warn!(session_id, generation, "핸드셰이크 실패: {e}");
            let mut state = self.state.lock();
            if state.is_current(generation) {
                state.handle = None;
                state.connecting = false;
                state.connected = false;
                publish_status(&self.status_tx, &state);
            }
            return Err(e);
        }

        let subscribed = {
            let mut state = self.state.lock();
            if !state.is_current(generation) {
                None
            } else {
                let topic = topic_for(session_id);
                let result =
                    transport.subscribe(&topic, Self::frame_handler(session_id, on_message));
                state.connecting = false;
                match &result {
                    Ok(()) => state.connected = true,
                    Err(_) => {
                        state.handle = None;
                        state.connected = false;
                    }
                }
                publish_status(&self.status_tx, &state);
                Some(result.map(|()| topic))
            }
        };

        match subscribed {
            None => {
                info!(session_id, generation, "교체된 핸들의 핸드셰이크 완료, 고아 핸들 정리");
                if let Err(e) = transport.close().await {
                    debug!(session_id, "고아 핸들 종료 실패 (무시): {e}");
                }
                Ok(ConnectOutcome::Superseded)
            }
            Some(Ok(topic)) => {
                info!(session_id, %topic, "실시간 채널 연결 완료");
                Ok(ConnectOutcome::Connected)
            }
            Some(Err(e)) => {
                warn!(session_id, "토픽 구독 실패: {e}");
                if let Err(close_err) = transport.close().await {
                    debug!(session_id, "구독 실패 핸들 종료 실패 (무시): {close_err}");
                }
                Err(e)
            }
        }
    }

    /// 프레임 본문 → `InboundMessage` → 콜백
    fn frame_handler(session_id: &str, on_message: MessageHandler) -> FrameHandler {
        let session_id = session_id.to_string();
        Arc::new(move |body: &str| match InboundMessage::from_json(body) {
            Ok(message) => {
                debug!(%session_id, kind = message.kind(), "메시지 수신");
                on_message(message);
            }
            Err(e) => warn!(%session_id, "수신 메시지 파싱 실패, 프레임 무시: {e}"),
        })
    }

    /// 답변 전송
    ///
    /// 연결되지 않았거나 전송 계층이 실패하면 `false`를 반환하고 내부 상태를
    /// 미연결로 되돌린다. 재시도는 호출자 몫이다 (`ensure_connected`).
    pub fn send<T: Serialize + ?Sized>(&self, session_id: &str, payload: &T) -> bool {
        self.publish_json(session_id, &answer_destination(session_id), payload)
    }

    /// 사용자 비활성 알림 발행 (응답 없음)
    pub fn notify_inactive(&self, session_id: &str, message: &str) -> bool {
        self.publish_json(
            session_id,
            USER_INACTIVE_DESTINATION,
            &InactiveNotice::new(message),
        )
    }

    fn publish_json<T: Serialize + ?Sized>(
        &self,
        session_id: &str,
        destination: &str,
        payload: &T,
    ) -> bool {
        let (generation, transport) = {
            let mut state = self.state.lock();
            let usable = state
                .handle
                .as_ref()
                .filter(|h| h.transport.is_connected())
                .map(|h| (h.generation, Arc::clone(&h.transport)));

            match usable {
                Some(usable) => usable,
                None => {
                    warn!(
                        session_id,
                        has_handle = state.handle.is_some(),
                        "연결되지 않은 상태에서 전송 시도"
                    );
                    state.connected = false;
                    publish_status(&self.status_tx, &state);
                    return false;
                }
            }
        };

        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(session_id, "페이로드 직렬화 실패: {e}");
                return false;
            }
        };

        match transport.publish(destination, &body) {
            Ok(()) => {
                debug!(session_id, destination, "메시지 전송");
                true
            }
            Err(e) => {
                warn!(session_id, destination, "전송 실패, 연결 유실로 간주: {e}");
                let mut state = self.state.lock();
                if state.is_current(generation) {
                    state.handle = None;
                    state.connected = false;
                    publish_status(&self.status_tx, &state);
                }
                false
            }
        }
    }

    /// 연결 종료
    ///
    /// 핸들과 `connected` 플래그를 즉시 비우고, 정상 종료 요청은 백그라운드에서
    /// 진행한다. 에러는 삼키며 호출 후 관리자는 항상 유휴 상태다.
    pub fn disconnect(&self, session_id: Option<&str>) {
        let session_id = session_id.unwrap_or("-");
        let mut state = self.state.lock();

        let Some(handle) = state.handle.take() else {
            if state.closing.is_some() {
                debug!(session_id, "종료 진행 중, 중복 요청 무시");
            }
            if state.connected || state.connecting {
                state.connected = false;
                state.connecting = false;
                publish_status(&self.status_tx, &state);
            }
            return;
        };

        let was_connected = state.connected || handle.transport.is_connected();
        state.connected = false;
        state.connecting = false;

        if !was_connected {
            debug!(session_id, generation = handle.generation, "미연결 핸들 폐기");
            publish_status(&self.status_tx, &state);
            return;
        }

        let generation = handle.generation;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                state.closing = Some(generation);
                let shared = Arc::clone(&self.state);
                let status_tx = Arc::clone(&self.status_tx);
                let session_id = session_id.to_string();
                runtime.spawn(async move {
                    if let Err(e) = handle.transport.close().await {
                        debug!(%session_id, "종료 요청 실패 (무시): {e}");
                    }
                    let mut state = shared.lock();
                    if state.closing == Some(generation) {
                        state.closing = None;
                        publish_status(&status_tx, &state);
                    }
                    debug!(%session_id, generation, "종료 완료");
                });
            }
            Err(_) => warn!(session_id, "tokio 런타임 없음, 종료 확인 없이 핸들 폐기"),
        }

        info!(session_id, generation, "실시간 채널 종료");
        publish_status(&self.status_tx, &state);
    }

    /// 연결 보장 (복구 경로)
    ///
    /// 건강한 연결이 있으면 즉시 반환, 아니면 종료 → 대기 → 재연결.
    pub async fn ensure_connected(
        &self,
        session_id: &str,
        on_message: MessageHandler,
    ) -> Result<ConnectOutcome, CoreError> {
        let status = self.status();
        if status.has_handle && status.transport_connected {
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        info!(session_id, ?status, "연결 상태 불량, 재연결 수행");
        self.disconnect(Some(session_id));
        tokio::time::sleep(self.settle_delay).await;
        self.connect(session_id, on_message).await
    }

    /// 현재 상태 스냅샷
    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().snapshot()
    }

    /// 상태 변경 수신기
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// 세션 이탈 알림 (실시간 채널과 무관)
    ///
    /// 발송되면 `true`. 전달 여부는 확인하지 않는다.
    pub fn notify_leaving(&self, session_id: &str, reason: &str, elapsed_seconds: u64) -> bool {
        let dispatched = self
            .beacon
            .dispatch(LeaveNotice::new(session_id, reason, elapsed_seconds));
        if dispatched {
            info!(session_id, reason, elapsed_seconds, "이탈 알림 발송");
        } else {
            warn!(session_id, reason, "이탈 알림 발송 실패");
        }
        dispatched
    }

    /// 프로세스 종료 전 정리
    ///
    /// 백그라운드 종료 요청과 이탈 알림을 각각 최대 `timeout`까지 기다린다.
    /// 런타임이 내려가면 남은 태스크가 취소되므로 `main` 반환 직전에 호출한다.
    pub async fn shutdown(&self, timeout: Duration) {
        let mut status_rx = self.subscribe_status();
        let closed = tokio::time::timeout(timeout, status_rx.wait_for(|s| !s.disconnecting))
            .await
            .is_ok();
        if !closed {
            warn!(?timeout, "종료 요청 대기 시간 초과");
        }
        self.beacon.drain(timeout).await;
        debug!("연결 관리자 정리 완료");
    }

    /// 모든 상태 초기화 (핸들은 닫지 않고 버린다)
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let generation = state.generation;
        *state = ManagerState {
            generation,
            ..ManagerState::default()
        };
        publish_status(&self.status_tx, &state);
    }
}
