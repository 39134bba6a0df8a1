//! 면접 세션 루프.
//!
//! 수신 메시지 출력, 표준 입력 답변 전송, 이탈/종료 처리.

use anyhow::{Context, Result};
use rehearse_core::models::interview::{AnswerPayload, InboundMessage, Question};
use rehearse_network::connection_manager::{ConnectionManager, MessageHandler};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 비활성 알림 기본 문구
const INACTIVE_MESSAGE: &str = "사용자가 일정 시간 응답하지 않음";

/// 세션 루프 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// 서버가 면접 종료를 알림
    Ended,
    /// 사용자가 떠남 (EOF, Ctrl-C, `/quit`)
    Left,
}

/// 입력 한 줄 해석 결과
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Answer(String),
    Idle,
    Quit,
    Empty,
}

pub fn parse_input(line: &str) -> Input {
    match line.trim() {
        "" => Input::Empty,
        "/idle" => Input::Idle,
        "/quit" => Input::Quit,
        text => Input::Answer(text.to_string()),
    }
}

/// 수신 메시지 → 화면 출력 문자열
pub fn render(message: &InboundMessage) -> String {
    match message {
        InboundMessage::Question {
            next_question: Some(q),
            ..
        } => format!("[질문 {}] {}", q.question_id, q.content),
        InboundMessage::Question {
            next_question: None,
            ..
        } => "[질문] (내용 없음)".to_string(),
        InboundMessage::End { feedback, .. } => match feedback {
            Some(feedback) => {
                let text = serde_json::to_string_pretty(feedback)
                    .unwrap_or_else(|_| feedback.to_string());
                format!("[면접 종료] 피드백:\n{text}")
            }
            None => "[면접 종료]".to_string(),
        },
        InboundMessage::Error { message, .. } => {
            format!("[서버 에러] {}", message.as_deref().unwrap_or("알 수 없는 오류"))
        }
        InboundMessage::Unknown { raw, .. } => format!("[알 수 없는 메시지] {raw}"),
    }
}

/// 면접 세션 1회 실행 상태
pub struct InterviewSession {
    manager: Arc<ConnectionManager>,
    session_id: String,
    started: Instant,
    current: Option<Question>,
    inbox_tx: mpsc::UnboundedSender<InboundMessage>,
    inbox_rx: mpsc::UnboundedReceiver<InboundMessage>,
}

impl InterviewSession {
    pub fn new(manager: Arc<ConnectionManager>, session_id: &str) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            manager,
            session_id: session_id.to_string(),
            started: Instant::now(),
            current: None,
            inbox_tx,
            inbox_rx,
        }
    }

    /// 수신 콜백: 메시지를 세션 루프로 넘긴다
    pub fn handler(&self) -> MessageHandler {
        let tx = self.inbox_tx.clone();
        Arc::new(move |message| {
            let _ = tx.send(message);
        })
    }

    /// 세션 채널 연결
    pub async fn start(&mut self) -> Result<()> {
        let outcome = self
            .manager
            .connect(&self.session_id, self.handler())
            .await
            .with_context(|| format!("세션 {} 연결 실패", self.session_id))?;
        self.started = Instant::now();
        info!(session_id = %self.session_id, ?outcome, "면접 세션 시작");
        println!(
            "면접 세션 {}에 연결되었습니다. 답변을 입력하세요 (/idle, /quit).",
            self.session_id
        );
        Ok(())
    }

    /// 세션 루프. 종료 사유가 정해질 때까지 입력과 수신 메시지를 처리한다
    pub async fn run<R>(&mut self, input: R) -> Result<ExitReason>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();

        loop {
            tokio::select! {
                biased;

                Some(message) = self.inbox_rx.recv() => {
                    if self.on_message(message) {
                        self.manager.disconnect(Some(&self.session_id));
                        return Ok(ExitReason::Ended);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C 수신");
                    self.leave("interrupt");
                    return Ok(ExitReason::Left);
                }
                line = lines.next_line() => {
                    let line = line.context("표준 입력 읽기 실패")?;
                    let Some(line) = line else {
                        self.leave("eof");
                        return Ok(ExitReason::Left);
                    };
                    if self.on_input(&line).await {
                        self.leave("quit");
                        return Ok(ExitReason::Left);
                    }
                }
            }
        }
    }

    /// 수신 메시지 처리. 세션이 끝났으면 `true`
    fn on_message(&mut self, message: InboundMessage) -> bool {
        println!("{}", render(&message));
        match message {
            InboundMessage::Question { next_question, .. } => {
                self.current = next_question;
                false
            }
            InboundMessage::End { .. } => true,
            InboundMessage::Error { .. } | InboundMessage::Unknown { .. } => false,
        }
    }

    /// 입력 한 줄 처리. 사용자가 나가려 하면 `true`
    async fn on_input(&mut self, line: &str) -> bool {
        match parse_input(line) {
            Input::Empty => false,
            Input::Quit => true,
            Input::Idle => {
                if !self.manager.notify_inactive(&self.session_id, INACTIVE_MESSAGE) {
                    println!("비활성 알림을 보내지 못했습니다.");
                }
                false
            }
            Input::Answer(text) => {
                let Some(question) = self.current.as_ref() else {
                    println!("아직 받은 질문이 없습니다.");
                    return false;
                };
                let payload = AnswerPayload::new(question.question_id.clone(), text);
                if self.manager.send(&self.session_id, &payload) {
                    debug!(question_id = %payload.question_id, "답변 전송");
                } else {
                    println!("메시지가 전송되지 않았습니다. 재연결 중...");
                    self.reconnect().await;
                }
                false
            }
        }
    }

    async fn reconnect(&self) {
        match self
            .manager
            .ensure_connected(&self.session_id, self.handler())
            .await
        {
            Ok(outcome) => {
                info!(?outcome, "재연결 완료");
                println!("다시 연결되었습니다. 답변을 다시 입력하세요.");
            }
            Err(e) => {
                warn!("재연결 실패: {e}");
                println!("재연결에 실패했습니다. 다음 입력에서 다시 시도합니다.");
            }
        }
    }

    /// 이탈 알림 후 연결 종료
    fn leave(&self, reason: &str) {
        let elapsed = self.started.elapsed().as_secs();
        self.manager.notify_leaving(&self.session_id, reason, elapsed);
        self.manager.disconnect(Some(&self.session_id));
    }
}
