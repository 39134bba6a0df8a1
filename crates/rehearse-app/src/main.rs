//! # rehearse-app
//!
//! Rehearse 면접 세션 CLI 진입점.
//! 설정 로드, 어댑터 와이어링, 세션 루프 실행.

mod session;

use anyhow::{Context, Result};
use clap::Parser;
use rehearse_core::config::AppConfig;
use rehearse_core::config_manager::ConfigManager;
use rehearse_core::ports::credential::TokenStore;
use rehearse_network::auth::PersistedTokenStore;
use rehearse_network::connection_manager::ConnectionManager;
use rehearse_network::leave_beacon::HttpLeaveBeacon;
use rehearse_network::stomp_client::StompTransportFactory;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::session::{ExitReason, InterviewSession};

const TOKEN_FILE_NAME: &str = "token.json";

/// Rehearse 실시간 면접 클라이언트
#[derive(Parser, Debug)]
#[command(name = "rehearse")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 면접 세션 ID
    #[arg(long, short = 'S')]
    session: String,

    /// 서버 URL 지정 (기본: 설정 파일 값)
    #[arg(long, short = 's')]
    server: Option<String>,

    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 액세스 토큰 파일 경로
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// SockJS 프레이밍 없이 순수 WebSocket 사용
    #[arg(long)]
    no_sockjs: bool,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

/// 설정 로드: 실패 시 기본 설정으로 계속
fn load_config(path: Option<PathBuf>) -> AppConfig {
    let manager = match path {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };
    match manager {
        Ok(manager) => {
            info!("설정 파일: {}", manager.config_path().display());
            manager.get().clone()
        }
        Err(e) => {
            warn!("설정 로드 실패, 기본 설정 사용: {e}");
            AppConfig::default_config()
        }
    }
}

/// CLI 인자로 설정 오버라이드
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(ref server_url) = args.server {
        config.server.base_url = server_url.clone();
    }
    if let Some(ref token_file) = args.token_file {
        config.auth.token_file = Some(token_file.clone());
    }
    if args.no_sockjs {
        config.realtime.sockjs = false;
    }
}

/// 토큰 파일 경로: 미지정 시 설정 디렉토리의 `token.json`
fn token_file(config: &AppConfig) -> Option<PathBuf> {
    config.auth.token_file.clone().or_else(|| {
        ConfigManager::config_dir()
            .ok()
            .map(|dir| dir.join(TOKEN_FILE_NAME))
    })
}

/// 어댑터 생성 + 연결 관리자 조립
fn build_manager(config: &AppConfig) -> Result<ConnectionManager> {
    let tokens: Arc<dyn TokenStore> = Arc::new(PersistedTokenStore::new(
        Some(config.auth.token_env.clone()),
        token_file(config),
    ));
    let beacon = HttpLeaveBeacon::new(
        &config.server.base_url,
        Arc::clone(&tokens),
        config.request_timeout(),
    )
    .context("이탈 알림 클라이언트 생성 실패")?;
    let factory = StompTransportFactory::from_config(config);

    Ok(
        ConnectionManager::new(Arc::new(factory), tokens, Arc::new(beacon))
            .with_settle_delay(config.reconnect_settle()),
    )
}

/// 종료 대기 한도: 종료 요청과 이탈 알림 중 긴 쪽
fn shutdown_grace(config: &AppConfig) -> Duration {
    config.close_timeout().max(config.request_timeout())
}

/// 세션 루프 실행 후 백그라운드 종료 작업 정리
///
/// 런타임이 내려가기 전에 DISCONNECT와 이탈 알림이 끝나도록 기다린다.
async fn run_session<R>(
    session: &mut InterviewSession,
    manager: &ConnectionManager,
    input: R,
    grace: Duration,
) -> Result<ExitReason>
where
    R: AsyncBufRead + Unpin,
{
    let result = session.run(input).await;
    manager.shutdown(grace).await;
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!(
        "rehearse={},rehearse_app={},rehearse_core={},rehearse_network={}",
        args.log_level, args.log_level, args.log_level, args.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    let mut config = load_config(args.config.clone());
    apply_overrides(&mut config, &args);
    config.validate().context("설정 검증 실패")?;
    info!(
        "서버: {} (endpoint {}, sockjs {})",
        config.server.base_url, config.realtime.endpoint, config.realtime.sockjs
    );

    let manager = Arc::new(build_manager(&config)?);
    let mut session = InterviewSession::new(Arc::clone(&manager), &args.session);

    if let Err(e) = session.start().await {
        eprintln!("면접 세션을 시작할 수 없습니다: {e:#}");
        std::process::exit(1);
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    match run_session(&mut session, &manager, stdin, shutdown_grace(&config)).await? {
        ExitReason::Ended => info!("면접 종료"),
        ExitReason::Left => info!("면접 이탈"),
    }
    Ok(())
}
