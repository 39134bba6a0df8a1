//! 이탈 알림(beacon) 포트.

use async_trait::async_trait;
use std::time::Duration;

use crate::models::interview::LeaveNotice;

/// 최선 노력(best-effort) 비차단 알림 전송
///
/// 구현은 요청을 호출자와 분리된 작업으로 띄우고 즉시 반환해야 한다.
/// 요청은 호출자가 정리된 뒤에도 계속 진행될 수 있다.
#[async_trait]
pub trait LeaveBeacon: Send + Sync {
    /// 요청 발송 시 `true` (전달 완료 여부는 보장하지 않음)
    fn dispatch(&self, notice: LeaveNotice) -> bool;

    /// 진행 중인 요청을 최대 `timeout`까지 기다린다 (프로세스 종료 직전 호출)
    async fn drain(&self, _timeout: Duration) {}
}
