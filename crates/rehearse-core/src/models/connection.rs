//! 실시간 연결 상태 모델.

use serde::Serialize;

/// 연결 관리자 상태 스냅샷
///
/// `transport_connected`는 핸들 자체가 보고하는 값이다.
/// `connected`와 다르면 관리자 장부와 실제 전송 계층이 어긋난 상태(desync).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub connecting: bool,
    pub disconnecting: bool,
    pub has_handle: bool,
    pub transport_connected: bool,
}

impl ConnectionStatus {
    /// 관리자 플래그와 전송 계층 상태가 어긋났는지
    pub fn is_desynced(&self) -> bool {
        self.has_handle && self.connected != self.transport_connected
    }

    /// 아무 핸들도 없고 진행 중인 작업도 없는 상태
    pub fn is_idle(&self) -> bool {
        !self.connected && !self.connecting && !self.has_handle
    }
}

/// `connect` 호출 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// 새 핸드셰이크 성공 + 구독 완료
    Connected,
    /// 이미 연결된 핸들 재사용
    AlreadyConnected,
    /// 다른 연결 시도가 진행 중: 중복 시도 없이 즉시 반환
    InProgress,
    /// 핸드셰이크는 성공했으나 그 사이 핸들이 교체됨 (고아 핸들 폐기)
    Superseded,
}

impl ConnectOutcome {
    /// 이 호출로 구독이 활성화되었거나 이미 활성 상태인지
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connected | Self::AlreadyConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_idle() {
        let status = ConnectionStatus::default();
        assert!(status.is_idle());
        assert!(!status.is_desynced());
    }

    #[test]
    fn desync_detected() {
        let status = ConnectionStatus {
            connected: true,
            has_handle: true,
            transport_connected: false,
            ..Default::default()
        };
        assert!(status.is_desynced());
    }

    #[test]
    fn status_serializes_camel_case() {
        let json = serde_json::to_value(ConnectionStatus::default()).unwrap();
        assert_eq!(json["hasHandle"], false);
        assert_eq!(json["transportConnected"], false);
    }
}
