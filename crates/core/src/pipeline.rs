//! 파이프라인 trait: 모듈 생명주기 정의

use std::future::Future;

use serde::Serialize;

use crate::error::IronlogError;

/// 모듈 상태 보고
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// 정상 동작
    Healthy,
    /// 일부 기능 저하 (사유 포함)
    Degraded(String),
    /// 동작 불가 (사유 포함)
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 기능 저하 상태인지 확인합니다.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 데몬이 관리하는 모듈의 생명주기 trait
///
/// `start` → `health_check`* → `stop` 순서로 호출됩니다.
/// 이미 실행 중인 모듈의 `start`는 [`PipelineError::AlreadyRunning`],
/// 실행 중이 아닌 모듈의 `stop`은 [`PipelineError::NotRunning`]을 반환해야 합니다.
///
/// [`PipelineError::AlreadyRunning`]: crate::error::PipelineError::AlreadyRunning
/// [`PipelineError::NotRunning`]: crate::error::PipelineError::NotRunning
pub trait Pipeline: Send {
    /// 모듈을 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), IronlogError>> + Send;

    /// 모듈을 정지합니다. 남은 작업은 반환 전에 정리되어야 합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), IronlogError>> + Send;

    /// 현재 상태를 보고합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_predicates() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(HealthStatus::Degraded("udp down".to_owned()).is_degraded());
        assert!(HealthStatus::Unhealthy("stopped".to_owned()).is_unhealthy());
        assert!(!HealthStatus::Healthy.is_unhealthy());
    }

    #[test]
    fn health_status_serializes() {
        let json = serde_json::to_string(&HealthStatus::Degraded("x".to_owned())).unwrap();
        assert_eq!(json, r#"{"Degraded":"x"}"#);
    }
}
