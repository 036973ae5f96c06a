//! 파이프라인 trait -- 생명주기 및 확장 포인트 정의

use std::future::Future;

use crate::error::LogfluxError;
use crate::types::LogRecord;

/// 컴포넌트 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하 (사유 포함)
    Degraded(String),
    /// 동작 불가 (사유 포함)
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 시작/정지/헬스 체크 생명주기를 가진 파이프라인
///
/// 프로세스 시작 시 한 번 생성되어 핸들로 전달되는 인스턴스를 위한 trait입니다.
pub trait Pipeline: Send {
    /// 파이프라인을 시작합니다. 이미 실행 중이면 에러를 반환합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), LogfluxError>> + Send;

    /// 파이프라인을 정지합니다 (graceful drain + flush).
    fn stop(&mut self) -> impl Future<Output = Result<(), LogfluxError>> + Send;

    /// 현재 헬스 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// 로그 파서 trait
///
/// 새로운 디스크 포맷을 지원하려면 이 trait을 구현합니다.
pub trait LogParser: Send + Sync {
    /// 지원하는 포맷 이름
    fn format_name(&self) -> &str;

    /// 원시 바이트를 로그 레코드로 파싱
    fn parse(&self, raw: &[u8]) -> Result<LogRecord, LogfluxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_predicates() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(HealthStatus::Degraded("queue high".to_owned()).is_degraded());
        assert!(HealthStatus::Unhealthy("stopped".to_owned()).is_unhealthy());
        assert!(!HealthStatus::Healthy.is_unhealthy());
    }
}
