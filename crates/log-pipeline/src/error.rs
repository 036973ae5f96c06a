//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 파이프라인 내부(설정 변환, writer, 회전 등)에서 발생하는
//! 에러를 표현합니다. `From<LogPipelineError> for LogfluxError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.
//!
//! 레코드 단위 처리 중 발생한 에러는 소비자 루프에서 로그로 남기고 카운트할 뿐
//! 생산자에게 전파되지 않습니다.

use logflux_core::error::{LogfluxError, PipelineError};

/// 로그 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// writer 에러 (열기 실패, 매핑 실패 등)
    #[error("writer error: {kind}: {reason}")]
    Writer {
        /// writer 종류 (buffered, ring_buffer, mmap)
        kind: String,
        /// 에러 사유
        reason: String,
    },

    /// 단일 쓰기가 writer 용량을 초과
    #[error("write of {len} bytes exceeds capacity {capacity}")]
    CapacityExceeded {
        /// 요청 길이
        len: u64,
        /// writer 용량
        capacity: u64,
    },

    /// 회전 에러 (디렉토리 생성, 파일 이름 확보 실패 등)
    #[error("rotation error: {0}")]
    Rotation(String),
}

impl From<LogPipelineError> for LogfluxError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Io(e) => LogfluxError::Io(e),
            other => LogfluxError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = LogPipelineError::Config {
            field: "queue_capacity".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("queue_capacity"));
        assert!(msg.contains("greater than 0"));
    }

    #[test]
    fn capacity_exceeded_display() {
        let err = LogPipelineError::CapacityExceeded {
            len: 4096,
            capacity: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn converts_to_logflux_error() {
        let err = LogPipelineError::Rotation("no free file name".to_owned());
        let converted: LogfluxError = err.into();
        assert!(matches!(
            converted,
            LogfluxError::Pipeline(PipelineError::InitFailed(_))
        ));
    }

    #[test]
    fn io_error_keeps_io_variant() {
        let err = LogPipelineError::Io(std::io::Error::other("disk gone"));
        let converted: LogfluxError = err.into();
        assert!(matches!(converted, LogfluxError::Io(_)));
    }

    #[test]
    fn regex_error_from() {
        let err: LogPipelineError = regex::Regex::new("(unclosed").unwrap_err().into();
        assert!(err.to_string().starts_with("regex error"));
    }
}
