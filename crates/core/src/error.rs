//! 에러 타입 -- 도메인별 에러 정의

/// logflux 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogfluxError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 파이프라인 초기화 실패 (복구 불가)
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 수신 큐가 닫힘
    #[error("admission queue closed")]
    ChannelClosed,
}

/// 파싱 에러
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// 파싱 실패
    #[error("parse failed at offset {offset}: {reason}")]
    Failed { offset: usize, reason: String },

    /// 입력 데이터 초과
    #[error("input too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// UTF-8이 아닌 입력
    #[error("invalid utf-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: LogfluxError = ConfigError::InvalidValue {
            field: "rotation.pattern".to_owned(),
            reason: "unknown".to_owned(),
        }
        .into();
        assert!(matches!(err, LogfluxError::Config(_)));
        assert!(err.to_string().contains("rotation.pattern"));
    }

    #[test]
    fn parse_error_display_includes_offset() {
        let err = ParseError::Failed {
            offset: 17,
            reason: "missing level".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("17"));
        assert!(msg.contains("missing level"));
    }

    #[test]
    fn pipeline_error_display() {
        let err: LogfluxError = PipelineError::InitFailed("cannot map".to_owned()).into();
        assert!(err.to_string().contains("cannot map"));
    }
}
