//! tracing 초기화 -- 파이프라인을 내장하는 호스트 프로세스용 헬퍼
//!
//! `[general]` 섹션의 `log_level`, `log_format`에 따라 전역
//! `tracing-subscriber`를 설치합니다. 파이프라인 자체의 진단 로그는
//! 언제나 이 subscriber로 나가며, 파이프라인이 관리하는 로그 파일에는 쓰지 않습니다.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::GeneralConfig;
use crate::error::{ConfigError, LogfluxError};

/// 전역 tracing subscriber를 초기화합니다.
///
/// 프로세스당 한 번만 호출해야 합니다. `RUST_LOG`가 설정되어 있으면
/// `log_level`보다 우선합니다.
///
/// # Formats
///
/// * `"json"` - 기계 판독용 JSON 라인
/// * `"pretty"` - 개발용 사람 친화적 출력
pub fn init_tracing(config: &GeneralConfig) -> Result<(), LogfluxError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = match config.log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "pretty" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        other => {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("unknown log format '{other}', expected 'json' or 'pretty'"),
            }
            .into());
        }
    };

    result.map_err(|e| {
        ConfigError::InvalidValue {
            field: "general".to_owned(),
            reason: format!("failed to initialize tracing subscriber: {e}"),
        }
        .into()
    })
}
