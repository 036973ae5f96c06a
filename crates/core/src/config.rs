//! 설정 관리 -- logflux.toml 파싱 및 런타임 설정
//!
//! [`LogfluxConfig`]는 파이프라인 전체 설정을 담는 최상위 구조체입니다.
//! 열거형 성격의 값(회전 패턴, 백프레셔 전략 등)은 문자열로 보관하고,
//! 파이프라인 크레이트가 타입으로 변환하면서 알 수 없는 값은 기본값으로 대체합니다.
//!
//! # 설정 로딩 우선순위
//! 1. 환경변수 (`LOGFLUX_ROTATION_PATTERN=hourly` 형식)
//! 2. 설정 파일 (`logflux.toml`)
//! 3. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logflux_core::error::LogfluxError> {
//! use logflux_core::config::LogfluxConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogfluxConfig::load("logflux.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogfluxConfig::parse("[rotation]\npattern = \"hourly\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogfluxError};

/// logflux 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogfluxConfig {
    /// 호스트 프로세스의 tracing 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수신 큐 및 오케스트레이터 설정
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// 회전 정책
    #[serde(default)]
    pub rotation: RotationSection,
    /// 보존 정책
    #[serde(default)]
    pub retention: RetentionSection,
    /// 버퍼링 계층
    #[serde(default)]
    pub writer: WriterSection,
    /// 정규식 필터
    #[serde(default)]
    pub filter: FilterSection,
    /// 샘플링
    #[serde(default)]
    pub sampling: SamplingSection,
    /// 백프레셔
    #[serde(default)]
    pub backpressure: BackpressureSection,
    /// 브로드캐스트 스트림
    #[serde(default)]
    pub broadcast: BroadcastSection,
}

impl LogfluxConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogfluxError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogfluxError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogfluxError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogfluxError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogfluxError> {
        toml::from_str(toml_str).map_err(|e| {
            LogfluxError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGFLUX_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGFLUX_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGFLUX_GENERAL_LOG_FORMAT");

        // Pipeline
        override_usize(
            &mut self.pipeline.queue_capacity,
            "LOGFLUX_PIPELINE_QUEUE_CAPACITY",
        );
        override_string(&mut self.pipeline.min_level, "LOGFLUX_PIPELINE_MIN_LEVEL");
        override_string(&mut self.pipeline.log_dir, "LOGFLUX_PIPELINE_LOG_DIR");
        override_string(&mut self.pipeline.file_prefix, "LOGFLUX_PIPELINE_FILE_PREFIX");
        override_bool(
            &mut self.pipeline.masking_enabled,
            "LOGFLUX_PIPELINE_MASKING_ENABLED",
        );
        override_bool(
            &mut self.pipeline.streaming_enabled,
            "LOGFLUX_PIPELINE_STREAMING_ENABLED",
        );
        override_u64(
            &mut self.pipeline.shutdown_timeout_ms,
            "LOGFLUX_PIPELINE_SHUTDOWN_TIMEOUT_MS",
        );

        // Rotation / Retention
        override_string(&mut self.rotation.policy, "LOGFLUX_ROTATION_POLICY");
        override_string(&mut self.rotation.pattern, "LOGFLUX_ROTATION_PATTERN");
        override_u64(&mut self.rotation.max_bytes, "LOGFLUX_ROTATION_MAX_BYTES");
        override_bool(&mut self.rotation.compress, "LOGFLUX_ROTATION_COMPRESS");
        override_u32(
            &mut self.retention.max_history_days,
            "LOGFLUX_RETENTION_MAX_HISTORY_DAYS",
        );
        override_usize(&mut self.retention.max_files, "LOGFLUX_RETENTION_MAX_FILES");
        override_u64(
            &mut self.retention.total_size_cap_bytes,
            "LOGFLUX_RETENTION_TOTAL_SIZE_CAP_BYTES",
        );

        // Writer
        override_string(&mut self.writer.kind, "LOGFLUX_WRITER_KIND");
        override_usize(
            &mut self.writer.buffer_capacity,
            "LOGFLUX_WRITER_BUFFER_CAPACITY",
        );
        override_u64(
            &mut self.writer.flush_interval_ms,
            "LOGFLUX_WRITER_FLUSH_INTERVAL_MS",
        );

        // Filter / Sampling
        override_csv(
            &mut self.filter.include_patterns,
            "LOGFLUX_FILTER_INCLUDE_PATTERNS",
        );
        override_csv(
            &mut self.filter.exclude_patterns,
            "LOGFLUX_FILTER_EXCLUDE_PATTERNS",
        );
        override_string(&mut self.sampling.strategy, "LOGFLUX_SAMPLING_STRATEGY");
        override_f64(&mut self.sampling.rate, "LOGFLUX_SAMPLING_RATE");

        // Backpressure
        override_bool(&mut self.backpressure.enabled, "LOGFLUX_BACKPRESSURE_ENABLED");
        override_string(&mut self.backpressure.strategy, "LOGFLUX_BACKPRESSURE_STRATEGY");
        override_usize(
            &mut self.backpressure.high_watermark,
            "LOGFLUX_BACKPRESSURE_HIGH_WATERMARK",
        );
        override_usize(
            &mut self.backpressure.low_watermark,
            "LOGFLUX_BACKPRESSURE_LOW_WATERMARK",
        );

        // Broadcast
        override_usize(&mut self.broadcast.replay_size, "LOGFLUX_BROADCAST_REPLAY_SIZE");
        override_string(&mut self.broadcast.min_level, "LOGFLUX_BROADCAST_MIN_LEVEL");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 전략/패턴 문자열은 여기서 거부하지 않습니다. 파이프라인이 기본값으로 대체합니다.
    pub fn validate(&self) -> Result<(), LogfluxError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.queue_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.pipeline.log_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.log_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정 (호스트 프로세스 tracing)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 수신 큐 및 오케스트레이터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// 수신 큐 최대 용량
    pub queue_capacity: usize,
    /// 최소 기록 레벨 (debug, info, warn, error, fatal)
    pub min_level: String,
    /// 로그 디렉토리
    pub log_dir: String,
    /// 파일 이름 접두어
    pub file_prefix: String,
    /// 마스킹 활성화
    pub masking_enabled: bool,
    /// 브로드캐스트 활성화
    pub streaming_enabled: bool,
    /// 정지 시 최대 대기 시간 (밀리초)
    pub shutdown_timeout_ms: u64,
    /// SUSPEND 전략에서 프로듀서 최대 대기 시간 (밀리초)
    pub suspend_timeout_ms: u64,
    /// 소비 루프 유휴 주기 (밀리초)
    pub flush_check_interval_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            min_level: "info".to_owned(),
            log_dir: "logs".to_owned(),
            file_prefix: "app".to_owned(),
            masking_enabled: false,
            streaming_enabled: true,
            shutdown_timeout_ms: 5_000,
            suspend_timeout_ms: 100,
            flush_check_interval_ms: 200,
        }
    }
}

/// 회전 정책 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSection {
    /// 정책 (time, size, composite)
    pub policy: String,
    /// 시간 패턴 (hourly, daily, weekly, monthly)
    pub pattern: String,
    /// 크기 기준 (바이트)
    pub max_bytes: u64,
    /// 회전된 파일 압축 여부
    pub compress: bool,
}

impl Default for RotationSection {
    fn default() -> Self {
        Self {
            policy: "time".to_owned(),
            pattern: "daily".to_owned(),
            max_bytes: 100 * 1024 * 1024,
            compress: true,
        }
    }
}

/// 보존 정책 설정 (0은 제한 없음)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSection {
    /// 최대 보존 일수
    pub max_history_days: u32,
    /// 최대 파일 수
    pub max_files: usize,
    /// 전체 크기 상한 (바이트)
    pub total_size_cap_bytes: u64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            max_history_days: 30,
            max_files: 50,
            total_size_cap_bytes: 10 * 1024 * 1024 * 1024,
        }
    }
}

/// 버퍼링 계층 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterSection {
    /// 전략 (buffered, ring, mmap)
    pub kind: String,
    /// 버퍼 용량 (바이트)
    pub buffer_capacity: usize,
    /// 자동 플러시 간격 (밀리초)
    pub flush_interval_ms: u64,
    /// 매 쓰기 후 플러시
    pub auto_flush: bool,
    /// 링 버퍼 용량 (바이트)
    pub ring_capacity: usize,
    /// 메모리 맵 파일 최대 크기 (바이트)
    pub mmap_max_size: u64,
}

impl Default for WriterSection {
    fn default() -> Self {
        Self {
            kind: "buffered".to_owned(),
            buffer_capacity: 64 * 1024,
            flush_interval_ms: 1_000,
            auto_flush: false,
            ring_capacity: 1024 * 1024,
            mmap_max_size: 64 * 1024 * 1024,
        }
    }
}

/// 정규식 필터 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSection {
    /// 포함 패턴 (하나 이상 매칭해야 통과)
    pub include_patterns: Vec<String>,
    /// 제외 패턴 (하나라도 매칭하면 거부)
    pub exclude_patterns: Vec<String>,
}

/// 샘플링 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSection {
    /// 전략 (random, systematic, adaptive, burst)
    pub strategy: String,
    /// 샘플링 비율 (0.0 ~ 1.0)
    pub rate: f64,
    /// 에러 부스트 윈도우 (밀리초)
    pub boost_duration_ms: u64,
}

impl Default for SamplingSection {
    fn default() -> Self {
        Self {
            strategy: "random".to_owned(),
            rate: 1.0,
            boost_duration_ms: 30_000,
        }
    }
}

/// 백프레셔 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackpressureSection {
    /// 활성화 여부
    pub enabled: bool,
    /// 전략 (drop_new, drop_oldest, suspend, block, keep_latest)
    pub strategy: String,
    /// 상한 워터마크
    pub high_watermark: usize,
    /// 하한 워터마크
    pub low_watermark: usize,
}

impl Default for BackpressureSection {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: "suspend".to_owned(),
            high_watermark: 8_000,
            low_watermark: 2_000,
        }
    }
}

/// 브로드캐스트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSection {
    /// 늦게 붙은 구독자에게 재생할 레코드 수
    pub replay_size: usize,
    /// 실시간 구독자 지연 허용 레코드 수
    pub live_capacity: usize,
    /// 브로드캐스트 최소 레벨
    pub min_level: String,
}

impl Default for BroadcastSection {
    fn default() -> Self {
        Self {
            replay_size: 100,
            live_capacity: 1_024,
            min_level: "debug".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_f64(target: &mut f64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<f64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse f64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = LogfluxConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.rotation.pattern, "daily");
        assert_eq!(config.backpressure.strategy, "suspend");
        assert!(config.backpressure.low_watermark < config.backpressure.high_watermark);
        assert_eq!(config.sampling.rate, 1.0);
    }

    #[test]
    fn default_config_passes_validation() {
        LogfluxConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = LogfluxConfig::parse("").unwrap();
        assert_eq!(config.pipeline.queue_capacity, 10_000);
        assert_eq!(config.writer.kind, "buffered");
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[rotation]
policy = "composite"
pattern = "hourly"
max_bytes = 1048576

[sampling]
strategy = "burst"
rate = 0.25
"#;
        let config = LogfluxConfig::parse(toml).unwrap();
        assert_eq!(config.rotation.policy, "composite");
        assert_eq!(config.rotation.max_bytes, 1_048_576);
        // compress는 기본값 유지
        assert!(config.rotation.compress);
        assert_eq!(config.sampling.strategy, "burst");
        assert_eq!(config.sampling.rate, 0.25);
    }

    #[test]
    fn from_str_unknown_strategy_is_not_a_parse_error() {
        let toml = r#"
[backpressure]
strategy = "yolo"
"#;
        let config = LogfluxConfig::parse(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.backpressure.strategy, "yolo");
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = LogfluxConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            LogfluxError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = LogfluxConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_zero_queue_capacity() {
        let mut config = LogfluxConfig::default();
        config.pipeline.queue_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    #[serial]
    fn env_override_applies_to_sections() {
        // SAFETY: serial 테스트로 실행되어 다른 테스트와 환경변수를 공유하지 않습니다.
        unsafe {
            std::env::set_var("LOGFLUX_ROTATION_PATTERN", "weekly");
            std::env::set_var("LOGFLUX_SAMPLING_RATE", "0.5");
            std::env::set_var("LOGFLUX_FILTER_EXCLUDE_PATTERNS", "health, ping ,");
        }
        let mut config = LogfluxConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.rotation.pattern, "weekly");
        assert_eq!(config.sampling.rate, 0.5);
        assert_eq!(config.filter.exclude_patterns, vec!["health", "ping"]);
        unsafe {
            std::env::remove_var("LOGFLUX_ROTATION_PATTERN");
            std::env::remove_var("LOGFLUX_SAMPLING_RATE");
            std::env::remove_var("LOGFLUX_FILTER_EXCLUDE_PATTERNS");
        }
    }

    #[test]
    #[serial]
    fn env_override_invalid_number_keeps_original() {
        let mut val = 7usize;
        // SAFETY: serial 테스트로 실행되어 다른 테스트와 환경변수를 공유하지 않습니다.
        unsafe { std::env::set_var("TEST_LOGFLUX_USIZE_BAD", "seven") };
        override_usize(&mut val, "TEST_LOGFLUX_USIZE_BAD");
        assert_eq!(val, 7);
        unsafe { std::env::remove_var("TEST_LOGFLUX_USIZE_BAD") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_LOGFLUX_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = LogfluxConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = LogfluxConfig::parse(&toml_str).unwrap();
        assert_eq!(config.rotation.pattern, parsed.rotation.pattern);
        assert_eq!(config.retention.max_files, parsed.retention.max_files);
        assert_eq!(config.writer.mmap_max_size, parsed.writer.mmap_max_size);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = LogfluxConfig::from_file("/nonexistent/path/logflux.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LogfluxError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
