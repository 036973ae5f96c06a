//! 로그 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 문자열 기반 [`LogfluxConfig`]를 파이프라인 내부에서
//! 쓰는 타입으로 변환한 것입니다. 알 수 없는 문자열 값은 시작을 실패시키지 않고
//! 문서화된 기본값으로 대체하며 경고를 남깁니다.
//!
//! | 항목 | 대체값 |
//! |---|---|
//! | 회전 정책/패턴 | time / daily |
//! | 백프레셔 전략 | suspend |
//! | 샘플링 전략 | random |
//! | writer 종류 | buffered |
//! | 레벨 | info (브로드캐스트는 debug) |
//!
//! # 사용 예시
//! ```ignore
//! use logflux_core::config::LogfluxConfig;
//! use logflux_log_pipeline::config::PipelineConfig;
//!
//! let core_config = LogfluxConfig::load("logflux.toml").await?;
//! let config = PipelineConfig::from_core(&core_config);
//! config.validate()?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use logflux_core::config::LogfluxConfig;
use logflux_core::types::LogLevel;

use crate::backpressure::BackpressureStrategy;
use crate::buffer::WriterKind;
use crate::error::LogPipelineError;
use crate::filter::SamplingStrategy;
use crate::rotation::{RetentionConfig, RotationPolicy, TimePattern};

/// 로그 파이프라인 설정
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// 수신 큐 하드 용량
    pub queue_capacity: usize,
    /// 최소 기록 레벨
    pub min_level: LogLevel,
    pub log_dir: PathBuf,
    pub file_prefix: String,
    pub masking_enabled: bool,
    pub streaming_enabled: bool,
    pub shutdown_timeout: Duration,
    /// SUSPEND 전략에서 생산자 최대 대기 시간
    pub suspend_timeout: Duration,
    /// 소비 루프 유휴 주기 (writer `flush_if_due` 호출 간격)
    pub flush_check_interval: Duration,

    pub rotation: RotationPolicy,
    pub compress: bool,
    pub retention: RetentionConfig,

    pub writer: WriterKind,

    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub sampling_strategy: SamplingStrategy,
    pub sampling_rate: f64,
    pub boost_duration: Duration,

    pub backpressure_enabled: bool,
    pub backpressure_strategy: BackpressureStrategy,
    pub high_watermark: usize,
    pub low_watermark: usize,

    /// 새 구독자에게 재생할 레코드 수
    pub replay_size: usize,
    /// 구독자별 실시간 지연 허용량
    pub live_capacity: usize,
    pub broadcast_min_level: LogLevel,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_core(&LogfluxConfig::default())
    }
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &LogfluxConfig) -> Self {
        let pattern = TimePattern::parse_or_default(&core.rotation.pattern);
        let rotation = match core.rotation.policy.trim().to_ascii_lowercase().as_str() {
            "time" | "time_based" => RotationPolicy::TimeBased { pattern },
            "size" | "size_based" => RotationPolicy::SizeBased {
                max_bytes: core.rotation.max_bytes,
            },
            "composite" => RotationPolicy::Composite {
                pattern,
                max_bytes: core.rotation.max_bytes,
            },
            other => {
                tracing::warn!(value = other, "unknown rotation policy, falling back to daily time-based");
                RotationPolicy::TimeBased {
                    pattern: TimePattern::Daily,
                }
            }
        };

        let writer = match core.writer.kind.trim().to_ascii_lowercase().as_str() {
            "buffered" => buffered_writer(core),
            "ring" | "ring_buffer" | "ringbuffer" => WriterKind::RingBuffer {
                capacity: core.writer.ring_capacity,
            },
            "mmap" | "memory_mapped" => WriterKind::MemoryMapped {
                max_size: core.writer.mmap_max_size,
            },
            other => {
                tracing::warn!(value = other, "unknown writer kind, falling back to buffered");
                buffered_writer(core)
            }
        };

        let sampling_strategy = SamplingStrategy::from_str_loose(&core.sampling.strategy)
            .unwrap_or_else(|| {
                tracing::warn!(
                    value = %core.sampling.strategy,
                    "unknown sampling strategy, falling back to random"
                );
                SamplingStrategy::Random
            });

        Self {
            queue_capacity: core.pipeline.queue_capacity,
            min_level: level_or(&core.pipeline.min_level, LogLevel::Info, "pipeline.min_level"),
            log_dir: PathBuf::from(&core.pipeline.log_dir),
            file_prefix: core.pipeline.file_prefix.clone(),
            masking_enabled: core.pipeline.masking_enabled,
            streaming_enabled: core.pipeline.streaming_enabled,
            shutdown_timeout: Duration::from_millis(core.pipeline.shutdown_timeout_ms),
            suspend_timeout: Duration::from_millis(core.pipeline.suspend_timeout_ms),
            flush_check_interval: Duration::from_millis(core.pipeline.flush_check_interval_ms),
            rotation,
            compress: core.rotation.compress,
            retention: RetentionConfig {
                max_history_days: core.retention.max_history_days,
                max_files: core.retention.max_files,
                total_size_cap_bytes: core.retention.total_size_cap_bytes,
            },
            writer,
            include_patterns: core.filter.include_patterns.clone(),
            exclude_patterns: core.filter.exclude_patterns.clone(),
            sampling_strategy,
            sampling_rate: core.sampling.rate,
            boost_duration: Duration::from_millis(core.sampling.boost_duration_ms),
            backpressure_enabled: core.backpressure.enabled,
            backpressure_strategy: BackpressureStrategy::parse_or_default(
                &core.backpressure.strategy,
            ),
            high_watermark: core.backpressure.high_watermark,
            low_watermark: core.backpressure.low_watermark,
            replay_size: core.broadcast.replay_size,
            live_capacity: core.broadcast.live_capacity,
            broadcast_min_level: level_or(
                &core.broadcast.min_level,
                LogLevel::Debug,
                "broadcast.min_level",
            ),
        }
    }

    /// 구조적으로 불가능한 설정을 거부합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be greater than 0"));
        }
        if self.file_prefix.trim().is_empty() {
            return Err(invalid("file_prefix", "must not be empty"));
        }
        if self.file_prefix.contains(['/', '\\']) {
            return Err(invalid("file_prefix", "must not contain path separators"));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(invalid("log_dir", "must not be empty"));
        }
        if self.flush_check_interval.is_zero() {
            return Err(invalid("flush_check_interval", "must be greater than 0"));
        }
        if self.high_watermark == 0 {
            return Err(invalid("high_watermark", "must be greater than 0"));
        }
        if self.low_watermark >= self.high_watermark {
            return Err(invalid(
                "low_watermark",
                &format!(
                    "must be below high_watermark ({} >= {})",
                    self.low_watermark, self.high_watermark
                ),
            ));
        }

        match self.rotation {
            RotationPolicy::SizeBased { max_bytes } | RotationPolicy::Composite { max_bytes, .. }
                if max_bytes == 0 =>
            {
                return Err(invalid("rotation.max_bytes", "must be greater than 0"));
            }
            _ => {}
        }

        match &self.writer {
            WriterKind::Buffered { capacity, .. } if *capacity == 0 => {
                return Err(invalid("writer.buffer_capacity", "must be greater than 0"));
            }
            WriterKind::RingBuffer { capacity } if *capacity == 0 => {
                return Err(invalid("writer.ring_capacity", "must be greater than 0"));
            }
            WriterKind::MemoryMapped { max_size } if *max_size == 0 => {
                return Err(invalid("writer.mmap_max_size", "must be greater than 0"));
            }
            _ => {}
        }

        Ok(())
    }
}

fn buffered_writer(core: &LogfluxConfig) -> WriterKind {
    WriterKind::Buffered {
        capacity: core.writer.buffer_capacity,
        flush_interval: Duration::from_millis(core.writer.flush_interval_ms),
        auto_flush: core.writer.auto_flush,
    }
}

fn level_or(value: &str, fallback: LogLevel, field: &str) -> LogLevel {
    LogLevel::from_str_loose(value).unwrap_or_else(|| {
        tracing::warn!(setting = field, value, fallback = %fallback, "unknown log level, using fallback");
        fallback
    })
}

fn invalid(field: &str, reason: &str) -> LogPipelineError {
    LogPipelineError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.config.min_level = level;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    pub fn masking_enabled(mut self, enabled: bool) -> Self {
        self.config.masking_enabled = enabled;
        self
    }

    pub fn streaming_enabled(mut self, enabled: bool) -> Self {
        self.config.streaming_enabled = enabled;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    pub fn suspend_timeout(mut self, timeout: Duration) -> Self {
        self.config.suspend_timeout = timeout;
        self
    }

    pub fn flush_check_interval(mut self, interval: Duration) -> Self {
        self.config.flush_check_interval = interval;
        self
    }

    pub fn rotation(mut self, policy: RotationPolicy) -> Self {
        self.config.rotation = policy;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.config.compress = compress;
        self
    }

    pub fn retention(mut self, retention: RetentionConfig) -> Self {
        self.config.retention = retention;
        self
    }

    pub fn writer(mut self, writer: WriterKind) -> Self {
        self.config.writer = writer;
        self
    }

    pub fn include_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.include_patterns = patterns;
        self
    }

    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.exclude_patterns = patterns;
        self
    }

    pub fn sampling(mut self, strategy: SamplingStrategy, rate: f64) -> Self {
        self.config.sampling_strategy = strategy;
        self.config.sampling_rate = rate;
        self
    }

    pub fn boost_duration(mut self, duration: Duration) -> Self {
        self.config.boost_duration = duration;
        self
    }

    /// 백프레셔 전략과 watermark를 설정합니다.
    pub fn backpressure(mut self, strategy: BackpressureStrategy, high: usize, low: usize) -> Self {
        self.config.backpressure_strategy = strategy;
        self.config.high_watermark = high;
        self.config.low_watermark = low;
        self
    }

    pub fn backpressure_enabled(mut self, enabled: bool) -> Self {
        self.config.backpressure_enabled = enabled;
        self
    }

    pub fn broadcast(mut self, replay_size: usize, live_capacity: usize, min_level: LogLevel) -> Self {
        self.config.replay_size = replay_size;
        self.config.live_capacity = live_capacity;
        self.config.broadcast_min_level = min_level;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.queue_capacity, 10_000);
        assert_eq!(config.min_level, LogLevel::Info);
        assert_eq!(
            config.rotation,
            RotationPolicy::TimeBased {
                pattern: TimePattern::Daily
            }
        );
        assert_eq!(config.backpressure_strategy, BackpressureStrategy::Suspend);
        assert!(matches!(config.writer, WriterKind::Buffered { .. }));
    }

    #[test]
    fn from_core_converts_strings() {
        let mut core = LogfluxConfig::default();
        core.rotation.policy = "composite".to_owned();
        core.rotation.pattern = "hourly".to_owned();
        core.rotation.max_bytes = 4096;
        core.writer.kind = "mmap".to_owned();
        core.writer.mmap_max_size = 1 << 20;
        core.sampling.strategy = "burst".to_owned();
        core.backpressure.strategy = "drop-oldest".to_owned();
        core.pipeline.min_level = "warning".to_owned();

        let config = PipelineConfig::from_core(&core);
        assert_eq!(
            config.rotation,
            RotationPolicy::Composite {
                pattern: TimePattern::Hourly,
                max_bytes: 4096
            }
        );
        assert_eq!(config.writer, WriterKind::MemoryMapped { max_size: 1 << 20 });
        assert_eq!(config.sampling_strategy, SamplingStrategy::Burst);
        assert_eq!(config.backpressure_strategy, BackpressureStrategy::DropOldest);
        assert_eq!(config.min_level, LogLevel::Warn);
    }

    #[test]
    fn unknown_strings_fall_back() {
        let mut core = LogfluxConfig::default();
        core.rotation.policy = "lunar".to_owned();
        core.writer.kind = "carrier-pigeon".to_owned();
        core.sampling.strategy = "vibes".to_owned();
        core.backpressure.strategy = "panic".to_owned();
        core.pipeline.min_level = "loud".to_owned();
        core.broadcast.min_level = "??".to_owned();

        let config = PipelineConfig::from_core(&core);
        assert_eq!(
            config.rotation,
            RotationPolicy::TimeBased {
                pattern: TimePattern::Daily
            }
        );
        assert!(matches!(config.writer, WriterKind::Buffered { .. }));
        assert_eq!(config.sampling_strategy, SamplingStrategy::Random);
        assert_eq!(config.backpressure_strategy, BackpressureStrategy::Suspend);
        assert_eq!(config.min_level, LogLevel::Info);
        assert_eq!(config.broadcast_min_level, LogLevel::Debug);
        config.validate().unwrap();
    }

    #[test]
    fn watermarks_must_be_ordered() {
        let err = PipelineConfigBuilder::new()
            .backpressure(BackpressureStrategy::DropNew, 100, 100)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("low_watermark"));
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(PipelineConfigBuilder::new().queue_capacity(0).build().is_err());
        assert!(
            PipelineConfigBuilder::new()
                .writer(WriterKind::RingBuffer { capacity: 0 })
                .build()
                .is_err()
        );
        assert!(
            PipelineConfigBuilder::new()
                .rotation(RotationPolicy::SizeBased { max_bytes: 0 })
                .build()
                .is_err()
        );
    }

    #[test]
    fn prefix_must_be_a_plain_name() {
        assert!(PipelineConfigBuilder::new().file_prefix("").build().is_err());
        assert!(
            PipelineConfigBuilder::new()
                .file_prefix("../escape")
                .build()
                .is_err()
        );
    }

    #[test]
    fn builder_sets_fields() {
        let config = PipelineConfigBuilder::new()
            .queue_capacity(64)
            .log_dir("/tmp/logflux-test")
            .file_prefix("svc")
            .sampling(SamplingStrategy::Systematic, 0.5)
            .broadcast(10, 100, LogLevel::Warn)
            .build()
            .unwrap();
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/logflux-test"));
        assert_eq!(config.file_prefix, "svc");
        assert_eq!(config.sampling_strategy, SamplingStrategy::Systematic);
        assert_eq!(config.replay_size, 10);
        assert_eq!(config.broadcast_min_level, LogLevel::Warn);
    }
}
