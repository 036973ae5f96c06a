//! 회전 관리자 -- 활성 파일 결정, 회전 트리거, 압축, 보존
//!
//! # 상태 전이
//! ```text
//! NoFile --current_file()--> Active --(trigger)--> Active(new) --> ...
//! ```
//!
//! 회전 시 순서:
//! 1. 새 파일 이름 확보
//! 2. `finalize` 콜백으로 이전 파일을 닫게 함 (writer flush/close)
//! 3. 압축 (설정 시)
//! 4. 보존 정책 적용
//!
//! 크기는 [`RotationManager::increment_size`]로만 갱신하며 쓰기마다 파일을 stat하지 않습니다.

pub mod compress;
pub mod naming;
pub mod retention;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};

use logflux_core::metrics as m;

use crate::error::LogPipelineError;

pub use compress::{CompressionOutcome, compress_file};
pub use naming::TimePattern;
pub use retention::{RetentionConfig, RetentionReport};

/// 현재 시각 공급자
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 시스템 시계
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 테스트용 수동 시계
#[derive(Debug)]
pub struct ManualClock {
    micros: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            micros: AtomicI64::new(start.timestamp_micros()),
        }
    }

    pub fn advance(&self, delta: TimeDelta) {
        let micros = delta.num_microseconds().unwrap_or(i64::MAX);
        self.micros.fetch_add(micros, Ordering::AcqRel);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.micros.store(at.timestamp_micros(), Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.micros.load(Ordering::Acquire)).unwrap_or_default()
    }
}

/// 회전 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    /// 파일 생성 후 주기가 지나면 회전
    TimeBased { pattern: TimePattern },
    /// 누적 크기가 한도 이상이면 회전
    SizeBased { max_bytes: u64 },
    /// 둘 중 하나라도 만족하면 회전
    Composite { pattern: TimePattern, max_bytes: u64 },
}

impl RotationPolicy {
    /// 파일 이름에 쓰는 패턴. 크기 전용 정책은 DAILY 형식을 씁니다.
    pub fn naming_pattern(&self) -> TimePattern {
        match self {
            Self::TimeBased { pattern } | Self::Composite { pattern, .. } => *pattern,
            Self::SizeBased { .. } => TimePattern::Daily,
        }
    }

    /// 트리거 평가
    pub fn is_triggered(&self, state: &RotationState, now: DateTime<Utc>) -> bool {
        let elapsed = now.signed_duration_since(state.opened_at);
        match self {
            Self::TimeBased { pattern } => elapsed >= pattern.period(),
            Self::SizeBased { max_bytes } => state.size >= *max_bytes,
            Self::Composite { pattern, max_bytes } => {
                elapsed >= pattern.period() || state.size >= *max_bytes
            }
        }
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::TimeBased {
            pattern: TimePattern::Daily,
        }
    }
}

/// 활성 파일 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationState {
    pub path: PathBuf,
    pub opened_at: DateTime<Utc>,
    pub size: u64,
}

/// 한 번의 회전 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    /// 물러난 파일 (첫 파일 결정 시 None)
    pub retired: Option<PathBuf>,
    pub new_file: PathBuf,
    pub compression: CompressionOutcome,
    pub retention: RetentionReport,
}

/// 회전 관리자
pub struct RotationManager {
    dir: PathBuf,
    prefix: String,
    policy: RotationPolicy,
    retention: RetentionConfig,
    compress: bool,
    clock: Arc<dyn Clock>,
    state: Option<RotationState>,
    force_rotation: bool,
    rotation_count: u64,
    last_report: Option<RotationReport>,
}

impl RotationManager {
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        policy: RotationPolicy,
        retention: RetentionConfig,
        compress: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            policy,
            retention,
            compress,
            clock,
            state: None,
            force_rotation: false,
            rotation_count: 0,
            last_report: None,
        }
    }

    /// 현재 파일을 반환합니다. 필요하면 회전합니다.
    pub fn current_file(&mut self) -> Result<PathBuf, LogPipelineError> {
        self.current_file_with(|_| {})
    }

    /// 현재 파일을 반환합니다. 회전하면 압축 전에 `finalize`를 물러나는 경로로 호출합니다.
    pub fn current_file_with(
        &mut self,
        finalize: impl FnOnce(&Path),
    ) -> Result<PathBuf, LogPipelineError> {
        if !self.should_rotate()
            && let Some(state) = &self.state
        {
            return Ok(state.path.clone());
        }
        self.rotate(finalize)
    }

    /// 다음 `current_file`에서 회전해야 하는지 확인합니다.
    pub fn should_rotate(&self) -> bool {
        match &self.state {
            None => true,
            Some(state) => {
                self.force_rotation || self.policy.is_triggered(state, self.clock.now())
            }
        }
    }

    /// 다음 결정 시 정책과 무관하게 회전하도록 표시합니다.
    pub fn request_rotation(&mut self) {
        self.force_rotation = true;
    }

    /// 활성 파일에 `bytes`가 추가되었음을 기록합니다.
    pub fn increment_size(&mut self, bytes: u64) {
        if let Some(state) = self.state.as_mut() {
            state.size = state.size.saturating_add(bytes);
        }
    }

    pub fn state(&self) -> Option<&RotationState> {
        self.state.as_ref()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.state.as_ref().map(|s| s.path.as_path())
    }

    pub fn rotation_count(&self) -> u64 {
        self.rotation_count
    }

    pub fn last_report(&self) -> Option<&RotationReport> {
        self.last_report.as_ref()
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn rotate(&mut self, finalize: impl FnOnce(&Path)) -> Result<PathBuf, LogPipelineError> {
        let now = self.clock.now();
        if self.state.is_none() {
            std::fs::create_dir_all(&self.dir).map_err(|e| {
                LogPipelineError::Rotation(format!(
                    "failed to create log directory {}: {e}",
                    self.dir.display()
                ))
            })?;
        }

        let stamp = self.policy.naming_pattern().stamp(now);
        let new_path =
            naming::available_path(&self.dir, &self.prefix, &stamp, self.current_path());

        let retired = self.state.take().map(|s| s.path);
        let compression = match &retired {
            Some(old) => {
                finalize(old);
                if self.compress {
                    compress_file(old)
                } else {
                    CompressionOutcome::Skipped
                }
            }
            None => CompressionOutcome::Skipped,
        };

        self.state = Some(RotationState {
            path: new_path.clone(),
            opened_at: now,
            size: 0,
        });
        self.force_rotation = false;

        let retention =
            retention::enforce(&self.dir, &self.prefix, Some(&new_path), &self.retention, now);

        if let Some(old) = &retired {
            self.rotation_count += 1;
            metrics::counter!(m::ROTATION_ROTATIONS_TOTAL).increment(1);
            tracing::info!(
                retired = %old.display(),
                new_file = %new_path.display(),
                compressed = compression.is_compressed(),
                deleted = retention.deleted.len(),
                "rotated log file"
            );
        } else {
            tracing::info!(file = %new_path.display(), "opened first log file");
        }

        self.last_report = Some(RotationReport {
            retired,
            new_file: new_path.clone(),
            compression,
            retention,
        });
        Ok(new_path)
    }
}
