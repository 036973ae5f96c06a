//! 파이프라인 오케스트레이션 -- 수신/필터/기록/회전/브로드캐스트의 전체 흐름을 관리합니다.
//!
//! [`LogPipeline`]은 core의 [`Pipeline`](logflux_core::pipeline::Pipeline) trait을 구현하여
//! 호스트 프로세스에서 start/stop/health_check 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! producers -> AdmissionQueue -> consumer (spawn_blocking)
//!                                  |- FilterChain
//!                                  |- RecordMasker
//!                                  |- RotationManager -> LogWriter -> 파일
//!                                  |- BroadcastHub -> Subscription
//!                                  '- RecordHook
//! ```
//!
//! 생산자는 동기 [`PipelineHandle::submit`]으로 레코드를 넣고, 소비자 하나가 FIFO
//! 순서로 처리합니다. 레코드 단위 실패는 로그와 카운터로만 남고 루프는 계속됩니다.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;

use logflux_core::error::{LogfluxError, PipelineError};
use logflux_core::line::format_line;
use logflux_core::metrics as m;
use logflux_core::pipeline::{HealthStatus, Pipeline};
use logflux_core::types::{LogLevel, LogRecord};

use crate::backpressure::BackpressureController;
use crate::broadcast::{BroadcastHub, Subscription};
use crate::buffer::{BufferStats, LogWriter, WriterKind, open_writer};
use crate::config::PipelineConfig;
use crate::error::LogPipelineError;
use crate::filter::{FilterChain, FilterVerdict, LevelFilter, PatternFilter, Sampler};
use crate::mask::{self, RecordMasker};
use crate::queue::{Admission, AdmissionQueue, Pop};
use crate::rotation::{Clock, RotationManager, SystemClock};

/// 기록된 레코드를 받는 인덱싱 훅
pub trait RecordHook: Send + Sync {
    fn on_record(&self, record: &LogRecord);
}

/// 파이프라인 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 파이프라인 카운터 스냅샷
///
/// 호스트의 상태 엔드포인트가 그대로 내보낼 수 있도록 `Serialize`를 구현합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub submitted: u64,
    pub enqueued: u64,
    /// 수신 단계에서 버려진 레코드 (백프레셔, 닫힌 큐)
    pub dropped: u64,
    /// DropOldest로 밀려난 레코드
    pub evicted: u64,
    /// 규칙/레벨/패턴으로 거부된 레코드
    pub filtered: u64,
    pub sampled_out: u64,
    pub written: u64,
    pub write_errors: u64,
    pub bytes_written: u64,
    pub rotations: u64,
    pub broadcast: u64,
    /// 현재 윈도우의 레벨별 기록 수 (`LogLevel::index` 순서)
    pub recent_by_level: [u64; LogLevel::ALL.len()],
}

impl PipelineStats {
    /// 현재 윈도우에서 `level`로 기록된 레코드 수
    pub fn recent(&self, level: LogLevel) -> u64 {
        self.recent_by_level[level.index()]
    }
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
    filtered: AtomicU64,
    sampled_out: AtomicU64,
    written: AtomicU64,
    write_errors: AtomicU64,
    bytes_written: AtomicU64,
    rotations: AtomicU64,
    broadcast: AtomicU64,
    recent_by_level: [AtomicU64; LogLevel::ALL.len()],
    window_write_errors: AtomicU64,
    buffer_size: AtomicU64,
    buffer_capacity: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            submitted: load(&self.submitted),
            enqueued: load(&self.enqueued),
            dropped: load(&self.dropped),
            evicted: load(&self.evicted),
            filtered: load(&self.filtered),
            sampled_out: load(&self.sampled_out),
            written: load(&self.written),
            write_errors: load(&self.write_errors),
            bytes_written: load(&self.bytes_written),
            rotations: load(&self.rotations),
            broadcast: load(&self.broadcast),
            recent_by_level: std::array::from_fn(|i| load(&self.recent_by_level[i])),
        }
    }

    fn reset_window(&self) {
        for counter in &self.recent_by_level {
            counter.store(0, Ordering::Relaxed);
        }
        self.window_write_errors.store(0, Ordering::Relaxed);
    }

    fn record_buffer(&self, stats: BufferStats) {
        self.buffer_size.store(stats.size, Ordering::Relaxed);
        self.buffer_capacity.store(stats.capacity, Ordering::Relaxed);
    }
}

/// 생산자, 소비자, 조회 API가 공유하는 상태
struct Shared {
    queue: AdmissionQueue,
    filters: Arc<FilterChain>,
    backpressure: Arc<BackpressureController>,
    hub: Arc<BroadcastHub>,
    counters: Counters,
    current_file: RwLock<Option<PathBuf>>,
}

impl Shared {
    fn submit(&self, record: LogRecord) -> Admission {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::PIPELINE_RECORDS_SUBMITTED_TOTAL).increment(1);

        let admission = self.queue.submit(record);
        match admission {
            Admission::Enqueued => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Admission::EnqueuedAfterEviction => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                self.counters.evicted.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::PIPELINE_RECORDS_DROPPED_TOTAL, m::LABEL_REASON => "evicted")
                    .increment(1);
            }
            Admission::Dropped => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::PIPELINE_RECORDS_DROPPED_TOTAL, m::LABEL_REASON => "backpressure")
                    .increment(1);
            }
            Admission::Closed => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::PIPELINE_RECORDS_DROPPED_TOTAL, m::LABEL_REASON => "closed")
                    .increment(1);
            }
        }
        metrics::gauge!(m::PIPELINE_QUEUE_DEPTH).set(self.queue.len() as f64);
        admission
    }

    fn set_current_file(&self, path: Option<PathBuf>) {
        *self
            .current_file
            .write()
            .unwrap_or_else(PoisonError::into_inner) = path;
    }
}

/// 생산자용 핸들
///
/// 복제 비용이 작으며 어느 스레드에서든 `submit`할 수 있습니다.
#[derive(Clone)]
pub struct PipelineHandle {
    shared: Arc<Shared>,
}

impl PipelineHandle {
    /// 레코드를 제출합니다. Suspend/Block 전략에서는 대기할 수 있습니다.
    pub fn submit(&self, record: LogRecord) -> Admission {
        self.shared.submit(record)
    }

    /// `LogRecord::now`로 레코드를 만들어 제출합니다.
    pub fn log(
        &self,
        level: LogLevel,
        origin: impl Into<String>,
        message: impl Into<String>,
    ) -> Admission {
        self.submit(LogRecord::now(level, origin, message))
    }
}

/// 로그 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use logflux_log_pipeline::{LogPipelineBuilder, PipelineConfig};
/// use logflux_core::pipeline::Pipeline;
///
/// let mut pipeline = LogPipelineBuilder::new().config(config).build()?;
/// pipeline.start().await?;
///
/// let handle = pipeline.handle();
/// handle.log(LogLevel::Info, "billing", "invoice created");
///
/// pipeline.stop().await?;
/// ```
pub struct LogPipeline {
    config: PipelineConfig,
    state: PipelineState,
    shared: Arc<Shared>,
    masker: Option<Arc<dyn RecordMasker>>,
    index_hook: Option<Arc<dyn RecordHook>>,
    clock: Arc<dyn Clock>,
    consumer: Option<JoinHandle<()>>,
}

impl LogPipeline {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 생산자 핸들을 반환합니다.
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// 레코드를 제출합니다. 시작 전에 제출한 레코드는 시작 후 처리됩니다.
    pub fn submit(&self, record: LogRecord) -> Admission {
        self.shared.submit(record)
    }

    pub fn current_queue_depth(&self) -> usize {
        self.shared.queue.len()
    }

    /// 활성 로그 파일 경로
    pub fn current_file(&self) -> Option<PathBuf> {
        self.shared
            .current_file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 마지막으로 관측한 writer 버퍼 상태
    pub fn buffer_stats(&self) -> BufferStats {
        BufferStats {
            size: self.shared.counters.buffer_size.load(Ordering::Relaxed),
            capacity: self.shared.counters.buffer_capacity.load(Ordering::Relaxed),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.counters.snapshot()
    }

    /// 스트림 구독을 만듭니다. 최근 `replay_size`개부터 받습니다.
    pub fn subscribe(&self) -> Subscription {
        self.shared.hub.subscribe()
    }

    /// 런타임 조정용 필터 체인
    pub fn filters(&self) -> Arc<FilterChain> {
        Arc::clone(&self.shared.filters)
    }

    /// 런타임 조정용 백프레셔 컨트롤러
    pub fn backpressure(&self) -> Arc<BackpressureController> {
        Arc::clone(&self.shared.backpressure)
    }

    fn init_failed(reason: impl Into<String>) -> LogfluxError {
        PipelineError::InitFailed(reason.into()).into()
    }
}

impl Pipeline for LogPipeline {
    async fn start(&mut self) -> Result<(), LogfluxError> {
        match self.state {
            PipelineState::Running => return Err(PipelineError::AlreadyRunning.into()),
            PipelineState::Stopped => {
                return Err(Self::init_failed("a stopped pipeline cannot be restarted"));
            }
            PipelineState::Initialized => {}
        }

        tracing::info!(
            log_dir = %self.config.log_dir.display(),
            prefix = %self.config.file_prefix,
            writer = self.config.writer.name(),
            "starting log pipeline"
        );

        // 1. 디렉토리 및 첫 파일
        std::fs::create_dir_all(&self.config.log_dir).map_err(|e| {
            Self::init_failed(format!(
                "failed to create log directory {}: {e}",
                self.config.log_dir.display()
            ))
        })?;

        let mut rotation = RotationManager::new(
            self.config.log_dir.clone(),
            self.config.file_prefix.clone(),
            self.config.rotation,
            self.config.retention,
            self.config.compress,
            Arc::clone(&self.clock),
        );
        let path = rotation
            .current_file()
            .map_err(|e| Self::init_failed(e.to_string()))?;

        // 2. writer
        let writer = open_writer(&self.config.writer, &path)
            .map_err(|e| Self::init_failed(format!("failed to open writer: {e}")))?;
        self.shared.counters.record_buffer(writer.stats());
        self.shared.set_current_file(Some(path));

        // 3. 소비 루프
        let consumer = Consumer {
            shared: Arc::clone(&self.shared),
            rotation,
            writer: Some(writer),
            writer_kind: self.config.writer.clone(),
            masker: self.masker.clone(),
            index_hook: self.index_hook.clone(),
            streaming: self.config.streaming_enabled,
            idle_interval: self.config.flush_check_interval,
            window_started: Instant::now(),
        };
        self.consumer = Some(tokio::task::spawn_blocking(move || consumer.run()));

        self.state = PipelineState::Running;
        tracing::info!("log pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogfluxError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!(
            pending = self.shared.queue.len(),
            "stopping log pipeline"
        );

        // 1. 큐를 닫으면 대기 중인 생산자는 Closed를 받고 소비자는 남은 레코드를 비움
        self.shared.queue.close();

        // 2. 소비자 종료 대기 (drain + flush + close)
        if let Some(task) = self.consumer.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "log pipeline consumer task failed");
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                        remaining = self.shared.queue.len(),
                        "log pipeline shutdown timed out, unflushed records may be lost"
                    );
                }
            }
        }

        // 3. 구독자 종료
        self.shared.hub.close();

        self.state = PipelineState::Stopped;
        tracing::info!("log pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                if self.consumer.as_ref().is_some_and(JoinHandle::is_finished) {
                    return HealthStatus::Unhealthy("consumer task exited".to_owned());
                }
                let depth = self.shared.queue.len();
                let high = self.shared.backpressure.high_watermark();
                if depth >= high {
                    return HealthStatus::Degraded(format!(
                        "queue depth {depth} at or above high watermark {high}"
                    ));
                }
                let errors = self
                    .shared
                    .counters
                    .window_write_errors
                    .load(Ordering::Relaxed);
                if errors > 0 {
                    return HealthStatus::Degraded(format!("{errors} recent write errors"));
                }
                HealthStatus::Healthy
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 소비 루프 상태 (blocking 스레드에서 단독 소유)
struct Consumer {
    shared: Arc<Shared>,
    rotation: RotationManager,
    writer: Option<Box<dyn LogWriter>>,
    writer_kind: WriterKind,
    masker: Option<Arc<dyn RecordMasker>>,
    index_hook: Option<Arc<dyn RecordHook>>,
    streaming: bool,
    idle_interval: Duration,
    window_started: Instant,
}

impl Consumer {
    fn run(mut self) {
        tracing::debug!("log pipeline consumer started");
        loop {
            match self.shared.queue.pop_timeout(self.idle_interval) {
                Pop::Record(record) => self.process(record),
                Pop::Idle => self.on_idle(),
                Pop::Closed => break,
            }
        }
        self.shutdown();
    }

    fn process(&mut self, record: LogRecord) {
        let started = Instant::now();
        self.roll_window(started);
        let shared = Arc::clone(&self.shared);
        let counters = &shared.counters;

        let verdict = self.shared.filters.evaluate(&record);
        if !verdict.is_accepted() {
            match verdict {
                FilterVerdict::SampledOut => counters.sampled_out.fetch_add(1, Ordering::Relaxed),
                _ => counters.filtered.fetch_add(1, Ordering::Relaxed),
            };
            metrics::counter!(m::PIPELINE_RECORDS_FILTERED_TOTAL, m::LABEL_REASON => verdict.reason())
                .increment(1);
            return;
        }

        let record = match &self.masker {
            Some(masker) => mask::apply(masker.as_ref(), record),
            None => record,
        };

        let mut line = format_line(&record);
        line.push('\n');
        if let Err(e) = self.write_line(line.as_bytes()) {
            counters.write_errors.fetch_add(1, Ordering::Relaxed);
            counters.window_write_errors.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::WRITER_WRITE_ERRORS_TOTAL).increment(1);
            tracing::warn!(error = %e, origin = %record.origin(), "failed to write log record");
            return;
        }

        let level = record.level();
        counters.written.fetch_add(1, Ordering::Relaxed);
        counters.recent_by_level[level.index()].fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::PIPELINE_RECORDS_WRITTEN_TOTAL, m::LABEL_LEVEL => level.as_str())
            .increment(1);

        let record = Arc::new(record);
        if self.streaming && shared.hub.publish(Arc::clone(&record)) {
            counters.broadcast.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::PIPELINE_RECORDS_BROADCAST_TOTAL).increment(1);
        }

        if let Some(hook) = &self.index_hook {
            hook.on_record(&record);
        }

        metrics::histogram!(m::PIPELINE_PROCESSING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
    }

    /// 회전을 결정하고 현재 writer에 한 줄을 씁니다.
    fn write_line(&mut self, line: &[u8]) -> Result<(), LogPipelineError> {
        if let Some(writer) = &self.writer
            && !writer.has_room(line.len())
        {
            // 빈 파일에도 들어가지 않는 줄은 회전해도 소용없음
            let capacity = writer.stats().capacity;
            let len = line.len() as u64;
            if len > capacity {
                return Err(LogPipelineError::CapacityExceeded { len, capacity });
            }
            self.rotation.request_rotation();
        }

        let before = self.rotation.rotation_count();
        let writer_slot = &mut self.writer;
        let path = self.rotation.current_file_with(|retired| {
            if let Some(mut old) = writer_slot.take() {
                old.close();
                tracing::debug!(path = %retired.display(), "closed writer for retired file");
            }
        })?;
        if self.rotation.rotation_count() != before {
            self.shared
                .counters
                .rotations
                .store(self.rotation.rotation_count(), Ordering::Relaxed);
            self.shared.set_current_file(Some(path.clone()));
        }

        if self.writer.as_ref().is_none_or(|w| w.path() != path.as_path()) {
            if let Some(mut stale) = self.writer.take() {
                stale.close();
            }
            self.writer = Some(open_writer(&self.writer_kind, &path)?);
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(LogPipelineError::Writer {
                kind: self.writer_kind.name().to_owned(),
                reason: "no active writer".to_owned(),
            });
        };

        writer.write(line)?;
        let len = line.len() as u64;
        self.rotation.increment_size(len);
        self.shared.counters.bytes_written.fetch_add(len, Ordering::Relaxed);
        self.shared.counters.record_buffer(writer.stats());
        metrics::counter!(m::WRITER_BYTES_WRITTEN_TOTAL).increment(len);
        Ok(())
    }

    /// 부하가 계속되어 idle tick이 없어도 `idle_interval`마다 집계 창을 비웁니다.
    fn roll_window(&mut self, now: Instant) {
        if now.duration_since(self.window_started) >= self.idle_interval {
            self.shared.counters.reset_window();
            self.window_started = now;
        }
    }

    fn on_idle(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush_if_due();
            self.shared.counters.record_buffer(writer.stats());
        }
        self.shared.counters.reset_window();
        self.window_started = Instant::now();
        metrics::gauge!(m::PIPELINE_QUEUE_DEPTH).set(self.shared.queue.len() as f64);
    }

    fn shutdown(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            writer.flush();
            writer.close();
            self.shared.counters.record_buffer(writer.stats());
        }
        self.shared.hub.close();
        metrics::gauge!(m::PIPELINE_QUEUE_DEPTH).set(0.0);
        tracing::debug!(
            written = self.shared.counters.written.load(Ordering::Relaxed),
            "log pipeline consumer drained"
        );
    }
}

/// 로그 파이프라인 빌더
pub struct LogPipelineBuilder {
    config: PipelineConfig,
    masker: Option<Arc<dyn RecordMasker>>,
    index_hook: Option<Arc<dyn RecordHook>>,
    clock: Arc<dyn Clock>,
}

impl LogPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            masker: None,
            index_hook: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 마스커를 설정합니다. `masking_enabled`가 켜져 있을 때만 적용됩니다.
    pub fn masker(mut self, masker: Arc<dyn RecordMasker>) -> Self {
        self.masker = Some(masker);
        self
    }

    /// 기록된 레코드를 받을 인덱싱 훅을 설정합니다.
    pub fn index_hook(mut self, hook: Arc<dyn RecordHook>) -> Self {
        self.index_hook = Some(hook);
        self
    }

    /// 회전 판단에 쓸 시계를 지정합니다 (테스트용).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 설정을 검증하고 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<LogPipeline, LogPipelineError> {
        self.config.validate()?;
        let config = self.config;

        let filters = Arc::new(FilterChain::new(
            LevelFilter::new(config.min_level),
            PatternFilter::new(&config.include_patterns, &config.exclude_patterns)?,
            Sampler::new(
                config.sampling_strategy,
                config.sampling_rate,
                config.boost_duration,
            ),
        ));

        let backpressure = Arc::new(BackpressureController::new(
            config.high_watermark,
            config.low_watermark,
            config.backpressure_strategy,
        ));
        backpressure.set_enabled(config.backpressure_enabled);

        let queue = AdmissionQueue::new(
            config.queue_capacity,
            config.suspend_timeout,
            Arc::clone(&backpressure),
        );
        let hub = BroadcastHub::new(
            config.replay_size,
            config.live_capacity,
            config.broadcast_min_level,
        );

        let masker = match (config.masking_enabled, self.masker) {
            (true, Some(masker)) => Some(masker),
            (true, None) => {
                tracing::warn!("masking enabled but no masker configured, records pass unmasked");
                None
            }
            (false, _) => None,
        };

        let shared = Arc::new(Shared {
            queue,
            filters,
            backpressure,
            hub,
            counters: Counters::default(),
            current_file: RwLock::new(None),
        });

        Ok(LogPipeline {
            config,
            state: PipelineState::Initialized,
            shared,
            masker,
            index_hook: self.index_hook,
            clock: self.clock,
            consumer: None,
        })
    }
}

impl Default for LogPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
