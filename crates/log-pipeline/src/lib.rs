#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`backpressure`]: watermark 기반 백프레셔 컨트롤러
//! - [`queue`]: 백프레셔를 적용하는 유한 수신 큐
//! - [`filter`]: 레벨/패턴/동적 규칙/샘플링 필터 체인
//! - [`buffer`]: 활성 파일 writer (buffered, ring buffer, mmap)
//! - [`rotation`]: 파일 회전, 이름 규칙, 압축, 보존 정책
//! - [`broadcast`]: 재생 버퍼를 가진 실시간 팬아웃
//! - [`mask`]: 메시지 마스킹 훅
//! - [`pipeline`]: 전체 파이프라인 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 파이프라인 설정 (core 설정 변환)
//! - [`error`]: 도메인 에러 타입

pub mod backpressure;
pub mod broadcast;
pub mod buffer;
pub mod config;
pub mod error;
pub mod filter;
pub mod mask;
pub mod pipeline;
pub mod queue;
pub mod rotation;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{LogPipeline, LogPipelineBuilder, PipelineHandle, PipelineStats, RecordHook};

// 설정
pub use config::{PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::LogPipelineError;

// 백프레셔 / 큐
pub use backpressure::{BackpressureAction, BackpressureController, BackpressureStrategy};
pub use queue::{Admission, AdmissionQueue};

// 필터
pub use filter::{DynamicRule, FilterChain, FilterVerdict, RuleAction, RuleCondition};
pub use filter::{SamplingStrategy, Sampler};

// 버퍼
pub use buffer::{BufferStats, LogWriter, WriterKind};

// 회전
pub use rotation::{Clock, RetentionConfig, RotationManager, RotationPolicy, TimePattern};

// 브로드캐스트
pub use broadcast::{BroadcastError, BroadcastHub, Subscription};

// 마스킹
pub use mask::{RecordMasker, RegexMasker};
