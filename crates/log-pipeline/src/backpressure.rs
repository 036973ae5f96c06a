//! 백프레셔 컨트롤러 -- 큐 깊이 관측값으로 수신 동작을 결정합니다.
//!
//! 컨트롤러는 마지막으로 보고된 큐 크기와 high/low watermark만 보고 판단하며
//! 호출 사이에 별도의 "tripped" 상태를 기억하지 않습니다. 모든 필드가 atomic이라
//! 생산자 스레드와 소비자 스레드가 `Arc`로 공유할 수 있습니다.
//!
//! # 히스테리시스
//! - `size >= high_watermark` : 전략에 따른 조치 ([`BackpressureController::decide`])
//! - `size <= low_watermark`  : 대기 중인 생산자 재개 ([`BackpressureController::should_resume`])

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// 큐가 high watermark에 도달했을 때의 전략
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BackpressureStrategy {
    /// 새 레코드를 버림
    DropNew,
    /// 가장 오래된 레코드를 버리고 새 레코드를 넣음
    DropOldest,
    /// 제한 시간 동안 생산자를 대기시킴 (기본값)
    #[default]
    Suspend,
    /// 재개될 때까지 생산자를 무기한 대기시킴
    Block,
    /// 최신 레코드 유지 (DropOldest와 동일하게 동작)
    KeepLatest,
}

impl BackpressureStrategy {
    /// 문자열에서 전략을 파싱합니다.
    ///
    /// 대소문자, `-`/`_` 구분을 무시합니다. 알 수 없는 값은 `None`입니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "dropnew" | "dropnewest" => Some(Self::DropNew),
            "dropoldest" => Some(Self::DropOldest),
            "suspend" => Some(Self::Suspend),
            "block" => Some(Self::Block),
            "keeplatest" => Some(Self::KeepLatest),
            _ => None,
        }
    }

    /// 알 수 없는 값이면 경고를 남기고 `Suspend`로 대체합니다.
    pub fn parse_or_default(s: &str) -> Self {
        Self::from_str_loose(s).unwrap_or_else(|| {
            tracing::warn!(value = s, "unknown backpressure strategy, falling back to suspend");
            Self::Suspend
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::DropNew => 0,
            Self::DropOldest => 1,
            Self::Suspend => 2,
            Self::Block => 3,
            Self::KeepLatest => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::DropNew,
            1 => Self::DropOldest,
            3 => Self::Block,
            4 => Self::KeepLatest,
            _ => Self::Suspend,
        }
    }
}

impl fmt::Display for BackpressureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DropNew => "drop_new",
            Self::DropOldest => "drop_oldest",
            Self::Suspend => "suspend",
            Self::Block => "block",
            Self::KeepLatest => "keep_latest",
        };
        f.write_str(s)
    }
}

/// 한 번의 판단 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressureAction {
    /// 조치 없음
    None,
    /// 새 레코드 드롭
    DropNew,
    /// 가장 오래된 레코드 축출 후 삽입
    DropOldest,
    /// 제한 시간 대기
    Suspend,
    /// 무기한 대기
    Block,
}

/// 컨트롤러 상태 스냅샷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueState {
    pub current_size: usize,
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub enabled: bool,
}

/// 백프레셔 컨트롤러
#[derive(Debug)]
pub struct BackpressureController {
    high_watermark: usize,
    low_watermark: usize,
    strategy: AtomicU8,
    enabled: AtomicBool,
    current_size: AtomicUsize,
}

impl BackpressureController {
    /// 새 컨트롤러를 생성합니다. 기본으로 활성화되어 있습니다.
    ///
    /// `low_watermark >= high_watermark`인 구성은 호출자(설정 검증)가 걸러야 합니다.
    pub fn new(high_watermark: usize, low_watermark: usize, strategy: BackpressureStrategy) -> Self {
        Self {
            high_watermark,
            low_watermark,
            strategy: AtomicU8::new(strategy.to_u8()),
            enabled: AtomicBool::new(true),
            current_size: AtomicUsize::new(0),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// 런타임에 전략을 교체합니다.
    pub fn set_strategy(&self, strategy: BackpressureStrategy) {
        self.strategy.store(strategy.to_u8(), Ordering::Release);
    }

    pub fn strategy(&self) -> BackpressureStrategy {
        BackpressureStrategy::from_u8(self.strategy.load(Ordering::Acquire))
    }

    /// 최신 큐 크기 관측값을 기록합니다 (덮어쓰기).
    pub fn record_queue_size(&self, size: usize) {
        self.current_size.store(size, Ordering::Release);
    }

    /// 마지막 관측값으로 조치를 결정합니다.
    pub fn decide(&self) -> BackpressureAction {
        if !self.is_enabled() {
            return BackpressureAction::None;
        }
        if self.current_size.load(Ordering::Acquire) < self.high_watermark {
            return BackpressureAction::None;
        }
        match self.strategy() {
            BackpressureStrategy::DropNew => BackpressureAction::DropNew,
            BackpressureStrategy::DropOldest | BackpressureStrategy::KeepLatest => {
                BackpressureAction::DropOldest
            }
            BackpressureStrategy::Suspend => BackpressureAction::Suspend,
            BackpressureStrategy::Block => BackpressureAction::Block,
        }
    }

    /// 현재 조치가 드롭 계열인지 확인합니다.
    pub fn should_drop(&self) -> bool {
        matches!(
            self.decide(),
            BackpressureAction::DropNew | BackpressureAction::DropOldest
        )
    }

    /// 어떤 조치든 필요한지 확인합니다.
    pub fn should_throttle(&self) -> bool {
        self.decide() != BackpressureAction::None
    }

    /// 대기 중인 생산자를 재개해도 되는지 확인합니다.
    pub fn should_resume(&self) -> bool {
        self.current_size.load(Ordering::Acquire) <= self.low_watermark
    }

    pub fn state(&self) -> QueueState {
        QueueState {
            current_size: self.current_size.load(Ordering::Acquire),
            high_watermark: self.high_watermark,
            low_watermark: self.low_watermark,
            enabled: self.is_enabled(),
        }
    }

    pub fn high_watermark(&self) -> usize {
        self.high_watermark
    }

    pub fn low_watermark(&self) -> usize {
        self.low_watermark
    }
}
