//! 최소 레벨 필터

use std::sync::atomic::{AtomicU8, Ordering};

use logflux_core::types::{LogLevel, LogRecord};

/// 최소 레벨 미만의 레코드를 거부하는 필터
///
/// 레벨 관리 주체가 런타임에 `set_min_level`로 조정할 수 있습니다.
#[derive(Debug)]
pub struct LevelFilter {
    min_level: AtomicU8,
}

impl LevelFilter {
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            min_level: AtomicU8::new(level_to_u8(min_level)),
        }
    }

    pub fn min_level(&self) -> LogLevel {
        let idx = usize::from(self.min_level.load(Ordering::Acquire));
        LogLevel::from_index(idx).unwrap_or_default()
    }

    pub fn set_min_level(&self, level: LogLevel) {
        let previous = self.min_level.swap(level_to_u8(level), Ordering::AcqRel);
        if previous != level_to_u8(level) {
            tracing::info!(level = %level, "minimum log level changed");
        }
    }

    pub fn accepts(&self, record: &LogRecord) -> bool {
        record.level() >= self.min_level()
    }
}

impl Default for LevelFilter {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

fn level_to_u8(level: LogLevel) -> u8 {
    u8::try_from(level.index()).unwrap_or(u8::MAX)
}
