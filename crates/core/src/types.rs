//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 프로듀서 호출 지점에서 생성되는 [`LogRecord`]와 그 구성 요소를 정의합니다.
//! 레코드는 생성 후 불변이며, 마스킹은 새 레코드를 만드는 방식으로만 이루어집니다.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// 레코드 형식 버전 기본값
pub const DEFAULT_RECORD_VERSION: &str = "1";

/// 로그 레벨
///
/// `Ord` 구현으로 레벨 비교가 가능합니다 (`Debug < Info < Warn < Error < Fatal`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LogLevel {
    /// 디버그
    Debug,
    /// 정보성 (기본값)
    #[default]
    Info,
    /// 경고
    Warn,
    /// 에러
    Error,
    /// 치명적
    Fatal,
}

impl LogLevel {
    /// 정의된 모든 레벨 (오름차순)
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    /// 디스크 포맷에 쓰이는 대문자 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// 문자열에서 레벨을 파싱합니다.
    ///
    /// 대소문자를 구분하지 않으며 흔한 별칭을 허용합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(Self::Debug),
            "info" | "information" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" => Some(Self::Error),
            "fatal" | "critical" | "crit" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// ERROR 이상인지 확인합니다.
    pub fn is_error_or_above(self) -> bool {
        self >= Self::Error
    }

    /// 정수 인덱스 (0 = DEBUG)
    pub fn index(self) -> usize {
        self as usize
    }

    /// 정수 인덱스에서 레벨을 복원합니다.
    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<u64> = const { Cell::new(0) };
}

/// 레코드를 생성한 스레드 정보
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadInfo {
    /// 프로세스 내에서 안정적인 숫자 ID
    pub id: u64,
    /// 스레드 이름
    pub name: String,
}

impl ThreadInfo {
    /// 새 스레드 정보를 생성합니다.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// 호출 스레드의 정보를 캡처합니다.
    pub fn current() -> Self {
        let id = THREAD_ID.with(|cell| {
            if cell.get() == 0 {
                cell.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
            }
            cell.get()
        });
        let name = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_owned();
        Self { id, name }
    }
}

/// 로그 레코드
///
/// 프로듀서 호출 지점에서 만들어지는 불변 값입니다.
/// 타임스탬프는 생성 시 마이크로초 정밀도로 절삭되어, 디스크 포맷과
/// 손실 없이 왕복됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    version: String,
    timestamp: DateTime<Utc>,
    level: LogLevel,
    thread: ThreadInfo,
    origin: String,
    message: String,
}

impl LogRecord {
    /// 모든 필드를 지정해 레코드를 생성합니다.
    pub fn new(
        version: impl Into<String>,
        timestamp: DateTime<Utc>,
        level: LogLevel,
        thread: ThreadInfo,
        origin: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            timestamp: timestamp.trunc_subsecs(6),
            level,
            thread,
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// 현재 시각과 호출 스레드로 레코드를 생성합니다.
    pub fn now(level: LogLevel, origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            DEFAULT_RECORD_VERSION,
            Utc::now(),
            level,
            ThreadInfo::current(),
            origin,
            message,
        )
    }

    /// 메시지만 교체한 새 레코드를 반환합니다 (마스킹 용도).
    pub fn with_message(&self, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..self.clone()
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn thread(&self) -> &ThreadInfo {
        &self.thread
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::line::format_line(self))
    }
}
