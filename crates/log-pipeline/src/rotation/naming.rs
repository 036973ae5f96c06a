//! 시간 패턴과 파일 이름 규칙

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};

/// 로그 파일 확장자
pub const LOG_EXTENSION: &str = "log";

/// 압축 파일 확장자
pub const GZ_EXTENSION: &str = "gz";

/// 시간 기반 회전 주기
///
/// 주기는 고정 길이입니다. MONTHLY는 달력과 무관한 30일입니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimePattern {
    Hourly,
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl TimePattern {
    /// 주기 (밀리초)
    pub fn period_millis(self) -> i64 {
        match self {
            Self::Hourly => 3_600_000,
            Self::Daily => 86_400_000,
            Self::Weekly => 604_800_000,
            Self::Monthly => 2_592_000_000,
        }
    }

    pub fn period(self) -> TimeDelta {
        TimeDelta::milliseconds(self.period_millis())
    }

    /// 파일 이름에 들어가는 날짜 형식 (`chrono` strftime)
    pub fn date_format(self) -> &'static str {
        match self {
            Self::Hourly => "%Y-%m-%d_%H",
            Self::Daily => "%Y-%m-%d",
            Self::Weekly => "%G-W%V",
            Self::Monthly => "%Y-%m",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" | "hour" => Some(Self::Hourly),
            "daily" | "day" => Some(Self::Daily),
            "weekly" | "week" => Some(Self::Weekly),
            "monthly" | "month" => Some(Self::Monthly),
            _ => None,
        }
    }

    /// 알 수 없는 값이면 경고를 남기고 `Daily`로 대체합니다.
    pub fn parse_or_default(s: &str) -> Self {
        Self::from_str_loose(s).unwrap_or_else(|| {
            tracing::warn!(value = s, "unknown rotation pattern, falling back to daily");
            Self::Daily
        })
    }

    pub fn stamp(self, at: DateTime<Utc>) -> String {
        at.format(self.date_format()).to_string()
    }
}

impl fmt::Display for TimePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

/// `<prefix>.<stamp>.log` 형태의 이름 (인덱스 없음)
pub fn base_name(prefix: &str, stamp: &str) -> String {
    format!("{prefix}.{stamp}.{LOG_EXTENSION}")
}

/// `<prefix>.<stamp>.<index>.log`
pub fn indexed_name(prefix: &str, stamp: &str, index: u32) -> String {
    format!("{prefix}.{stamp}.{index}.{LOG_EXTENSION}")
}

/// 사용 중이지 않은 경로를 고릅니다.
///
/// 파일이 이미 있거나, 그 `.gz`가 있거나, `current`와 같으면 사용 중으로 봅니다.
pub fn available_path(dir: &Path, prefix: &str, stamp: &str, current: Option<&Path>) -> PathBuf {
    let taken = |p: &Path| p.exists() || gz_path(p).exists() || current == Some(p);

    let candidate = dir.join(base_name(prefix, stamp));
    if !taken(&candidate) {
        return candidate;
    }
    let mut index = 1u32;
    loop {
        let candidate = dir.join(indexed_name(prefix, stamp, index));
        if !taken(&candidate) || index == u32::MAX {
            return candidate;
        }
        index += 1;
    }
}

/// `<path>.gz`
pub fn gz_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".");
    s.push(GZ_EXTENSION);
    PathBuf::from(s)
}

/// 이 prefix가 관리하는 로그 파일(압축 포함)인지 확인합니다.
pub fn is_managed_file(file_name: &str, prefix: &str) -> bool {
    let Some(rest) = file_name.strip_prefix(prefix) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('.') else {
        return false;
    };
    let suffix = format!(".{LOG_EXTENSION}");
    let gz_suffix = format!(".{LOG_EXTENSION}.{GZ_EXTENSION}");
    (rest.ends_with(&gz_suffix) && rest.len() > gz_suffix.len())
        || (rest.ends_with(&suffix) && rest.len() > suffix.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
    }

    #[test]
    fn periods() {
        assert_eq!(TimePattern::Hourly.period_millis(), 3_600_000);
        assert_eq!(TimePattern::Daily.period_millis(), 86_400_000);
        assert_eq!(TimePattern::Weekly.period_millis(), 604_800_000);
        assert_eq!(TimePattern::Monthly.period_millis(), 2_592_000_000);
    }

    #[test]
    fn stamps() {
        assert_eq!(TimePattern::Hourly.stamp(at()), "2024-01-15_10");
        assert_eq!(TimePattern::Daily.stamp(at()), "2024-01-15");
        assert_eq!(TimePattern::Weekly.stamp(at()), "2024-W03");
        assert_eq!(TimePattern::Monthly.stamp(at()), "2024-01");
    }

    #[test]
    fn loose_parsing_falls_back_to_daily() {
        assert_eq!(TimePattern::parse_or_default("HOURLY"), TimePattern::Hourly);
        assert_eq!(TimePattern::parse_or_default("fortnightly"), TimePattern::Daily);
    }

    #[test]
    fn available_path_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let first = available_path(dir.path(), "app", "2024-01-15", None);
        assert_eq!(first, dir.path().join("app.2024-01-15.log"));

        // 현재 파일과 같은 이름은 사용 중
        let second = available_path(dir.path(), "app", "2024-01-15", Some(&first));
        assert_eq!(second, dir.path().join("app.2024-01-15.1.log"));

        // .gz만 남아 있어도 사용 중
        std::fs::write(gz_path(&first), b"").unwrap();
        std::fs::write(&second, b"").unwrap();
        let third = available_path(dir.path(), "app", "2024-01-15", None);
        assert_eq!(third, dir.path().join("app.2024-01-15.2.log"));
    }

    #[test]
    fn managed_file_detection() {
        assert!(is_managed_file("app.2024-01-15.log", "app"));
        assert!(is_managed_file("app.2024-01-15.1.log.gz", "app"));
        assert!(!is_managed_file("app.log", "app"));
        assert!(!is_managed_file("application.2024-01-15.log", "app"));
        assert!(!is_managed_file("app.2024-01-15.log.gz.tmp", "app"));
        assert!(!is_managed_file("other.2024-01-15.log", "app"));
    }
}
