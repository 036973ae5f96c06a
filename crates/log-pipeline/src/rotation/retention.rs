//! 보존 정책 -- 회전된 파일 정리
//!
//! 대상은 활성 파일을 제외한 `<prefix>.*.log[.gz]` 파일입니다. 순서:
//!
//! 1. `max_files` 초과분 삭제 (수정 시각이 오래된 것부터)
//! 2. `max_history_days`보다 오래된 파일 삭제
//! 3. 활성 파일 포함 총 크기가 `total_size_cap_bytes` 이하가 될 때까지 오래된 것부터 삭제
//!
//! 각 한도는 0이면 비활성입니다. 삭제 실패는 로그로 남기고 보고서에 집계할 뿐입니다.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, TimeDelta, Utc};

use logflux_core::metrics as m;

use super::naming::is_managed_file;

/// 보존 한도
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    pub max_history_days: u32,
    pub max_files: usize,
    pub total_size_cap_bytes: u64,
}

impl RetentionConfig {
    /// 모든 한도 비활성
    pub fn unlimited() -> Self {
        Self {
            max_history_days: 0,
            max_files: 0,
            total_size_cap_bytes: 0,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_history_days: 30,
            max_files: 50,
            total_size_cap_bytes: 10 * 1024 * 1024 * 1024,
        }
    }
}

/// 한 번의 정리 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// 검사한 후보 파일 수
    pub scanned: usize,
    pub deleted: Vec<PathBuf>,
    pub failures: usize,
}

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

/// 보존 정책을 적용합니다.
pub fn enforce(
    dir: &Path,
    prefix: &str,
    active: Option<&Path>,
    config: &RetentionConfig,
    now: DateTime<Utc>,
) -> RetentionReport {
    let mut report = RetentionReport::default();
    let mut candidates = match scan(dir, prefix, active) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "retention scan failed");
            report.failures += 1;
            return report;
        }
    };
    report.scanned = candidates.len();
    candidates.sort_by_key(|c| c.modified);

    // 1. 개수
    if config.max_files > 0 && candidates.len() > config.max_files {
        let excess = candidates.len() - config.max_files;
        for candidate in candidates.drain(..excess) {
            delete(&candidate, "max_files", &mut report);
        }
    }

    // 2. 기간
    if config.max_history_days > 0 {
        let cutoff = now - TimeDelta::days(i64::from(config.max_history_days));
        let (expired, kept): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| DateTime::<Utc>::from(c.modified) < cutoff);
        for candidate in &expired {
            delete(candidate, "max_history_days", &mut report);
        }
        candidates = kept;
    }

    // 3. 총 크기
    if config.total_size_cap_bytes > 0 {
        let active_size = active
            .and_then(|p| std::fs::metadata(p).ok())
            .map_or(0, |meta| meta.len());
        let mut total: u64 = active_size + candidates.iter().map(|c| c.size).sum::<u64>();
        let mut remaining = candidates.into_iter();
        while total > config.total_size_cap_bytes {
            let Some(candidate) = remaining.next() else {
                break;
            };
            if delete(&candidate, "total_size_cap", &mut report) {
                total = total.saturating_sub(candidate.size);
            }
        }
    }

    if !report.deleted.is_empty() {
        tracing::info!(
            dir = %dir.display(),
            deleted = report.deleted.len(),
            failures = report.failures,
            "retention removed old log files"
        );
    }
    report
}

fn scan(dir: &Path, prefix: &str, active: Option<&Path>) -> std::io::Result<Vec<Candidate>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if active == Some(path.as_path()) {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_managed_file(name, prefix) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        out.push(Candidate {
            path,
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size: meta.len(),
        });
    }
    Ok(out)
}

fn delete(candidate: &Candidate, reason: &str, report: &mut RetentionReport) -> bool {
    match std::fs::remove_file(&candidate.path) {
        Ok(()) => {
            metrics::counter!(m::ROTATION_RETENTION_DELETED_TOTAL, m::LABEL_REASON => reason.to_owned())
                .increment(1);
            tracing::debug!(path = %candidate.path.display(), reason, "deleted log file");
            report.deleted.push(candidate.path.clone());
            true
        }
        Err(e) => {
            tracing::warn!(
                path = %candidate.path.display(),
                reason,
                error = %e,
                "failed to delete log file during retention"
            );
            report.failures += 1;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn make(dir: &Path, name: &str, size: usize, age: Duration) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![b'x'; size]).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
        path
    }

    fn hours(h: u64) -> Duration {
        Duration::from_secs(h * 3600)
    }

    #[test]
    fn max_files_removes_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let oldest = make(dir.path(), "app.2024-01-01.log", 10, hours(72));
        let middle = make(dir.path(), "app.2024-01-02.log.gz", 10, hours(48));
        let newest = make(dir.path(), "app.2024-01-03.log", 10, hours(24));
        let active = make(dir.path(), "app.2024-01-04.log", 10, hours(0));

        let config = RetentionConfig {
            max_files: 1,
            ..RetentionConfig::unlimited()
        };
        let report = enforce(dir.path(), "app", Some(&active), &config, Utc::now());

        assert_eq!(report.scanned, 3);
        assert_eq!(report.deleted, vec![oldest.clone(), middle.clone()]);
        assert!(!oldest.exists());
        assert!(!middle.exists());
        assert!(newest.exists());
        assert!(active.exists());
    }

    #[test]
    fn age_limit() {
        let dir = tempfile::tempdir().unwrap();
        let old = make(dir.path(), "app.a.log", 1, hours(24 * 10));
        let fresh = make(dir.path(), "app.b.log", 1, hours(1));
        let config = RetentionConfig {
            max_history_days: 7,
            ..RetentionConfig::unlimited()
        };
        let report = enforce(dir.path(), "app", None, &config, Utc::now());
        assert_eq!(report.deleted, vec![old]);
        assert!(fresh.exists());
    }

    #[test]
    fn size_cap_counts_active_but_never_deletes_it() {
        let dir = tempfile::tempdir().unwrap();
        let a = make(dir.path(), "app.a.log", 100, hours(3));
        let b = make(dir.path(), "app.b.log", 100, hours(2));
        let active = make(dir.path(), "app.c.log", 150, hours(0));
        let config = RetentionConfig {
            total_size_cap_bytes: 260,
            ..RetentionConfig::unlimited()
        };
        let report = enforce(dir.path(), "app", Some(&active), &config, Utc::now());
        assert_eq!(report.deleted, vec![a]);
        assert!(b.exists());

        // 활성 파일 혼자 한도를 넘어도 지우지 않음
        let config = RetentionConfig {
            total_size_cap_bytes: 10,
            ..RetentionConfig::unlimited()
        };
        enforce(dir.path(), "app", Some(&active), &config, Utc::now());
        assert!(!b.exists());
        assert!(active.exists());
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let foreign = make(dir.path(), "other.2024-01-01.log", 10, hours(1000));
        let notes = make(dir.path(), "app-notes.txt", 10, hours(1000));
        let config = RetentionConfig {
            max_files: 1,
            max_history_days: 1,
            total_size_cap_bytes: 1,
        };
        let report = enforce(dir.path(), "app", None, &config, Utc::now());
        assert_eq!(report.scanned, 0);
        assert!(foreign.exists());
        assert!(notes.exists());
    }

    #[test]
    fn zero_limits_disable_retention() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            make(dir.path(), &format!("app.{i}.log"), 10, hours(24 * 365));
        }
        let report = enforce(
            dir.path(),
            "app",
            None,
            &RetentionConfig::unlimited(),
            Utc::now(),
        );
        assert!(report.deleted.is_empty());
        assert_eq!(report.scanned, 5);
    }

    #[test]
    fn missing_directory_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let report = enforce(
            &dir.path().join("nope"),
            "app",
            None,
            &RetentionConfig::default(),
            Utc::now(),
        );
        assert_eq!(report.failures, 1);
    }
}
