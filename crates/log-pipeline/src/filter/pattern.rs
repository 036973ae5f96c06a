//! 정규식 include/exclude 필터
//!
//! 패턴은 메시지와 origin 양쪽에 대해 검사합니다.
//! - include 패턴이 하나라도 있으면 최소 하나와 일치해야 통과
//! - exclude 패턴과 하나라도 일치하면 거부

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use regex::Regex;

use logflux_core::types::LogRecord;

use crate::error::LogPipelineError;

#[derive(Debug, Default)]
struct Patterns {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

/// include/exclude 정규식 필터
#[derive(Debug, Default)]
pub struct PatternFilter {
    patterns: RwLock<Patterns>,
}

impl PatternFilter {
    /// 패턴 문자열에서 필터를 생성합니다. 잘못된 정규식이면 에러입니다.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, LogPipelineError> {
        Ok(Self {
            patterns: RwLock::new(Patterns {
                include: compile_all(include)?,
                exclude: compile_all(exclude)?,
            }),
        })
    }

    /// include 패턴을 추가합니다.
    pub fn add_include(&self, pattern: &str) -> Result<(), LogPipelineError> {
        let re = Regex::new(pattern)?;
        self.write().include.push(re);
        Ok(())
    }

    /// exclude 패턴을 추가합니다.
    pub fn add_exclude(&self, pattern: &str) -> Result<(), LogPipelineError> {
        let re = Regex::new(pattern)?;
        self.write().exclude.push(re);
        Ok(())
    }

    /// 모든 패턴을 제거합니다.
    pub fn clear(&self) {
        let mut patterns = self.write();
        patterns.include.clear();
        patterns.exclude.clear();
    }

    pub fn is_empty(&self) -> bool {
        let patterns = self.read();
        patterns.include.is_empty() && patterns.exclude.is_empty()
    }

    pub fn accepts(&self, record: &LogRecord) -> bool {
        let patterns = self.read();
        let matches = |re: &Regex| re.is_match(record.message()) || re.is_match(record.origin());

        if !patterns.include.is_empty() && !patterns.include.iter().any(matches) {
            return false;
        }
        !patterns.exclude.iter().any(matches)
    }

    fn read(&self) -> RwLockReadGuard<'_, Patterns> {
        self.patterns.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Patterns> {
        self.patterns.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, LogPipelineError> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(LogPipelineError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflux_core::types::LogLevel;

    fn rec(origin: &str, msg: &str) -> LogRecord {
        LogRecord::now(LogLevel::Info, origin, msg)
    }

    #[test]
    fn empty_filter_accepts_everything() {
        let f = PatternFilter::default();
        assert!(f.is_empty());
        assert!(f.accepts(&rec("any", "thing")));
    }

    #[test]
    fn include_requires_a_match() {
        let f = PatternFilter::new(&["^payment".to_owned()], &[]).unwrap();
        assert!(f.accepts(&rec("svc", "payment accepted")));
        assert!(!f.accepts(&rec("svc", "user logged in")));
    }

    #[test]
    fn include_matches_origin_too() {
        let f = PatternFilter::new(&["billing".to_owned()], &[]).unwrap();
        assert!(f.accepts(&rec("com.example.billing", "charged")));
    }

    #[test]
    fn exclude_rejects_on_message_or_origin() {
        let f = PatternFilter::new(&[], &["healthcheck".to_owned()]).unwrap();
        assert!(!f.accepts(&rec("lb", "GET /healthcheck 200")));
        assert!(!f.accepts(&rec("healthcheck-agent", "ok")));
        assert!(f.accepts(&rec("api", "GET /users 200")));
    }

    #[test]
    fn exclude_wins_over_include() {
        let f = PatternFilter::new(&["GET".to_owned()], &["/health".to_owned()]).unwrap();
        assert!(!f.accepts(&rec("api", "GET /health")));
        assert!(f.accepts(&rec("api", "GET /orders")));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = PatternFilter::new(&["(".to_owned()], &[]).unwrap_err();
        assert!(matches!(err, LogPipelineError::Regex(_)));
    }

    #[test]
    fn runtime_updates() {
        let f = PatternFilter::default();
        f.add_exclude("noise").unwrap();
        assert!(!f.accepts(&rec("a", "noise")));
        f.clear();
        assert!(f.accepts(&rec("a", "noise")));
    }
}
