//! 마스킹 훅
//!
//! 민감 정보 패턴 테이블은 외부에서 주입합니다. 파이프라인은 마스킹이 켜져 있을 때
//! 메시지를 [`RecordMasker`]에 넘기고, 바뀐 경우에만 새 레코드를 만듭니다.

use std::borrow::Cow;

use regex::Regex;

use logflux_core::types::LogRecord;

use crate::error::LogPipelineError;

/// 메시지 마스킹 trait
pub trait RecordMasker: Send + Sync {
    /// 마스킹된 메시지를 반환합니다. 바꿀 것이 없으면 `None`.
    fn mask(&self, message: &str) -> Option<String>;
}

/// (패턴, 치환 문자열) 목록을 순서대로 적용하는 마스커
#[derive(Debug, Default)]
pub struct RegexMasker {
    rules: Vec<(Regex, String)>,
}

impl RegexMasker {
    /// 치환 문자열은 `regex`의 `$1` 형식 그룹 참조를 지원합니다.
    pub fn new<P, R>(rules: impl IntoIterator<Item = (P, R)>) -> Result<Self, LogPipelineError>
    where
        P: AsRef<str>,
        R: Into<String>,
    {
        let rules = rules
            .into_iter()
            .map(|(pattern, replacement)| Ok((Regex::new(pattern.as_ref())?, replacement.into())))
            .collect::<Result<Vec<_>, LogPipelineError>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RecordMasker for RegexMasker {
    fn mask(&self, message: &str) -> Option<String> {
        let mut current = Cow::Borrowed(message);
        for (re, replacement) in &self.rules {
            let replaced = match re.replace_all(&current, replacement.as_str()) {
                Cow::Owned(s) => Some(s),
                Cow::Borrowed(_) => None,
            };
            if let Some(s) = replaced {
                current = Cow::Owned(s);
            }
        }
        match current {
            Cow::Borrowed(_) => None,
            Cow::Owned(s) => Some(s),
        }
    }
}

/// 마스커를 적용한 레코드를 반환합니다. 바뀌지 않았으면 원본을 그대로 돌려줍니다.
pub fn apply(masker: &dyn RecordMasker, record: LogRecord) -> LogRecord {
    match masker.mask(record.message()) {
        Some(masked) => record.with_message(masked),
        None => record,
    }
}
