//! 동적 규칙 -- 런타임에 추가/제거 가능한 이름 있는 조건 -> 동작 목록
//!
//! 규칙은 추가된 순서대로 평가되며 처음 일치한 규칙 하나만 적용됩니다.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use regex::Regex;

use logflux_core::types::{LogLevel, LogRecord};

use crate::error::LogPipelineError;

/// 사용자 정의 조건 함수
pub type RulePredicate = Arc<dyn Fn(&LogRecord) -> bool + Send + Sync>;

/// 규칙 조건
#[derive(Clone)]
pub enum RuleCondition {
    /// 메시지가 정규식과 일치
    MessageRegex(Regex),
    /// origin이 정규식과 일치
    OriginRegex(Regex),
    /// 레벨이 주어진 레벨 이하
    LevelAtMost(LogLevel),
    /// 임의 조건
    Custom(RulePredicate),
}

impl RuleCondition {
    pub fn message_regex(pattern: &str) -> Result<Self, LogPipelineError> {
        Ok(Self::MessageRegex(Regex::new(pattern)?))
    }

    pub fn origin_regex(pattern: &str) -> Result<Self, LogPipelineError> {
        Ok(Self::OriginRegex(Regex::new(pattern)?))
    }

    pub fn custom(f: impl Fn(&LogRecord) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        match self {
            Self::MessageRegex(re) => re.is_match(record.message()),
            Self::OriginRegex(re) => re.is_match(record.origin()),
            Self::LevelAtMost(level) => record.level() <= *level,
            Self::Custom(f) => f(record),
        }
    }
}

impl fmt::Debug for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageRegex(re) => f.debug_tuple("MessageRegex").field(&re.as_str()).finish(),
            Self::OriginRegex(re) => f.debug_tuple("OriginRegex").field(&re.as_str()).finish(),
            Self::LevelAtMost(level) => f.debug_tuple("LevelAtMost").field(level).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// 규칙 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// 기록하지 않음
    Drop,
    /// 고정 50% 비율로 샘플링
    SampleWithRate,
    /// 레벨 필터와 샘플링을 모두 우회하여 항상 기록
    BoostLevel,
}

/// 이름 있는 동적 규칙
#[derive(Debug, Clone)]
pub struct DynamicRule {
    pub name: String,
    pub condition: RuleCondition,
    pub action: RuleAction,
}

impl DynamicRule {
    pub fn new(name: impl Into<String>, condition: RuleCondition, action: RuleAction) -> Self {
        Self {
            name: name.into(),
            condition,
            action,
        }
    }
}

/// 순서 있는 규칙 목록
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: RwLock<Vec<DynamicRule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 규칙을 추가합니다. 같은 이름이 있으면 그 자리에서 교체합니다.
    pub fn add_rule(&self, rule: DynamicRule) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = rules.iter_mut().find(|r| r.name == rule.name) {
            tracing::debug!(rule = %rule.name, "replacing dynamic rule");
            *existing = rule;
        } else {
            tracing::debug!(rule = %rule.name, "adding dynamic rule");
            rules.push(rule);
        }
    }

    /// 규칙을 제거합니다. 존재했으면 `true`.
    pub fn remove_rule(&self, name: &str) -> bool {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let before = rules.len();
        rules.retain(|r| r.name != name);
        rules.len() != before
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.rules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 처음 일치한 규칙의 동작을 반환합니다.
    pub fn first_match(&self, record: &LogRecord) -> Option<RuleAction> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.condition.matches(record))
            .map(|r| r.action)
    }
}
