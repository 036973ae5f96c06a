//! 필터 체인 -- 레벨, 패턴, 동적 규칙, 샘플링
//!
//! 레코드는 두 단계를 거칩니다.
//!
//! 1. [`FilterChain::should_log`]: 동적 규칙(Drop/BoostLevel) -> 레벨 -> 패턴
//! 2. [`FilterChain::should_sample`]: 동적 규칙(BoostLevel/SampleWithRate) -> 샘플러
//!
//! [`FilterChain::evaluate`]는 1단계에서 거부된 레코드를 2단계로 보내지 않으므로
//! 거부된 레코드는 샘플러 카운터(systematic stride, 통계)를 움직이지 않습니다.
//!
//! 모든 단계는 내부 가변성을 가지므로 `Arc<FilterChain>`을 외부 관리 주체와
//! 공유한 채 런타임에 조정할 수 있습니다.

pub mod level;
pub mod pattern;
pub mod rules;
pub mod sampling;

use logflux_core::types::LogRecord;

pub use level::LevelFilter;
pub use pattern::PatternFilter;
pub use rules::{DynamicRule, RuleAction, RuleCondition, RuleSet};
pub use sampling::{Sampler, SamplerStats, SamplingStrategy};

/// `SampleWithRate` 규칙에 적용되는 고정 비율
pub const RULE_SAMPLE_RATE: f64 = 0.5;

/// 필터 체인 평가 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accepted,
    /// Drop 규칙에 걸림
    RejectedByRule,
    /// 최소 레벨 미만
    RejectedByLevel,
    /// include/exclude 패턴에 걸림
    RejectedByPattern,
    /// 샘플링에서 탈락
    SampledOut,
}

impl FilterVerdict {
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }

    /// 메트릭 레이블용 사유 문자열
    pub fn reason(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::RejectedByRule => "rule",
            Self::RejectedByLevel => "level",
            Self::RejectedByPattern => "pattern",
            Self::SampledOut => "sampling",
        }
    }
}

/// 필터 체인
#[derive(Debug, Default)]
pub struct FilterChain {
    level: LevelFilter,
    patterns: PatternFilter,
    rules: RuleSet,
    sampler: Sampler,
}

impl FilterChain {
    pub fn new(level: LevelFilter, patterns: PatternFilter, sampler: Sampler) -> Self {
        Self {
            level,
            patterns,
            rules: RuleSet::new(),
            sampler,
        }
    }

    pub fn level(&self) -> &LevelFilter {
        &self.level
    }

    pub fn patterns(&self) -> &PatternFilter {
        &self.patterns
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// 1단계 판단: 규칙, 레벨, 패턴
    pub fn should_log(&self, record: &LogRecord) -> bool {
        self.log_stage(record, self.rules.first_match(record)).is_accepted()
    }

    /// 2단계 판단: 규칙, 샘플러
    pub fn should_sample(&self, record: &LogRecord) -> bool {
        self.sample_stage(record, self.rules.first_match(record))
            .is_accepted()
    }

    /// 두 단계를 단락 평가합니다. 규칙 목록은 한 번만 조회합니다.
    pub fn evaluate(&self, record: &LogRecord) -> FilterVerdict {
        let rule = self.rules.first_match(record);
        match self.log_stage(record, rule) {
            FilterVerdict::Accepted => self.sample_stage(record, rule),
            rejected => rejected,
        }
    }

    fn log_stage(&self, record: &LogRecord, rule: Option<RuleAction>) -> FilterVerdict {
        match rule {
            Some(RuleAction::Drop) => return FilterVerdict::RejectedByRule,
            Some(RuleAction::BoostLevel) => return FilterVerdict::Accepted,
            Some(RuleAction::SampleWithRate) | None => {}
        }
        if !self.level.accepts(record) {
            return FilterVerdict::RejectedByLevel;
        }
        if !self.patterns.accepts(record) {
            return FilterVerdict::RejectedByPattern;
        }
        FilterVerdict::Accepted
    }

    fn sample_stage(&self, record: &LogRecord, rule: Option<RuleAction>) -> FilterVerdict {
        let sampled = match rule {
            Some(RuleAction::BoostLevel) => true,
            Some(RuleAction::SampleWithRate) => {
                self.sampler.sample_at(record, RULE_SAMPLE_RATE)
            }
            Some(RuleAction::Drop) | None => self.sampler.should_sample(record),
        };
        if sampled {
            FilterVerdict::Accepted
        } else {
            FilterVerdict::SampledOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflux_core::types::LogLevel;
    use std::time::Duration;

    fn chain(min: LogLevel, strategy: SamplingStrategy, rate: f64) -> FilterChain {
        FilterChain::new(
            LevelFilter::new(min),
            PatternFilter::default(),
            Sampler::new(strategy, rate, Duration::from_secs(30)),
        )
    }

    #[test]
    fn level_rejection_does_not_advance_sampler() {
        let chain = chain(LogLevel::Warn, SamplingStrategy::Systematic, 0.5);
        for _ in 0..10 {
            let v = chain.evaluate(&LogRecord::now(LogLevel::Debug, "o", "m"));
            assert_eq!(v, FilterVerdict::RejectedByLevel);
        }
        assert_eq!(chain.sampler().stats().seen, 0);

        // stride 2: 첫 번째 통과 레코드가 선택됨
        let v = chain.evaluate(&LogRecord::now(LogLevel::Warn, "o", "m"));
        assert_eq!(v, FilterVerdict::Accepted);
        assert_eq!(chain.sampler().stats().seen, 1);
    }

    #[test]
    fn pattern_rejection_reported() {
        let chain = FilterChain::new(
            LevelFilter::new(LogLevel::Debug),
            PatternFilter::new(&[], &["secret".to_owned()]).unwrap(),
            Sampler::default(),
        );
        let v = chain.evaluate(&LogRecord::now(LogLevel::Info, "o", "a secret"));
        assert_eq!(v, FilterVerdict::RejectedByPattern);
        assert_eq!(v.reason(), "pattern");
    }

    #[test]
    fn drop_rule_short_circuits() {
        let chain = chain(LogLevel::Debug, SamplingStrategy::Random, 1.0);
        chain.rules().add_rule(DynamicRule::new(
            "drop-noise",
            RuleCondition::message_regex("noise").unwrap(),
            RuleAction::Drop,
        ));
        let r = LogRecord::now(LogLevel::Fatal, "o", "noise");
        assert!(!chain.should_log(&r));
        assert_eq!(chain.evaluate(&r), FilterVerdict::RejectedByRule);
        assert_eq!(chain.sampler().stats().seen, 0);
    }

    #[test]
    fn boost_rule_bypasses_level_and_sampling() {
        let chain = chain(LogLevel::Error, SamplingStrategy::Random, 0.0);
        chain.rules().add_rule(DynamicRule::new(
            "trace-checkout",
            RuleCondition::origin_regex("checkout").unwrap(),
            RuleAction::BoostLevel,
        ));
        let r = LogRecord::now(LogLevel::Debug, "checkout", "step 1");
        assert!(chain.should_log(&r));
        assert!(chain.should_sample(&r));
        assert_eq!(chain.evaluate(&r), FilterVerdict::Accepted);

        let other = LogRecord::now(LogLevel::Debug, "cart", "step 1");
        assert_eq!(chain.evaluate(&other), FilterVerdict::RejectedByLevel);
    }

    #[test]
    fn sample_with_rate_rule_uses_half_rate() {
        let chain = chain(LogLevel::Debug, SamplingStrategy::Random, 0.0);
        chain.rules().add_rule(DynamicRule::new(
            "half",
            RuleCondition::LevelAtMost(LogLevel::Info),
            RuleAction::SampleWithRate,
        ));
        let hits = (0..4_000)
            .filter(|_| chain.evaluate(&LogRecord::now(LogLevel::Info, "o", "m")).is_accepted())
            .count();
        assert!((1_600..2_400).contains(&hits), "hits = {hits}");
    }

    #[test]
    fn sample_with_rate_rule_admits_errors_during_boost() {
        let chain = chain(LogLevel::Debug, SamplingStrategy::Random, 0.0);
        chain.rules().add_rule(DynamicRule::new(
            "payments-half",
            RuleCondition::origin_regex("payments").unwrap(),
            RuleAction::SampleWithRate,
        ));
        chain.sampler().trigger_error_boost();
        for _ in 0..200 {
            let r = LogRecord::now(LogLevel::Error, "payments", "declined");
            assert_eq!(chain.evaluate(&r), FilterVerdict::Accepted);
        }
        assert_eq!(chain.sampler().stats().seen, 200);
    }

    #[test]
    fn sampling_rejection_reported() {
        let chain = chain(LogLevel::Debug, SamplingStrategy::Random, 0.0);
        let v = chain.evaluate(&LogRecord::now(LogLevel::Info, "o", "m"));
        assert_eq!(v, FilterVerdict::SampledOut);
        assert_eq!(chain.sampler().stats().rejected, 1);
    }
}
