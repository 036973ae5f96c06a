//! 통계적 샘플링 -- 레벨과 무관하게 레코드 수용 비율을 조절합니다.
//!
//! # 전략
//! - `Random`: 매 레코드마다 균등 난수와 현재 비율을 비교
//! - `Systematic`: `round(1 / rate)` 간격의 카운터
//! - `Adaptive`: ERROR 이상은 항상 수용, 나머지는 비율 적용
//! - `Burst`: ERROR 이상을 관측하면 부스트 윈도우를 열고, 윈도우 동안 비율 10배
//!
//! 부스트 윈도우가 열려 있는 동안에는 전략과 무관하게 ERROR 이상은 항상 수용됩니다.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rand::Rng;

use logflux_core::types::LogRecord;

/// 부스트 윈도우 동안의 비율 배수
pub const BOOST_MULTIPLIER: f64 = 10.0;

/// 샘플링 전략
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SamplingStrategy {
    #[default]
    Random,
    Systematic,
    Adaptive,
    Burst,
}

impl SamplingStrategy {
    /// 대소문자를 무시하고 파싱합니다. 알 수 없는 값은 `None`입니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Some(Self::Random),
            "systematic" => Some(Self::Systematic),
            "adaptive" => Some(Self::Adaptive),
            "burst" => Some(Self::Burst),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Random => 0,
            Self::Systematic => 1,
            Self::Adaptive => 2,
            Self::Burst => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Systematic,
            2 => Self::Adaptive,
            3 => Self::Burst,
            _ => Self::Random,
        }
    }
}

/// 샘플러 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// 샘플링 판단을 거친 레코드 수
    pub seen: u64,
    /// 수용된 레코드 수
    pub sampled: u64,
    /// 거부된 레코드 수
    pub rejected: u64,
}

/// 런타임 조정 가능한 샘플러
#[derive(Debug)]
pub struct Sampler {
    strategy: AtomicU8,
    /// f64 비트 표현
    rate: AtomicU64,
    boost_duration: Duration,
    /// `epoch` 기준 부스트 종료 시각 (나노초). 0이면 비활성.
    boost_until_nanos: AtomicU64,
    epoch: Instant,
    systematic_counter: AtomicU64,
    seen: AtomicU64,
    sampled: AtomicU64,
    rejected: AtomicU64,
}

impl Sampler {
    pub fn new(strategy: SamplingStrategy, rate: f64, boost_duration: Duration) -> Self {
        Self {
            strategy: AtomicU8::new(strategy.to_u8()),
            rate: AtomicU64::new(clamp_rate(rate).to_bits()),
            boost_duration,
            boost_until_nanos: AtomicU64::new(0),
            epoch: Instant::now(),
            systematic_counter: AtomicU64::new(0),
            seen: AtomicU64::new(0),
            sampled: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn strategy(&self) -> SamplingStrategy {
        SamplingStrategy::from_u8(self.strategy.load(Ordering::Acquire))
    }

    pub fn set_strategy(&self, strategy: SamplingStrategy) {
        self.strategy.store(strategy.to_u8(), Ordering::Release);
    }

    /// 현재 기본 비율 (0.0 ~ 1.0)
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate.load(Ordering::Acquire))
    }

    /// 비율을 변경합니다. [0, 1]로 클램프되며 NaN은 0으로 취급합니다.
    pub fn set_rate(&self, rate: f64) {
        let clamped = clamp_rate(rate);
        self.rate.store(clamped.to_bits(), Ordering::Release);
        tracing::debug!(rate = clamped, "sampling rate updated");
    }

    /// 부스트 윈도우를 엽니다 (이미 열려 있으면 연장).
    pub fn trigger_error_boost(&self) {
        let until = self.now_nanos().saturating_add(duration_nanos(self.boost_duration));
        // 0은 비활성 표시이므로 최소 1
        self.boost_until_nanos.store(until.max(1), Ordering::Release);
    }

    /// 부스트 윈도우가 열려 있는지 확인합니다.
    pub fn is_boost_active(&self) -> bool {
        let until = self.boost_until_nanos.load(Ordering::Acquire);
        until != 0 && self.now_nanos() < until
    }

    /// 레코드를 샘플링할지 결정하고 통계를 갱신합니다.
    pub fn should_sample(&self, record: &LogRecord) -> bool {
        let decision = self.decide(record);
        self.count(decision)
    }

    /// 전략 대신 고정 비율로 결정합니다 (동적 규칙용).
    ///
    /// 부스트 윈도우의 ERROR+ 보장은 그대로 적용됩니다.
    pub fn sample_at(&self, record: &LogRecord, rate: f64) -> bool {
        let decision = self.boosted_severe(record) || draw(clamp_rate(rate));
        self.count(decision)
    }

    fn count(&self, decision: bool) -> bool {
        self.seen.fetch_add(1, Ordering::Relaxed);
        if decision {
            self.sampled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
        decision
    }

    /// BURST에서 ERROR+가 윈도우를 열고, 열린 윈도우 안의 ERROR+는 항상 통과합니다.
    fn boosted_severe(&self, record: &LogRecord) -> bool {
        let severe = record.level().is_error_or_above();
        if severe && self.strategy() == SamplingStrategy::Burst {
            self.trigger_error_boost();
        }
        severe && self.is_boost_active()
    }

    fn decide(&self, record: &LogRecord) -> bool {
        if self.boosted_severe(record) {
            return true;
        }
        let severe = record.level().is_error_or_above();
        let boosted = self.is_boost_active();

        let rate = self.rate();
        match self.strategy() {
            SamplingStrategy::Random => draw(rate),
            SamplingStrategy::Systematic => self.systematic(rate),
            SamplingStrategy::Adaptive => severe || draw(rate),
            SamplingStrategy::Burst => {
                if boosted {
                    draw((rate * BOOST_MULTIPLIER).min(1.0))
                } else {
                    draw(rate)
                }
            }
        }
    }

    fn systematic(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        let stride = (1.0 / rate).round().max(1.0);
        // 비율이 극히 작으면 stride가 u64 범위를 넘을 수 있음
        if stride >= u64::MAX as f64 {
            return false;
        }
        let stride = stride as u64;
        let n = self.systematic_counter.fetch_add(1, Ordering::Relaxed);
        n % stride == 0
    }

    pub fn stats(&self) -> SamplerStats {
        SamplerStats {
            seen: self.seen.load(Ordering::Relaxed),
            sampled: self.sampled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    fn now_nanos(&self) -> u64 {
        duration_nanos(self.epoch.elapsed())
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(SamplingStrategy::Random, 1.0, Duration::from_secs(30))
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) }
}

fn draw(rate: f64) -> bool {
    if rate >= 1.0 {
        true
    } else if rate <= 0.0 {
        false
    } else {
        rand::thread_rng().gen_bool(rate)
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflux_core::types::LogLevel;

    fn info() -> LogRecord {
        LogRecord::now(LogLevel::Info, "sampler", "info message")
    }

    fn error() -> LogRecord {
        LogRecord::now(LogLevel::Error, "sampler", "error message")
    }

    #[test]
    fn rate_is_clamped() {
        let s = Sampler::default();
        s.set_rate(1.5);
        assert_eq!(s.rate(), 1.0);
        s.set_rate(-0.2);
        assert_eq!(s.rate(), 0.0);
        s.set_rate(f64::NAN);
        assert_eq!(s.rate(), 0.0);
    }

    #[test]
    fn rate_zero_never_samples_and_one_always_samples() {
        for strategy in [
            SamplingStrategy::Random,
            SamplingStrategy::Systematic,
            SamplingStrategy::Adaptive,
            SamplingStrategy::Burst,
        ] {
            let zero = Sampler::new(strategy, 0.0, Duration::from_secs(30));
            let one = Sampler::new(strategy, 1.0, Duration::from_secs(30));
            for _ in 0..200 {
                assert!(!zero.should_sample(&info()), "{strategy:?}");
                assert!(one.should_sample(&info()), "{strategy:?}");
            }
        }
    }

    #[test]
    fn systematic_stride() {
        let s = Sampler::new(SamplingStrategy::Systematic, 0.25, Duration::from_secs(1));
        let picks: Vec<bool> = (0..8).map(|_| s.should_sample(&info())).collect();
        assert_eq!(
            picks,
            vec![true, false, false, false, true, false, false, false]
        );
    }

    #[test]
    fn systematic_stride_rounds() {
        // 1 / 0.3 = 3.33 -> 3
        let s = Sampler::new(SamplingStrategy::Systematic, 0.3, Duration::from_secs(1));
        let count = (0..9).filter(|_| s.should_sample(&info())).count();
        assert_eq!(count, 3);
    }

    #[test]
    fn adaptive_always_admits_errors() {
        let s = Sampler::new(SamplingStrategy::Adaptive, 0.0, Duration::from_secs(1));
        assert!(s.should_sample(&error()));
        assert!(!s.should_sample(&info()));
        assert!(!s.is_boost_active());
    }

    #[test]
    fn rate_zero_admits_errors_only_inside_boost_window() {
        let s = Sampler::new(SamplingStrategy::Random, 0.0, Duration::from_secs(30));
        assert!(!s.should_sample(&error()));
        s.trigger_error_boost();
        assert!(s.is_boost_active());
        assert!(s.should_sample(&error()));
        assert!(!s.should_sample(&info()));
    }

    #[test]
    fn burst_error_opens_window() {
        let s = Sampler::new(SamplingStrategy::Burst, 0.0, Duration::from_secs(30));
        assert!(!s.is_boost_active());
        assert!(s.should_sample(&error()));
        assert!(s.is_boost_active());
        // 0.0 * 10 = 0.0
        assert!(!s.should_sample(&info()));
    }

    #[test]
    fn burst_boost_multiplies_rate() {
        let s = Sampler::new(SamplingStrategy::Burst, 0.1, Duration::from_secs(30));
        s.trigger_error_boost();
        // 0.1 * 10 = 1.0 during the window
        for _ in 0..100 {
            assert!(s.should_sample(&info()));
        }
    }

    #[test]
    fn fixed_rate_keeps_boost_guarantee() {
        let s = Sampler::new(SamplingStrategy::Random, 1.0, Duration::from_secs(30));
        assert!(!s.sample_at(&error(), 0.0));
        s.trigger_error_boost();
        for _ in 0..20 {
            assert!(s.sample_at(&error(), 0.0));
        }
        assert!(!s.sample_at(&info(), 0.0));
        assert!(s.sample_at(&info(), 1.0));
        assert_eq!(s.stats().seen, 23);
    }

    #[test]
    fn boost_window_expires() {
        let s = Sampler::new(SamplingStrategy::Random, 0.0, Duration::from_millis(20));
        s.trigger_error_boost();
        assert!(s.is_boost_active());
        std::thread::sleep(Duration::from_millis(40));
        assert!(!s.is_boost_active());
        assert!(!s.should_sample(&error()));
    }

    #[test]
    fn stats_track_decisions() {
        let s = Sampler::new(SamplingStrategy::Systematic, 0.5, Duration::from_secs(1));
        for _ in 0..10 {
            s.should_sample(&info());
        }
        let stats = s.stats();
        assert_eq!(stats.seen, 10);
        assert_eq!(stats.sampled, 5);
        assert_eq!(stats.rejected, 5);
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!(
            SamplingStrategy::from_str_loose("BURST"),
            Some(SamplingStrategy::Burst)
        );
        assert_eq!(SamplingStrategy::from_str_loose("zipf"), None);
    }

    #[test]
    fn random_rate_is_roughly_respected() {
        let s = Sampler::new(SamplingStrategy::Random, 0.5, Duration::from_secs(1));
        let hits = (0..10_000).filter(|_| s.should_sample(&info())).count();
        assert!((4_000..6_000).contains(&hits), "hits = {hits}");
    }
}
