//! logflux.toml 통합 설정 테스트
//!
//! - logflux.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use logflux_core::config::LogfluxConfig;
use logflux_core::error::{ConfigError, LogfluxError};
use serial_test::serial;

const EXAMPLE: &str = include_str!("../../../logflux.toml.example");

// =============================================================================
// logflux.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = LogfluxConfig::parse(EXAMPLE).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.pipeline.file_prefix, "app");
}

#[test]
fn example_config_passes_validation() {
    let config = LogfluxConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_defaults() {
    let example = LogfluxConfig::parse(EXAMPLE).expect("should parse");
    let defaults = LogfluxConfig::default();

    assert_eq!(example.pipeline.queue_capacity, defaults.pipeline.queue_capacity);
    assert_eq!(example.rotation.policy, defaults.rotation.policy);
    assert_eq!(example.rotation.max_bytes, defaults.rotation.max_bytes);
    assert_eq!(
        example.retention.total_size_cap_bytes,
        defaults.retention.total_size_cap_bytes
    );
    assert_eq!(example.writer.ring_capacity, defaults.writer.ring_capacity);
    assert_eq!(example.sampling.boost_duration_ms, defaults.sampling.boost_duration_ms);
    assert_eq!(
        example.backpressure.high_watermark,
        defaults.backpressure.high_watermark
    );
    assert_eq!(example.broadcast.replay_size, defaults.broadcast.replay_size);
}

// =============================================================================
// 부분 설정 / 에러
// =============================================================================

#[test]
fn partial_config_only_writer_section() {
    let config = LogfluxConfig::parse(
        r#"
[writer]
kind = "mmap"
mmap_max_size = 4096
"#,
    )
    .expect("should parse");

    assert_eq!(config.writer.kind, "mmap");
    assert_eq!(config.writer.mmap_max_size, 4096);
    assert_eq!(config.writer.buffer_capacity, 64 * 1024);
    assert_eq!(config.rotation.pattern, "daily");
}

#[test]
fn wrong_type_is_parse_error() {
    let err = LogfluxConfig::parse("[pipeline]\nqueue_capacity = \"lots\"").unwrap_err();
    assert!(matches!(
        err,
        LogfluxError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[tokio::test]
async fn from_file_reads_partial_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logflux.toml");
    std::fs::write(&path, "[rotation]\npattern = \"hourly\"\n").unwrap();

    let config = LogfluxConfig::from_file(&path).await.unwrap();
    assert_eq!(config.rotation.pattern, "hourly");
}

#[tokio::test]
#[serial]
async fn env_var_takes_precedence_over_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logflux.toml");
    std::fs::write(&path, "[backpressure]\nstrategy = \"block\"\n").unwrap();

    // SAFETY: serial 테스트로 실행되어 다른 테스트와 환경변수를 공유하지 않습니다.
    unsafe { std::env::set_var("LOGFLUX_BACKPRESSURE_STRATEGY", "drop_new") };
    let config = LogfluxConfig::load(&path).await.unwrap();
    unsafe { std::env::remove_var("LOGFLUX_BACKPRESSURE_STRATEGY") };

    assert_eq!(config.backpressure.strategy, "drop_new");
}
