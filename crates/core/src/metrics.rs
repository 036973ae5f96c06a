//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logflux_`
//! - 모듈명: `pipeline_`, `writer_`, `rotation_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(logflux_core::metrics::PIPELINE_RECORDS_WRITTEN_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 레벨 레이블 키 (DEBUG, INFO, WARN, ERROR, FATAL)
pub const LABEL_LEVEL: &str = "level";

/// 사유 레이블 키 (drop_new, drop_oldest, closed, level, pattern, rule, sampling)
pub const LABEL_REASON: &str = "reason";

// ─── Pipeline 메트릭 ────────────────────────────────────────────────

/// Pipeline: 제출된 레코드 수 (counter)
pub const PIPELINE_RECORDS_SUBMITTED_TOTAL: &str = "logflux_pipeline_records_submitted_total";

/// Pipeline: 수신 단계에서 드롭된 레코드 수 (counter, label: reason)
pub const PIPELINE_RECORDS_DROPPED_TOTAL: &str = "logflux_pipeline_records_dropped_total";

/// Pipeline: 필터 체인에서 걸러진 레코드 수 (counter, label: reason)
pub const PIPELINE_RECORDS_FILTERED_TOTAL: &str = "logflux_pipeline_records_filtered_total";

/// Pipeline: 기록된 레코드 수 (counter)
pub const PIPELINE_RECORDS_WRITTEN_TOTAL: &str = "logflux_pipeline_records_written_total";

/// Pipeline: 브로드캐스트된 레코드 수 (counter)
pub const PIPELINE_RECORDS_BROADCAST_TOTAL: &str = "logflux_pipeline_records_broadcast_total";

/// Pipeline: 수신 큐 깊이 (gauge)
pub const PIPELINE_QUEUE_DEPTH: &str = "logflux_pipeline_queue_depth";

/// Pipeline: 레코드 처리 지연 시간 (histogram, 초)
pub const PIPELINE_PROCESSING_DURATION_SECONDS: &str =
    "logflux_pipeline_processing_duration_seconds";

// ─── Writer 메트릭 ──────────────────────────────────────────────────

/// Writer: 기록된 바이트 수 (counter)
pub const WRITER_BYTES_WRITTEN_TOTAL: &str = "logflux_writer_bytes_written_total";

/// Writer: 쓰기 실패 수 (counter)
pub const WRITER_WRITE_ERRORS_TOTAL: &str = "logflux_writer_write_errors_total";

/// Writer: 플러시/닫기 실패 수 (counter)
pub const WRITER_FLUSH_ERRORS_TOTAL: &str = "logflux_writer_flush_errors_total";

// ─── Rotation 메트릭 ────────────────────────────────────────────────

/// Rotation: 회전 수 (counter)
pub const ROTATION_ROTATIONS_TOTAL: &str = "logflux_rotation_rotations_total";

/// Rotation: 압축 실패 수 (counter)
pub const ROTATION_COMPRESSION_FAILURES_TOTAL: &str =
    "logflux_rotation_compression_failures_total";

/// Rotation: 보존 정책으로 삭제된 파일 수 (counter)
pub const ROTATION_RETENTION_DELETED_TOTAL: &str = "logflux_rotation_retention_deleted_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 레코드 처리 지연 시간 히스토그램 버킷 (초)
///
/// 1us ~ 100ms 범위
pub const PROCESSING_DURATION_BUCKETS: [f64; 9] = [
    0.000_001, 0.000_005, 0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.01, 0.1,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        PIPELINE_RECORDS_SUBMITTED_TOTAL,
        "Total number of records submitted by producers"
    );
    describe_counter!(
        PIPELINE_RECORDS_DROPPED_TOTAL,
        "Records dropped at admission (backpressure or closed queue)"
    );
    describe_counter!(
        PIPELINE_RECORDS_FILTERED_TOTAL,
        "Records rejected by the filter chain"
    );
    describe_counter!(
        PIPELINE_RECORDS_WRITTEN_TOTAL,
        "Records appended to the active log file"
    );
    describe_counter!(
        PIPELINE_RECORDS_BROADCAST_TOTAL,
        "Records published to stream subscribers"
    );
    describe_gauge!(PIPELINE_QUEUE_DEPTH, "Current admission queue depth");
    describe_histogram!(
        PIPELINE_PROCESSING_DURATION_SECONDS,
        "Per-record processing latency in the consumer loop"
    );

    describe_counter!(WRITER_BYTES_WRITTEN_TOTAL, "Bytes accepted by the active writer");
    describe_counter!(WRITER_WRITE_ERRORS_TOTAL, "Failed writer appends");
    describe_counter!(WRITER_FLUSH_ERRORS_TOTAL, "Swallowed flush or close failures");

    describe_counter!(ROTATION_ROTATIONS_TOTAL, "Completed file rotations");
    describe_counter!(
        ROTATION_COMPRESSION_FAILURES_TOTAL,
        "Rotated files left uncompressed because compression failed"
    );
    describe_counter!(
        ROTATION_RETENTION_DELETED_TOTAL,
        "Files deleted by retention enforcement"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_follow_convention() {
        let counters = [
            PIPELINE_RECORDS_SUBMITTED_TOTAL,
            PIPELINE_RECORDS_DROPPED_TOTAL,
            PIPELINE_RECORDS_FILTERED_TOTAL,
            PIPELINE_RECORDS_WRITTEN_TOTAL,
            PIPELINE_RECORDS_BROADCAST_TOTAL,
            WRITER_BYTES_WRITTEN_TOTAL,
            WRITER_WRITE_ERRORS_TOTAL,
            WRITER_FLUSH_ERRORS_TOTAL,
            ROTATION_ROTATIONS_TOTAL,
            ROTATION_COMPRESSION_FAILURES_TOTAL,
            ROTATION_RETENTION_DELETED_TOTAL,
        ];
        for name in counters {
            assert!(name.starts_with("logflux_"), "{name}");
            assert!(name.ends_with("_total"), "{name}");
        }
        assert!(PIPELINE_PROCESSING_DURATION_SECONDS.ends_with("_seconds"));
    }

    #[test]
    fn buckets_are_sorted() {
        assert!(PROCESSING_DURATION_BUCKETS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn describe_all_without_recorder_does_not_panic() {
        describe_all();
    }
}
