#![no_main]

use arbitrary::Arbitrary;
use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

use logflux_core::line::{format_line, parse_line};
use logflux_core::types::{LogLevel, LogRecord, ThreadInfo};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzRecord {
    version: String,
    /// 0000-01-01 이후 초 (아래에서 9999년 이하로 제한)
    secs: u64,
    micros: u32,
    level: u8,
    thread_id: u64,
    thread_name: String,
    origin: String,
    message: String,
}

fn printable(s: &str) -> bool {
    !s.chars().any(char::is_control)
}

fuzz_target!(|input: FuzzRecord| {
    // 헤더 필드는 제어 문자를 담지 않는다
    if !printable(&input.version) || !printable(&input.thread_name) || !printable(&input.origin) {
        return;
    }
    let secs = (input.secs % 253_402_300_799) as i64;
    let Some(ts) = Utc
        .timestamp_opt(secs, (input.micros % 1_000_000) * 1_000)
        .single()
    else {
        return;
    };
    let level = LogLevel::ALL[usize::from(input.level) % LogLevel::ALL.len()];

    let record = LogRecord::new(
        input.version,
        ts,
        level,
        ThreadInfo::new(input.thread_id, input.thread_name),
        input.origin,
        input.message,
    );
    let line = format_line(&record);
    assert!(!line.contains('\n'));
    assert_eq!(parse_line(&line).ok(), Some(record));
});
