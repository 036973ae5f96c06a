#![no_main]

use libfuzzer_sys::fuzz_target;
use logflux_core::line::{LineParser, format_line, parse_line};
use logflux_core::pipeline::LogParser;

fuzz_target!(|data: &[u8]| {
    let parser = LineParser::new();

    // 크래시나 패닉 없이 Ok 또는 Err을 반환해야 한다
    let Ok(record) = parser.parse(data) else {
        return;
    };

    // 파싱에 성공한 레코드는 다시 직렬화해도 같은 레코드로 돌아와야 한다
    let line = format_line(&record);
    assert_eq!(parse_line(&line).ok(), Some(record));
});
