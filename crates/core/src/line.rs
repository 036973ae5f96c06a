//! 라인 코덱 -- 디스크 포맷 직렬화 및 역파싱
//!
//! 한 줄에 레코드 하나를 기록합니다.
//!
//! ```text
//! <version> <timestamp> <LEVEL> <threadName>(<threadId>) [<origin>] <message>
//! 1 2024-01-15T10:00:00.123456Z INFO main(1) [app::server] listening on :8080
//! ```
//!
//! # 이스케이프 규칙
//! - 모든 텍스트 필드: `\` → `\\`, LF → `\n`, CR → `\r`
//! - 단일 토큰 필드(version, thread name, origin): 공백 → `\s`
//!
//! 이 규칙 덕분에 메시지에 개행이 있어도 한 줄 한 레코드가 유지되고,
//! `parse_line(format_line(r)) == r`이 성립합니다.

use chrono::{DateTime, Utc};

use crate::error::{LogfluxError, ParseError};
use crate::pipeline::LogParser;
use crate::types::{LogLevel, LogRecord, ThreadInfo};

/// 파싱 가능한 최대 라인 길이 (바이트)
pub const MAX_LINE_LEN: usize = 1024 * 1024;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// 레코드를 디스크 포맷 한 줄로 직렬화합니다 (개행 미포함).
pub fn format_line(record: &LogRecord) -> String {
    let mut out = String::with_capacity(64 + record.message().len());
    escape_into(&mut out, record.version(), true);
    out.push(' ');
    out.push_str(&record.timestamp().format(TIMESTAMP_FORMAT).to_string());
    out.push(' ');
    out.push_str(record.level().as_str());
    out.push(' ');
    escape_into(&mut out, &record.thread().name, true);
    out.push('(');
    out.push_str(&record.thread().id.to_string());
    out.push_str(") [");
    escape_into(&mut out, record.origin(), true);
    out.push_str("] ");
    escape_into(&mut out, record.message(), false);
    out
}

/// 디스크 포맷 한 줄을 레코드로 파싱합니다.
///
/// 끝의 `\n` 또는 `\r\n`은 무시합니다.
pub fn parse_line(line: &str) -> Result<LogRecord, ParseError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    let mut cursor = Cursor { line, pos: 0 };

    let version = cursor.token("version")?;

    let ts_offset = cursor.pos;
    let ts_raw = cursor.token("timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(ts_raw)
        .map_err(|e| ParseError::Failed {
            offset: ts_offset,
            reason: format!("invalid timestamp '{ts_raw}': {e}"),
        })?
        .with_timezone(&Utc);

    let level_offset = cursor.pos;
    let level_raw = cursor.token("level")?;
    let level = parse_level(level_raw).ok_or_else(|| ParseError::Failed {
        offset: level_offset,
        reason: format!("unknown level '{level_raw}'"),
    })?;

    let thread_offset = cursor.pos;
    let thread_raw = cursor.token("thread")?;
    let thread = parse_thread(thread_raw).ok_or_else(|| ParseError::Failed {
        offset: thread_offset,
        reason: format!("malformed thread '{thread_raw}', expected name(id)"),
    })?;

    let origin_offset = cursor.pos;
    let origin_raw = cursor.token("origin")?;
    let origin = origin_raw
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| ParseError::Failed {
            offset: origin_offset,
            reason: format!("malformed origin '{origin_raw}', expected [origin]"),
        })?;

    let message = cursor.rest();

    Ok(LogRecord::new(
        unescape(version),
        timestamp,
        level,
        thread,
        unescape(origin),
        unescape(message),
    ))
}

fn parse_level(s: &str) -> Option<LogLevel> {
    LogLevel::ALL.into_iter().find(|level| level.as_str() == s)
}

fn parse_thread(token: &str) -> Option<ThreadInfo> {
    let body = token.strip_suffix(')')?;
    let open = body.rfind('(')?;
    let id = body[open + 1..].parse::<u64>().ok()?;
    Some(ThreadInfo::new(id, unescape(&body[..open])))
}

struct Cursor<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// 다음 공백까지의 토큰을 반환합니다. 마지막 토큰이 아니면 공백이 반드시 있어야 합니다.
    fn token(&mut self, field: &str) -> Result<&'a str, ParseError> {
        let rest = &self.line[self.pos..];
        match rest.find(' ') {
            Some(idx) => {
                self.pos += idx + 1;
                Ok(&rest[..idx])
            }
            None if field == "origin" && !rest.is_empty() => {
                self.pos = self.line.len();
                Ok(rest)
            }
            None => Err(ParseError::Failed {
                offset: self.pos,
                reason: format!("unexpected end of line while reading {field}"),
            }),
        }
    }

    fn rest(&self) -> &'a str {
        &self.line[self.pos..]
    }
}

fn escape_into(out: &mut String, s: &str, token: bool) {
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ' ' if token => out.push_str("\\s"),
            c => out.push(c),
        }
    }
}

fn unescape(s: &str) -> String {
    if !s.contains('\\') {
        return s.to_owned();
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('s') => out.push(' '),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// 디스크 포맷 파서
///
/// 분석기 등 외부 협력자가 회전된 파일을 다시 읽을 때 사용합니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineParser;

impl LineParser {
    /// 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

impl LogParser for LineParser {
    fn format_name(&self) -> &str {
        "logflux-line"
    }

    fn parse(&self, raw: &[u8]) -> Result<LogRecord, LogfluxError> {
        if raw.len() > MAX_LINE_LEN {
            return Err(ParseError::TooLarge {
                size: raw.len(),
                max: MAX_LINE_LEN,
            }
            .into());
        }
        let line = std::str::from_utf8(raw).map_err(|e| ParseError::InvalidUtf8 {
            offset: e.valid_up_to(),
        })?;
        Ok(parse_line(line)?)
    }
}
