//! 버퍼링 계층 -- 활성 로그 파일 앞단의 writer 구현
//!
//! 세 가지 writer가 같은 [`LogWriter`] trait을 구현합니다.
//!
//! | writer | 특성 |
//! |---|---|
//! | [`BufferedWriter`] | 고정 용량 메모리 버퍼, 가득 차거나 주기가 지나면 플러시 |
//! | [`RingBufferWriter`] | lock-free SPSC 링에 프레임 단위로 적재 후 파일로 배출 |
//! | [`MmapWriter`] | 미리 크기를 잡은 파일을 메모리 맵으로 직접 기록 |
//!
//! `flush`/`close`는 에러를 반환하지 않습니다. 실패는 `tracing::warn!`으로 남기고
//! 메트릭으로 집계합니다.

pub mod buffered;
pub mod mmap;
pub mod ring;

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use crate::error::LogPipelineError;

pub use buffered::{BufferedWriter, FlushHandle};
pub use mmap::{MmapWriter, RollingMmapWriter};
pub use ring::{RingBuffer, RingBufferWriter};

/// writer 버퍼 상태 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    /// 현재 버퍼에 머무는 바이트 수
    pub size: u64,
    /// 버퍼 용량
    pub capacity: u64,
}

/// 활성 로그 파일 writer
pub trait LogWriter: Send {
    /// 바이트를 기록하고 그 논리 오프셋을 반환합니다.
    fn write(&mut self, data: &[u8]) -> Result<u64, LogPipelineError>;

    /// 여러 조각을 순서대로 기록하고 총 바이트 수를 반환합니다.
    fn write_batch(&mut self, batch: &[Bytes]) -> Result<u64, LogPipelineError> {
        let mut total = 0u64;
        for chunk in batch {
            self.write(chunk)?;
            total += chunk.len() as u64;
        }
        Ok(total)
    }

    /// 버퍼를 파일로 내보냅니다.
    fn flush(&mut self);

    /// 플러시 후 파일을 닫습니다. 여러 번 호출해도 안전합니다.
    fn close(&mut self);

    /// 플러시 주기가 지났으면 플러시합니다.
    fn flush_if_due(&mut self);

    /// 지금까지 받아들인 논리 바이트 수
    fn current_size(&self) -> u64;

    fn stats(&self) -> BufferStats;

    /// `len` 바이트를 더 받을 수 있는지 확인합니다.
    fn has_room(&self, _len: usize) -> bool {
        true
    }

    fn path(&self) -> &Path;
}

/// writer 종류와 파라미터
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterKind {
    Buffered {
        capacity: usize,
        flush_interval: Duration,
        auto_flush: bool,
    },
    RingBuffer {
        capacity: usize,
    },
    MemoryMapped {
        max_size: u64,
    },
}

impl WriterKind {
    /// 로그/메트릭용 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::Buffered { .. } => "buffered",
            Self::RingBuffer { .. } => "ring_buffer",
            Self::MemoryMapped { .. } => "mmap",
        }
    }
}

impl Default for WriterKind {
    fn default() -> Self {
        Self::Buffered {
            capacity: 64 * 1024,
            flush_interval: Duration::from_secs(1),
            auto_flush: false,
        }
    }
}

/// 주어진 경로에 writer를 엽니다.
pub fn open_writer(kind: &WriterKind, path: &Path) -> Result<Box<dyn LogWriter>, LogPipelineError> {
    let writer: Box<dyn LogWriter> = match kind {
        WriterKind::Buffered {
            capacity,
            flush_interval,
            auto_flush,
        } => Box::new(BufferedWriter::open(
            path,
            *capacity,
            *flush_interval,
            *auto_flush,
        )?),
        WriterKind::RingBuffer { capacity } => Box::new(RingBufferWriter::open(path, *capacity)?),
        WriterKind::MemoryMapped { max_size } => Box::new(MmapWriter::open(path, *max_size)?),
    };
    tracing::debug!(kind = kind.name(), path = %path.display(), "opened log writer");
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_each_kind() {
        let dir = tempfile::tempdir().unwrap();
        let kinds = [
            WriterKind::default(),
            WriterKind::RingBuffer { capacity: 1024 },
            WriterKind::MemoryMapped { max_size: 4096 },
        ];
        for (i, kind) in kinds.iter().enumerate() {
            let path = dir.path().join(format!("w{i}.log"));
            let mut writer = open_writer(kind, &path).unwrap();
            writer.write(b"hello\n").unwrap();
            writer.close();
            assert_eq!(std::fs::read(&path).unwrap(), b"hello\n", "{}", kind.name());
        }
    }

    #[test]
    fn default_write_batch_sums_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.log");
        let mut writer = open_writer(&WriterKind::default(), &path).unwrap();
        let batch = [Bytes::from_static(b"ab\n"), Bytes::from_static(b"cde\n")];
        assert_eq!(writer.write_batch(&batch).unwrap(), 7);
        assert_eq!(writer.current_size(), 7);
        writer.close();
        assert_eq!(std::fs::read(&path).unwrap(), b"ab\ncde\n");
    }

    #[test]
    fn open_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("x.log");
        assert!(open_writer(&WriterKind::default(), &path).is_err());
    }
}
