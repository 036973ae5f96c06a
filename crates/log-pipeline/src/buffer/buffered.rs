//! 메모리 버퍼 writer
//!
//! 고정 용량 `Vec<u8>`에 모았다가 다음 중 하나일 때 파일로 내보냅니다.
//! - 다음 쓰기가 용량을 넘길 때
//! - 마지막 플러시 이후 `flush_interval`이 지났을 때 (쓰기마다, 그리고 `flush_if_due`에서 확인)
//! - `auto_flush`가 켜져 있으면 매 쓰기 후
//!
//! 용량보다 큰 단일 쓰기는 버퍼를 먼저 비운 뒤 파일에 바로 씁니다.
//! 플러시가 실패하면 아직 쓰지 못한 바이트만 유지되어 다음 플러시에서 다시 시도합니다.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use logflux_core::metrics as m;

use super::{BufferStats, LogWriter};
use crate::error::LogPipelineError;

struct BufferedInner {
    file: Option<File>,
    buf: Vec<u8>,
    capacity: usize,
    flush_interval: Duration,
    last_flush: Instant,
    auto_flush: bool,
}

impl BufferedInner {
    /// 버퍼를 파일로 내보냅니다. 실패하면 아직 쓰지 못한 부분만 버퍼에 남깁니다.
    fn flush_buffer(&mut self) -> std::io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        drain_into(file, &mut self.buf)?;
        file.flush()?;
        self.last_flush = Instant::now();
        Ok(())
    }

    fn flush_logged(&mut self, path: &Path) -> bool {
        match self.flush_buffer() {
            Ok(()) => true,
            Err(e) => {
                metrics::counter!(m::WRITER_FLUSH_ERRORS_TOTAL).increment(1);
                tracing::warn!(
                    path = %path.display(),
                    pending = self.buf.len(),
                    error = %e,
                    "buffered writer flush failed, keeping pending bytes"
                );
                false
            }
        }
    }

    fn is_due(&self) -> bool {
        !self.buf.is_empty() && self.last_flush.elapsed() >= self.flush_interval
    }
}

/// `buf`를 `out`에 쓰고, 에러가 나도 이미 쓴 앞부분은 버퍼에서 제거합니다.
fn drain_into<W: Write>(out: &mut W, buf: &mut Vec<u8>) -> std::io::Result<()> {
    let mut written = 0;
    let result = loop {
        if written == buf.len() {
            break Ok(());
        }
        match out.write(&buf[written..]) {
            Ok(0) => break Err(std::io::ErrorKind::WriteZero.into()),
            Ok(n) => written += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => break Err(e),
        }
    };
    buf.drain(..written);
    result
}

/// 다른 스레드(타이머 등)에서 플러시를 요청하기 위한 핸들
#[derive(Clone)]
pub struct FlushHandle {
    inner: Arc<Mutex<BufferedInner>>,
    path: Arc<PathBuf>,
}

impl FlushHandle {
    /// 즉시 플러시합니다. 성공 여부를 반환합니다.
    pub fn flush(&self) -> bool {
        lock(&self.inner).flush_logged(&self.path)
    }

    /// 주기가 지났을 때만 플러시합니다.
    pub fn flush_if_due(&self) {
        let mut inner = lock(&self.inner);
        if inner.is_due() {
            inner.flush_logged(&self.path);
        }
    }
}

/// 고정 용량 메모리 버퍼를 가진 파일 writer
pub struct BufferedWriter {
    inner: Arc<Mutex<BufferedInner>>,
    path: Arc<PathBuf>,
    /// 논리 크기 (파일 기존 길이 + 받아들인 바이트)
    written: u64,
}

impl BufferedWriter {
    /// 파일을 append 모드로 엽니다 (없으면 생성).
    pub fn open(
        path: &Path,
        capacity: usize,
        flush_interval: Duration,
        auto_flush: bool,
    ) -> Result<Self, LogPipelineError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let existing = file.metadata()?.len();
        Ok(Self {
            inner: Arc::new(Mutex::new(BufferedInner {
                file: Some(file),
                buf: Vec::with_capacity(capacity),
                capacity,
                flush_interval,
                last_flush: Instant::now(),
                auto_flush,
            })),
            path: Arc::new(path.to_path_buf()),
            written: existing,
        })
    }

    pub fn flush_handle(&self) -> FlushHandle {
        FlushHandle {
            inner: Arc::clone(&self.inner),
            path: Arc::clone(&self.path),
        }
    }

    /// 아직 파일에 내보내지 않은 바이트 수
    pub fn pending(&self) -> usize {
        lock(&self.inner).buf.len()
    }
}

impl LogWriter for BufferedWriter {
    fn write(&mut self, data: &[u8]) -> Result<u64, LogPipelineError> {
        let mut inner = lock(&self.inner);
        if inner.file.is_none() {
            return Err(LogPipelineError::Writer {
                kind: "buffered".to_owned(),
                reason: format!("{} is closed", self.path.display()),
            });
        }

        if inner.buf.len() + data.len() > inner.capacity && !inner.buf.is_empty() {
            inner.flush_buffer()?;
        }

        if data.len() > inner.capacity {
            if let Some(file) = inner.file.as_mut() {
                file.write_all(data)?;
            }
        } else {
            inner.buf.extend_from_slice(data);
        }

        let offset = self.written;
        self.written += data.len() as u64;

        if inner.auto_flush || inner.is_due() {
            inner.flush_logged(&self.path);
        }
        Ok(offset)
    }

    fn flush(&mut self) {
        lock(&self.inner).flush_logged(&self.path);
    }

    fn close(&mut self) {
        let mut inner = lock(&self.inner);
        if inner.file.is_none() {
            return;
        }
        inner.flush_logged(&self.path);
        if let Some(file) = inner.file.take()
            && let Err(e) = file.sync_all()
        {
            metrics::counter!(m::WRITER_FLUSH_ERRORS_TOTAL).increment(1);
            tracing::warn!(path = %self.path.display(), error = %e, "failed to sync log file on close");
        }
        if !inner.buf.is_empty() {
            tracing::warn!(
                path = %self.path.display(),
                lost = inner.buf.len(),
                "closing buffered writer with unflushed bytes"
            );
            inner.buf.clear();
        }
    }

    fn flush_if_due(&mut self) {
        let mut inner = lock(&self.inner);
        if inner.is_due() {
            inner.flush_logged(&self.path);
        }
    }

    fn current_size(&self) -> u64 {
        self.written
    }

    fn stats(&self) -> BufferStats {
        let inner = lock(&self.inner);
        BufferStats {
            size: inner.buf.len() as u64,
            capacity: inner.capacity as u64,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BufferedWriter {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock(inner: &Mutex<BufferedInner>) -> MutexGuard<'_, BufferedInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `budget` 바이트까지 받고 그 뒤로는 실패하는 출력
    struct FlakySink {
        accepted: Vec<u8>,
        budget: usize,
    }

    impl Write for FlakySink {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            if self.budget == 0 {
                return Err(std::io::Error::other("disk full"));
            }
            let n = data.len().min(self.budget).min(4);
            self.accepted.extend_from_slice(&data[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn partial_flush_keeps_only_unwritten_bytes() {
        let mut sink = FlakySink {
            accepted: Vec::new(),
            budget: 6,
        };
        let mut buf = b"0123456789".to_vec();
        assert!(drain_into(&mut sink, &mut buf).is_err());
        assert_eq!(sink.accepted, b"012345");
        assert_eq!(buf, b"6789");

        sink.budget = usize::MAX;
        drain_into(&mut sink, &mut buf).unwrap();
        assert_eq!(sink.accepted, b"0123456789");
        assert!(buf.is_empty());
    }

    fn open(dir: &tempfile::TempDir, capacity: usize, auto_flush: bool) -> BufferedWriter {
        BufferedWriter::open(
            &dir.path().join("app.log"),
            capacity,
            Duration::from_secs(3600),
            auto_flush,
        )
        .unwrap()
    }

    fn on_disk(dir: &tempfile::TempDir) -> Vec<u8> {
        std::fs::read(dir.path().join("app.log")).unwrap()
    }

    #[test]
    fn buffers_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = open(&dir, 64, false);
        assert_eq!(w.write(b"abc").unwrap(), 0);
        assert_eq!(w.write(b"def").unwrap(), 3);
        assert!(on_disk(&dir).is_empty());
        assert_eq!(w.stats().size, 6);

        w.flush();
        assert_eq!(on_disk(&dir), b"abcdef");
        assert_eq!(w.stats().size, 0);
    }

    #[test]
    fn flushes_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = open(&dir, 8, false);
        w.write(b"12345").unwrap();
        w.write(b"6789").unwrap();
        assert_eq!(on_disk(&dir), b"12345");
        assert_eq!(w.pending(), 4);
    }

    #[test]
    fn oversized_write_bypasses_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = open(&dir, 4, false);
        w.write(b"ab").unwrap();
        w.write(b"0123456789").unwrap();
        assert_eq!(on_disk(&dir), b"ab0123456789");
        assert_eq!(w.current_size(), 12);
    }

    #[test]
    fn auto_flush_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = open(&dir, 1024, true);
        w.write(b"line\n").unwrap();
        assert_eq!(on_disk(&dir), b"line\n");
    }

    #[test]
    fn interval_flush() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = BufferedWriter::open(
            &dir.path().join("app.log"),
            1024,
            Duration::from_millis(10),
            false,
        )
        .unwrap();
        w.write(b"x").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        w.flush_if_due();
        assert_eq!(on_disk(&dir), b"x");
    }

    #[test]
    fn flush_handle_from_other_thread() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = open(&dir, 1024, false);
        let handle = w.flush_handle();
        w.write(b"from main").unwrap();
        std::thread::spawn(move || assert!(handle.flush()))
            .join()
            .unwrap();
        assert_eq!(on_disk(&dir), b"from main");
    }

    #[test]
    fn close_is_idempotent_and_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = open(&dir, 1024, false);
        w.write(b"tail").unwrap();
        w.close();
        w.close();
        assert_eq!(on_disk(&dir), b"tail");
        assert!(w.write(b"late").is_err());
    }

    #[test]
    fn appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.log"), b"old\n").unwrap();
        let mut w = open(&dir, 1024, false);
        assert_eq!(w.current_size(), 4);
        assert_eq!(w.write(b"new\n").unwrap(), 4);
        w.close();
        assert_eq!(on_disk(&dir), b"old\nnew\n");
    }
}
