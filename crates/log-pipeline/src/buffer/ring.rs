//! lock-free SPSC 링 버퍼와 이를 쓰는 writer
//!
//! # 레이아웃
//! `write_index`와 `read_index`는 단조 증가하는 `u64`이며 물리 위치는
//! `index % capacity`입니다. 레코드는 4바이트 리틀엔디언 길이 헤더와 페이로드로
//! 이루어진 프레임으로 저장되며, 헤더와 페이로드 각각 버퍼 끝을 넘으면 두 번에 나눠
//! 복사합니다.
//!
//! # 동시성
//! 생산자 하나와 소비자 하나가 동시에 사용할 수 있습니다. 생산자는 바이트를 쓴 뒤
//! `write_index`를 Release로 발행하고, 소비자는 Acquire로 읽은 뒤 프레임을 복사하고
//! `read_index`를 Release로 발행합니다. 저장소는 바이트 단위 atomic이라 생산자가
//! 둘 이상이면 프레임이 깨질 수 있지만 메모리 안전성은 유지됩니다.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use bytes::Bytes;

use logflux_core::metrics as m;

use super::{BufferStats, LogWriter};
use crate::error::LogPipelineError;

/// 프레임 헤더 길이
pub const FRAME_HEADER_LEN: usize = 4;

/// SPSC 프레임 링 버퍼
pub struct RingBuffer {
    storage: Box<[AtomicU8]>,
    capacity: u64,
    write_index: AtomicU64,
    read_index: AtomicU64,
}

impl RingBuffer {
    /// `capacity` 바이트 링을 생성합니다. 0이면 1로 올립니다.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
            capacity: capacity as u64,
            write_index: AtomicU64::new(0),
            read_index: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// 읽히지 않은 바이트 수 (헤더 포함)
    pub fn len_bytes(&self) -> usize {
        let w = self.write_index.load(Ordering::Acquire);
        let r = self.read_index.load(Ordering::Acquire);
        usize::try_from(w.saturating_sub(r)).unwrap_or(usize::MAX)
    }

    pub fn free_bytes(&self) -> usize {
        self.capacity().saturating_sub(self.len_bytes())
    }

    pub fn is_empty(&self) -> bool {
        self.len_bytes() == 0
    }

    /// 프레임 하나를 씁니다.
    ///
    /// 공간이 부족하거나 프레임이 용량보다 크면 `false`를 반환하고 아무것도 쓰지 않습니다.
    pub fn write(&self, data: &[u8]) -> bool {
        let Ok(len) = u32::try_from(data.len()) else {
            return false;
        };
        let frame_len = (FRAME_HEADER_LEN + data.len()) as u64;
        if frame_len > self.capacity {
            return false;
        }

        let w = self.write_index.load(Ordering::Relaxed);
        let r = self.read_index.load(Ordering::Acquire);
        if self.capacity - (w - r) < frame_len {
            return false;
        }

        self.copy_in(w, &len.to_le_bytes());
        self.copy_in(w + FRAME_HEADER_LEN as u64, data);
        self.write_index.store(w + frame_len, Ordering::Release);
        true
    }

    /// 프레임 하나를 읽습니다.
    pub fn read_one(&self) -> Option<Bytes> {
        let r = self.read_index.load(Ordering::Relaxed);
        let w = self.write_index.load(Ordering::Acquire);
        if r == w {
            return None;
        }

        let mut header = [0u8; FRAME_HEADER_LEN];
        self.copy_out(r, &mut header);
        let len = u32::from_le_bytes(header) as usize;

        let mut payload = vec![0u8; len];
        self.copy_out(r + FRAME_HEADER_LEN as u64, &mut payload);
        self.read_index
            .store(r + (FRAME_HEADER_LEN + len) as u64, Ordering::Release);
        Some(Bytes::from(payload))
    }

    /// 현재 읽을 수 있는 프레임을 모두 읽습니다.
    pub fn read_batch(&self) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(frame) = self.read_one() {
            out.push(frame);
        }
        out
    }

    fn physical(&self, index: u64) -> usize {
        // capacity는 storage.len()에서 왔으므로 나머지는 usize 범위 안
        (index % self.capacity) as usize
    }

    fn copy_in(&self, index: u64, src: &[u8]) {
        let start = self.physical(index);
        let first = src.len().min(self.storage.len() - start);
        for (slot, byte) in self.storage[start..start + first].iter().zip(&src[..first]) {
            slot.store(*byte, Ordering::Relaxed);
        }
        for (slot, byte) in self.storage.iter().zip(&src[first..]) {
            slot.store(*byte, Ordering::Relaxed);
        }
    }

    fn copy_out(&self, index: u64, dst: &mut [u8]) {
        let start = self.physical(index);
        let first = dst.len().min(self.storage.len() - start);
        let (head, tail) = dst.split_at_mut(first);
        for (byte, slot) in head.iter_mut().zip(&self.storage[start..start + first]) {
            *byte = slot.load(Ordering::Relaxed);
        }
        for (byte, slot) in tail.iter_mut().zip(self.storage.iter()) {
            *byte = slot.load(Ordering::Relaxed);
        }
    }
}

/// 링 버퍼에 적재했다가 파일로 배출하는 writer
///
/// 링이 가득 차면 배출 후 다시 시도하고, 링보다 큰 레코드는 배출 후 파일에 바로 씁니다.
/// 배출 중 쓰기에 실패한 바이트는 `pending`에 남겨 다음 플러시에서 먼저 씁니다.
pub struct RingBufferWriter {
    ring: RingBuffer,
    file: Option<File>,
    path: PathBuf,
    pending: Vec<u8>,
    written: u64,
}

impl RingBufferWriter {
    pub fn open(path: &Path, capacity: usize) -> Result<Self, LogPipelineError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let existing = file.metadata()?.len();
        Ok(Self {
            ring: RingBuffer::new(capacity),
            file: Some(file),
            path: path.to_path_buf(),
            pending: Vec::new(),
            written: existing,
        })
    }

    fn drain(&mut self) -> std::io::Result<()> {
        for frame in self.ring.read_batch() {
            self.pending.extend_from_slice(&frame);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        if !self.pending.is_empty() {
            file.write_all(&self.pending)?;
            self.pending.clear();
        }
        file.flush()
    }

    fn drain_logged(&mut self) {
        if let Err(e) = self.drain() {
            metrics::counter!(m::WRITER_FLUSH_ERRORS_TOTAL).increment(1);
            tracing::warn!(
                path = %self.path.display(),
                pending = self.pending.len(),
                error = %e,
                "ring buffer drain failed, keeping pending bytes"
            );
        }
    }
}

impl LogWriter for RingBufferWriter {
    fn write(&mut self, data: &[u8]) -> Result<u64, LogPipelineError> {
        if self.file.is_none() {
            return Err(LogPipelineError::Writer {
                kind: "ring_buffer".to_owned(),
                reason: format!("{} is closed", self.path.display()),
            });
        }

        if !self.ring.write(data) {
            self.drain()?;
            if !self.ring.write(data)
                && let Some(file) = self.file.as_mut()
            {
                file.write_all(data)?;
            }
        }

        let offset = self.written;
        self.written += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) {
        self.drain_logged();
    }

    fn close(&mut self) {
        if self.file.is_none() {
            return;
        }
        self.drain_logged();
        if let Some(file) = self.file.take()
            && let Err(e) = file.sync_all()
        {
            metrics::counter!(m::WRITER_FLUSH_ERRORS_TOTAL).increment(1);
            tracing::warn!(path = %self.path.display(), error = %e, "failed to sync log file on close");
        }
    }

    fn flush_if_due(&mut self) {
        if !self.ring.is_empty() || !self.pending.is_empty() {
            self.drain_logged();
        }
    }

    fn current_size(&self) -> u64 {
        self.written
    }

    fn stats(&self) -> BufferStats {
        BufferStats {
            size: (self.ring.len_bytes() + self.pending.len()) as u64,
            capacity: self.ring.capacity() as u64,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RingBufferWriter {
    fn drop(&mut self) {
        self.close();
    }
}
