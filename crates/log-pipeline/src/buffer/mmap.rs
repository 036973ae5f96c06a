//! 메모리 맵 writer
//!
//! 파일을 `max_size`로 미리 늘려 두고 `memmap2::MmapMut`로 매핑한 뒤 직접 복사합니다.
//! 물리 위치는 `write_position % max_size`이며 끝을 넘는 쓰기는 둘로 나눠 앞쪽부터
//! 덮어씁니다. 파이프라인은 `has_room`이 거짓이 되면 회전을 요청하므로 정상 경로에서는
//! 감기(wrap)가 일어나지 않습니다.
//!
//! 닫을 때 한 번도 감기지 않았다면 파일을 논리 길이로 잘라 뒤쪽의 0 바이트를 없앱니다.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Utc;
use memmap2::MmapMut;

use logflux_core::metrics as m;

use super::{BufferStats, LogWriter};
use crate::error::LogPipelineError;

/// 고정 크기 메모리 맵 writer
pub struct MmapWriter {
    path: PathBuf,
    file: Option<File>,
    map: Option<MmapMut>,
    max_size: u64,
    write_position: u64,
    wrapped: bool,
}

impl MmapWriter {
    /// 파일을 열어 `max_size`로 늘리고 매핑합니다.
    ///
    /// 기존 내용이 `max_size`보다 짧으면 그 뒤부터 이어서 씁니다. 이미 가득 찬 파일은
    /// 감긴 상태로 열려 `has_room`이 항상 거짓이므로, 호출자가 회전하기 전에는 기존
    /// 내용을 덮어쓰지 않습니다.
    pub fn open(path: &Path, max_size: u64) -> Result<Self, LogPipelineError> {
        if max_size == 0 {
            return Err(LogPipelineError::Writer {
                kind: "mmap".to_owned(),
                reason: "max_size must be greater than 0".to_owned(),
            });
        }
        usize::try_from(max_size).map_err(|_| LogPipelineError::Writer {
            kind: "mmap".to_owned(),
            reason: format!("max_size {max_size} does not fit in the address space"),
        })?;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        let existing = file.metadata()?.len();
        let full = existing >= max_size;
        if full {
            tracing::warn!(
                path = %path.display(),
                existing,
                max_size,
                "mapped file is already full, direct writes wrap over old content"
            );
        } else {
            file.set_len(max_size)?;
        }

        // SAFETY: 매핑된 파일은 이 writer만 열어 두고 수정한다. 다른 프로세스가 같은
        // 디렉토리를 동시에 다루는 구성은 지원하지 않는다.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| LogPipelineError::Writer {
            kind: "mmap".to_owned(),
            reason: format!("failed to map {}: {e}", path.display()),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            map: Some(map),
            max_size,
            write_position: existing,
            wrapped: full,
        })
    }

    /// 첫 감기 전까지 남은 바이트 수
    pub fn remaining(&self) -> u64 {
        if self.wrapped {
            0
        } else {
            self.max_size - self.write_position.min(self.max_size)
        }
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn has_wrapped(&self) -> bool {
        self.wrapped
    }
}

impl LogWriter for MmapWriter {
    fn write(&mut self, data: &[u8]) -> Result<u64, LogPipelineError> {
        let len = data.len() as u64;
        if len > self.max_size {
            return Err(LogPipelineError::CapacityExceeded {
                len,
                capacity: self.max_size,
            });
        }
        let Some(map) = self.map.as_mut() else {
            return Err(LogPipelineError::Writer {
                kind: "mmap".to_owned(),
                reason: format!("{} is closed", self.path.display()),
            });
        };

        // max_size는 open에서 usize 범위로 검증됨
        let physical = (self.write_position % self.max_size) as usize;
        let first = data.len().min(self.max_size as usize - physical);
        map[physical..physical + first].copy_from_slice(&data[..first]);
        if first < data.len() {
            let rest = data.len() - first;
            map[..rest].copy_from_slice(&data[first..]);
        }

        let offset = self.write_position;
        self.write_position += len;
        if self.write_position > self.max_size {
            self.wrapped = true;
        }
        Ok(offset)
    }

    fn flush(&mut self) {
        if let Some(map) = self.map.as_ref()
            && let Err(e) = map.flush()
        {
            metrics::counter!(m::WRITER_FLUSH_ERRORS_TOTAL).increment(1);
            tracing::warn!(path = %self.path.display(), error = %e, "mmap flush failed");
        }
    }

    fn close(&mut self) {
        if self.map.is_none() {
            return;
        }
        self.flush();
        self.map = None;

        let Some(file) = self.file.take() else {
            return;
        };
        if !self.wrapped
            && let Err(e) = file.set_len(self.write_position)
        {
            metrics::counter!(m::WRITER_FLUSH_ERRORS_TOTAL).increment(1);
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to truncate mapped file to logical length"
            );
        }
        if let Err(e) = file.sync_all() {
            metrics::counter!(m::WRITER_FLUSH_ERRORS_TOTAL).increment(1);
            tracing::warn!(path = %self.path.display(), error = %e, "failed to sync mapped file");
        }
    }

    fn flush_if_due(&mut self) {
        self.flush();
    }

    fn current_size(&self) -> u64 {
        self.write_position
    }

    fn stats(&self) -> BufferStats {
        BufferStats {
            size: self.write_position.min(self.max_size),
            capacity: self.max_size,
        }
    }

    fn has_room(&self, len: usize) -> bool {
        len as u64 <= self.remaining()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MmapWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// 공간이 모자라면 새 파일로 넘어가는 메모리 맵 writer
///
/// 파일 이름은 `<prefix>.<yyyyMMdd_HHmmss_ffffff>.log`입니다.
pub struct RollingMmapWriter {
    dir: PathBuf,
    prefix: String,
    max_size: u64,
    current: MmapWriter,
    /// 닫힌 파일까지 포함한 누적 바이트
    total_written: u64,
    files_opened: u64,
}

impl RollingMmapWriter {
    pub fn open(dir: &Path, prefix: &str, max_size: u64) -> Result<Self, LogPipelineError> {
        let path = next_path(dir, prefix);
        let current = MmapWriter::open(&path, max_size)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_owned(),
            max_size,
            current,
            total_written: 0,
            files_opened: 1,
        })
    }

    /// 지금까지 연 파일 수
    pub fn files_opened(&self) -> u64 {
        self.files_opened
    }

    fn roll(&mut self) -> Result<(), LogPipelineError> {
        let path = next_path(&self.dir, &self.prefix);
        let next = MmapWriter::open(&path, self.max_size)?;
        let mut old = std::mem::replace(&mut self.current, next);
        old.close();
        self.files_opened += 1;
        tracing::debug!(
            previous = %old.path().display(),
            next = %path.display(),
            "rolled memory-mapped log file"
        );
        Ok(())
    }
}

impl LogWriter for RollingMmapWriter {
    fn write(&mut self, data: &[u8]) -> Result<u64, LogPipelineError> {
        let len = data.len() as u64;
        if len > self.max_size {
            return Err(LogPipelineError::CapacityExceeded {
                len,
                capacity: self.max_size,
            });
        }
        if !self.current.has_room(data.len()) {
            self.roll()?;
        }
        self.current.write(data)?;
        let offset = self.total_written;
        self.total_written += len;
        Ok(offset)
    }

    fn flush(&mut self) {
        self.current.flush();
    }

    fn close(&mut self) {
        self.current.close();
    }

    fn flush_if_due(&mut self) {
        self.current.flush_if_due();
    }

    fn current_size(&self) -> u64 {
        self.total_written
    }

    fn stats(&self) -> BufferStats {
        self.current.stats()
    }

    fn path(&self) -> &Path {
        self.current.path()
    }
}

fn next_path(dir: &Path, prefix: &str) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string();
    let mut path = dir.join(format!("{prefix}.{stamp}.log"));
    let mut index = 1u32;
    while path.exists() {
        path = dir.join(format!("{prefix}.{stamp}.{index}.log"));
        index += 1;
    }
    path
}
