//! 회전된 파일 gzip 압축
//!
//! `<file>.gz.tmp`에 먼저 쓰고 fsync한 뒤 `<file>.gz`로 rename하므로 중간에 실패해도
//! 불완전한 `.gz`가 남지 않습니다. 실패하면 원본을 그대로 두고 결과값으로 알립니다.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

use logflux_core::metrics as m;

use super::naming::{LOG_EXTENSION, gz_path};

/// 압축 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionOutcome {
    /// 압축 완료, 압축 파일 경로
    Compressed(PathBuf),
    /// 대상이 아님 (비활성, 확장자 불일치, 파일 없음)
    Skipped,
    /// 실패, 원본 유지
    Failed(String),
}

impl CompressionOutcome {
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Compressed(_))
    }
}

/// `path`를 gzip으로 압축하고 원본을 지웁니다. 에러를 반환하지 않습니다.
pub fn compress_file(path: &Path) -> CompressionOutcome {
    if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) || !path.is_file() {
        return CompressionOutcome::Skipped;
    }

    let target = gz_path(path);
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    match gzip_to(path, &tmp).and_then(|()| std::fs::rename(&tmp, &target)) {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "compressed rotated file but could not remove original"
                );
            }
            tracing::debug!(path = %target.display(), "compressed rotated log file");
            CompressionOutcome::Compressed(target)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            metrics::counter!(m::ROTATION_COMPRESSION_FAILURES_TOTAL).increment(1);
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "compression failed, leaving rotated file uncompressed"
            );
            CompressionOutcome::Failed(e.to_string())
        }
    }
}

fn gzip_to(src: &Path, dst: &Path) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(dst)?), Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    let writer = encoder.finish()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}
