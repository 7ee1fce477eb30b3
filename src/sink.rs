//! Destination file the manager streams decoded media bytes into.
//!
//! Grounded on `rarfile.py::RarFile` (`get_progress`, `is_media`):
//! tracks bytes written against the size declared by the file's
//! `FILE_HEAD` block and exposes completion/progress for the CLI
//! display.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

const MEDIA_EXTENSIONS: &[&str] = &["mkv", "avi", "mpeg", "mpg", "mp4"];

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("could not open output file '{path}'")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write to output file failed")]
    Write(#[from] std::io::Error),
}

pub struct MediaFileSink {
    file: File,
    path: PathBuf,
    declared_size: u64,
    written: u64,
}

impl MediaFileSink {
    pub async fn create(path: impl AsRef<Path>, declared_size: u64) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .await
            .map_err(|source| SinkError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            file,
            path,
            declared_size,
            written: 0,
        })
    }

    pub async fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.file.write_all(bytes).await?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Fraction of the declared file size written so far, mirroring
    /// `RarFile.get_progress`.
    pub fn progress(&self) -> f64 {
        if self.declared_size == 0 {
            return 1.0;
        }
        (self.written as f64 / self.declared_size as f64).min(1.0)
    }

    pub fn is_complete(&self) -> bool {
        self.written >= self.declared_size
    }

    pub async fn flush(&mut self) -> Result<(), SinkError> {
        self.file.flush().await?;
        Ok(())
    }
}

/// Whether `filename`'s extension names a playable media container,
/// mirroring `RarFile.is_media`.
pub fn is_media_extension(filename: &str) -> bool {
    filename
        .rsplit('.')
        .next()
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_common_media_extensions() {
        assert!(is_media_extension("movie.mkv"));
        assert!(is_media_extension("MOVIE.MP4"));
        assert!(!is_media_extension("readme.nfo"));
        assert!(!is_media_extension("archive.part01.rar"));
        assert!(!is_media_extension("movie.mov"));
        assert!(!is_media_extension("movie.wmv"));
    }

    #[tokio::test]
    async fn tracks_progress_as_bytes_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mkv");
        let mut sink = MediaFileSink::create(&path, 10).await.unwrap();

        assert_eq!(sink.progress(), 0.0);
        sink.write_chunk(&[0u8; 5]).await.unwrap();
        assert_eq!(sink.progress(), 0.5);
        assert!(!sink.is_complete());

        sink.write_chunk(&[0u8; 5]).await.unwrap();
        assert!(sink.is_complete());
        assert_eq!(sink.progress(), 1.0);
    }
}
