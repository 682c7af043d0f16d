//! Byte sources a `LogReader` can follow.

use crate::error::TransportError;
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A growing file, local or remote.
///
/// Implementations only report sizes and fetch byte ranges; offset tracking,
/// rotation detection and line splitting live in the reader.
#[async_trait]
pub trait LogSource: Send {
    /// Human readable location for logs
    fn describe(&self) -> String;

    /// Current size in bytes, or `None` if the file does not exist yet.
    async fn size(&mut self) -> Result<Option<u64>, TransportError>;

    /// Bytes in `[start, end)`.
    async fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>, TransportError>;

    /// Release any held connection
    async fn close(&mut self) {}
}

/// Local file follower used by the `tail` and `custom` modes.
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_err(&self, source: std::io::Error) -> TransportError {
        TransportError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl LogSource for LocalFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn size(&mut self) -> Result<Option<u64>, TransportError> {
        match fs::metadata(&self.path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }

    async fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>, TransportError> {
        let mut file = fs::File::open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| self.io_err(e))?;

        let mut buf = Vec::with_capacity(end.saturating_sub(start) as usize);
        file.take(end.saturating_sub(start))
            .read_to_end(&mut buf)
            .await
            .map_err(|e| self.io_err(e))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_has_no_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = LocalFileSource::new(dir.path().join("console.log"));
        assert_eq!(source.size().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        std::fs::write(&path, b"hello\nworld\n").unwrap();

        let mut source = LocalFileSource::new(&path);
        assert_eq!(source.size().await.unwrap(), Some(12));
        assert_eq!(source.read_range(6, 12).await.unwrap(), b"world\n");
    }
}
