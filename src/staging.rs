//! Private staging area for a fetched body.
//!
//! The file is created already unlinked from the directory namespace, so the
//! OS reclaims it as soon as the handle is dropped, even if the process dies
//! mid-transfer. Nothing else can open it.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// A seekable, re-readable buffer for one item's body.
#[derive(Debug)]
pub struct StagingFile {
    file: File,
}

impl StagingFile {
    /// Create an anonymous staging file inside `dir`.
    pub async fn create_in(dir: &Path) -> io::Result<Self> {
        let dir: PathBuf = dir.to_path_buf();
        let std_file = tokio::task::spawn_blocking(move || tempfile::tempfile_in(dir))
            .await
            .map_err(io::Error::other)??;
        Ok(Self {
            file: File::from_std(std_file),
        })
    }

    /// Seek back to the start without discarding content.
    pub async fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }

    /// Discard all content and seek to the start, ready for a fresh body.
    pub async fn reset(&mut self) -> io::Result<()> {
        self.file.set_len(0).await?;
        self.rewind().await
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await
    }

    /// Flush buffered writes to the underlying file.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.file.flush().await
    }

    /// Read up to `buf.len()` bytes at the current position. Returns 0 at end.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf).await
    }

    /// Read everything from the current position to the end.
    pub async fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.file.read_to_end(&mut out).await?;
        Ok(out)
    }

    /// Current length of the staged body in bytes.
    pub async fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_staging_file_is_unlinked() {
        let tmp = TempDir::new().unwrap();
        let mut staging = StagingFile::create_in(tmp.path()).await.unwrap();
        staging.write_chunk(b"hello").await.unwrap();
        staging.flush().await.unwrap();

        // Nothing visible in the directory
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
        assert_eq!(staging.len().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_rewind_and_reread() {
        let tmp = TempDir::new().unwrap();
        let mut staging = StagingFile::create_in(tmp.path()).await.unwrap();
        staging.write_chunk(b"hello world").await.unwrap();
        staging.flush().await.unwrap();

        staging.rewind().await.unwrap();
        assert_eq!(staging.read_to_end().await.unwrap(), b"hello world");

        staging.rewind().await.unwrap();
        assert_eq!(staging.read_to_end().await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_reset_discards_previous_attempt() {
        let tmp = TempDir::new().unwrap();
        let mut staging = StagingFile::create_in(tmp.path()).await.unwrap();
        staging.write_chunk(b"a partial body that is long").await.unwrap();

        staging.reset().await.unwrap();
        staging.write_chunk(b"short").await.unwrap();
        staging.flush().await.unwrap();

        assert_eq!(staging.len().await.unwrap(), 5);
        staging.rewind().await.unwrap();
        assert_eq!(staging.read_to_end().await.unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_missing_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(StagingFile::create_in(&missing).await.is_err());
    }
}
