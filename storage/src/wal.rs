use archivist_core::error::{CoreError, ErrorCode};
use crc32fast::Hasher;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};

#[derive(Error, Debug)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("data integrity error (CRC mismatch)")]
    CrcMismatch,
}

impl CoreError for WalError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::Internal
    }
}

pub struct Wal {
    file: BufWriter<File>,
    current_lsn: AtomicU64,
}

impl Wal {
    /// Opens a WAL file, creating it if it doesn't exist. Does not replay —
    /// callers drive recovery through [`Wal::replay`] so the repository
    /// controls how entries are materialized.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;

        Ok(Self {
            file: BufWriter::new(file),
            current_lsn: AtomicU64::new(0),
        })
    }

    /// Appends an entry to the WAL. Returns the assigned LSN.
    /// Format: [LSN: 8 bytes][CRC: 4 bytes][Len: 4 bytes][Payload: Len bytes]
    pub async fn append(&mut self, payload: &[u8]) -> Result<u64, WalError> {
        let lsn = self.current_lsn.fetch_add(1, Ordering::SeqCst) + 1;
        let len = payload.len() as u32;

        let mut hasher = Hasher::new();
        hasher.update(payload);
        let crc = hasher.finalize();

        self.file.write_u64(lsn).await?;
        self.file.write_u32(crc).await?;
        self.file.write_u32(len).await?;
        self.file.write_all(payload).await?;

        // Not flushed by default; callers call flush() to fsync for durability
        // (busy-timeout/durability policy lives in the repository layer).
        Ok(lsn)
    }

    /// Flushes the internal buffer to disk, fsyncing for durability.
    pub async fn flush(&mut self) -> Result<(), WalError> {
        self.file.flush().await?;
        self.file.get_ref().sync_all().await?;
        Ok(())
    }

    pub fn current_lsn(&self) -> u64 {
        self.current_lsn.load(Ordering::SeqCst)
    }

    /// Replays the WAL from the beginning, invoking `callback` per entry.
    /// A partial trailing write (crash mid-append) is truncated rather than
    /// treated as corruption.
    pub async fn replay<F>(&mut self, mut callback: F) -> Result<u64, WalError>
    where
        F: FnMut(u64, Vec<u8>) -> Result<(), WalError>,
    {
        self.file.flush().await?;
        let file = self.file.get_mut();
        file.seek(std::io::SeekFrom::Start(0)).await?;

        let mut last_lsn = 0;
        let mut valid_end_pos = 0;

        loop {
            let lsn = match file.read_u64().await {
                Ok(v) => v,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            };

            let crc = file.read_u32().await?;
            let len = file.read_u32().await? as usize;

            let mut payload = vec![0u8; len];
            match file.read_exact(&mut payload).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(WalError::Io(e)),
            }

            let mut hasher = Hasher::new();
            hasher.update(&payload);
            if hasher.finalize() != crc {
                return Err(WalError::CrcMismatch);
            }

            callback(lsn, payload)?;
            last_lsn = lsn;
            valid_end_pos = file.stream_position().await?;
        }

        if valid_end_pos < file.metadata().await?.len() {
            file.set_len(valid_end_pos).await?;
        }

        file.seek(std::io::SeekFrom::End(0)).await?;
        self.current_lsn.store(last_lsn, Ordering::SeqCst);

        Ok(last_lsn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_wal_append_and_recover() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let mut wal = Wal::open(&path).await.expect("failed to open wal");

        let entry1 = b"Hello WAL";
        let lsn1 = wal.append(entry1).await.expect("append failed");

        let entry2 = b"Second Entry";
        let lsn2 = wal.append(entry2).await.expect("append failed");

        assert!(lsn1 > 0);
        assert!(lsn2 > lsn1);

        wal.flush().await.expect("flush failed");

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        assert_eq!(
            metadata.len(),
            (16 * 2) + entry1.len() as u64 + entry2.len() as u64
        );
    }

    #[tokio::test]
    async fn test_wal_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replay.wal");

        {
            let mut wal = Wal::open(&path).await.unwrap();
            wal.append(b"Entry 1").await.unwrap();
            wal.append(b"Entry 2").await.unwrap();
            wal.flush().await.unwrap();
        }

        {
            let mut wal = Wal::open(&path).await.unwrap();
            let mut recovered = Vec::new();

            let last_lsn = wal
                .replay(|lsn, payload| {
                    recovered.push((lsn, payload));
                    Ok(())
                })
                .await
                .unwrap();

            assert_eq!(last_lsn, 2);
            assert_eq!(recovered.len(), 2);
            assert_eq!(recovered[0].1, b"Entry 1");
            assert_eq!(recovered[1].1, b"Entry 2");
            assert_eq!(wal.current_lsn(), 2);
        }
    }

    #[tokio::test]
    async fn test_wal_truncates_partial_trailing_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.wal");

        {
            let mut wal = Wal::open(&path).await.unwrap();
            wal.append(b"Complete").await.unwrap();
            wal.flush().await.unwrap();
        }

        // Simulate a torn write: append a truncated header with no payload.
        {
            use tokio::io::AsyncWriteExt;
            let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
            file.write_u64(99).await.unwrap();
            file.write_u32(0).await.unwrap();
            // length field omitted entirely -> partial header
            file.flush().await.unwrap();
        }

        let mut wal = Wal::open(&path).await.unwrap();
        let mut recovered = Vec::new();
        wal.replay(|lsn, payload| {
            recovered.push((lsn, payload));
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].1, b"Complete");
    }
}
