//! Write-ahead log for crash recovery of the vector store.
//!
//! Every mutation is appended here before it is applied in memory. Each entry
//! is framed as `[u32 length BE][u32 CRC32 BE][bincode payload]` and flushed
//! with `fsync` before `append` returns.

use crate::record::Record;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const FRAME_HEADER_LEN: u64 = 8;

/// A single store mutation, replayed in order on startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    /// Insert a new record.
    Put { record: Record },
    /// Delete a record by id.
    Delete { id: Uuid },
    /// Swap the embedding and metadata of an existing record.
    Replace { record: Record },
}

/// Diagnostic statistics from a WAL replay.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplayStats {
    /// Entries successfully deserialized.
    pub success: usize,
    /// Entries skipped because the payload did not deserialize (CRC was valid).
    pub skipped: usize,
    /// CRC mismatches encountered (replay stopped at the first one).
    pub crc_errors: usize,
    /// Replay ended on a torn frame.
    pub truncated: bool,
    /// Byte offset just past the last intact frame.
    pub valid_bytes: u64,
}

impl ReplayStats {
    /// True when the file has bytes past the last intact frame.
    pub fn has_damaged_tail(&self) -> bool {
        self.crc_errors > 0 || self.truncated
    }
}

struct WalWriter {
    file: File,
    len: u64,
}

/// Append-only log with CRC32 integrity checks. Appends are serialized by an
/// internal mutex.
pub struct WriteAheadLog {
    writer: Mutex<WalWriter>,
    path: PathBuf,
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog").field("path", &self.path).finish()
    }
}

impl WriteAheadLog {
    /// Open or create the log file `file_name` inside `dir`.
    pub fn open(dir: &Path, file_name: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(file_name);
        let mut opts = OpenOptions::new();
        opts.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let file = opts.open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            writer: Mutex::new(WalWriter { file, len }),
            path,
        })
    }

    /// Current size of the log in bytes.
    pub fn len(&self) -> u64 {
        self.writer.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an entry and fsync it.
    ///
    /// On a failed write the file is cut back to its previous length, so a
    /// retried append never lands behind a torn frame.
    pub fn append(&self, entry: &WalEntry) -> io::Result<()> {
        let framed = serialize_and_frame(entry)?;
        let mut w = self.writer.lock();
        let before = w.len;
        match write_frame(&mut w.file, &framed) {
            Ok(()) => {
                w.len = before + framed.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = w.file.set_len(before) {
                    tracing::error!(error = %rollback, "failed to roll back torn WAL frame");
                }
                Err(e)
            }
        }
    }

    /// Read all intact entries in order, verifying CRC32 checksums.
    pub fn replay(&self) -> io::Result<(Vec<WalEntry>, ReplayStats)> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut stats = ReplayStats::default();
        let mut header = [0u8; FRAME_HEADER_LEN as usize];

        loop {
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    // A partial header is a torn frame too
                    stats.truncated = stats.valid_bytes < file_len;
                    break;
                }
                Err(e) => return Err(e),
            }
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let stored_crc = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

            // A garbage length must not drive a huge allocation
            if stats.valid_bytes + FRAME_HEADER_LEN + len as u64 > file_len {
                tracing::warn!(offset = stats.valid_bytes, "WAL truncated mid-entry, stopping replay");
                stats.truncated = true;
                break;
            }
            let mut data = vec![0u8; len];
            match reader.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    tracing::warn!(offset = stats.valid_bytes, "WAL truncated mid-entry, stopping replay");
                    stats.truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            }
            if crc32fast::hash(&data) != stored_crc {
                tracing::warn!(offset = stats.valid_bytes, "WAL entry CRC mismatch, stopping replay");
                stats.crc_errors += 1;
                break;
            }
            stats.valid_bytes += FRAME_HEADER_LEN + len as u64;
            match bincode::deserialize::<WalEntry>(&data) {
                Ok(entry) => {
                    entries.push(entry);
                    stats.success += 1;
                }
                Err(e) => {
                    tracing::warn!("WAL entry deserialization failed, skipping: {}", e);
                    stats.skipped += 1;
                }
            }
        }

        Ok((entries, stats))
    }

    /// Drop everything past `len` bytes. Used to cut a damaged tail after replay.
    pub fn truncate_to(&self, len: u64) -> io::Result<()> {
        let mut w = self.writer.lock();
        if len < w.len {
            w.file.set_len(len)?;
            w.file.sync_all()?;
            w.len = len;
        }
        Ok(())
    }

    /// Empty the log and fsync.
    pub fn truncate(&self) -> io::Result<()> {
        self.truncate_to(0)
    }
}

fn write_frame(file: &mut File, framed: &[u8]) -> io::Result<()> {
    file.write_all(framed)?;
    file.sync_data()
}

/// Serialize an entry into its on-disk frame:
/// `[u32 len BE][u32 crc32 BE][bincode payload]`.
fn serialize_and_frame(entry: &WalEntry) -> io::Result<Vec<u8>> {
    let bytes = bincode::serialize(entry).map_err(|e| io::Error::other(e.to_string()))?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "WAL entry exceeds 4 GiB"))?;
    let crc = crc32fast::hash(&bytes);

    let mut framed = Vec::with_capacity(FRAME_HEADER_LEN as usize + bytes.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&crc.to_be_bytes());
    framed.extend_from_slice(&bytes);
    Ok(framed)
}
