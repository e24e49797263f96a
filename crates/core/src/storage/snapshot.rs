//! Point-in-time snapshot of the vector store.
//!
//! Layout: `[bincode payload][magic "TSS1"][u32 CRC32 BE]`. Writes go to a
//! temp file that is fsynced and renamed over the previous snapshot.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

const SNAPSHOT_MAGIC: &[u8; 4] = b"TSS1";

/// Serialized store state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub dimension: usize,
    /// Next commit sequence number to hand out.
    pub next_seq: u64,
    /// Records in commit order.
    pub records: Vec<Record>,
}

impl StoreSnapshot {
    /// Structural checks run after deserialization.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::with_capacity(self.records.len());
        let mut last_seq = None;
        for record in &self.records {
            if record.embedding.len() != self.dimension {
                return Err(format!(
                    "record {} has dimension {}, snapshot dimension is {}",
                    record.id,
                    record.embedding.len(),
                    self.dimension
                ));
            }
            if !seen.insert(record.id) {
                return Err(format!("duplicate record id {}", record.id));
            }
            if record.seq >= self.next_seq {
                return Err(format!(
                    "record {} has seq {} >= next_seq {}",
                    record.id, record.seq, self.next_seq
                ));
            }
            if last_seq.is_some_and(|prev| record.seq <= prev) {
                return Err(format!("records out of commit order at {}", record.id));
            }
            last_seq = Some(record.seq);
        }
        Ok(())
    }

    /// Write atomically to `path`.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let bytes = bincode::serialize(self).map_err(|e| io::Error::other(e.to_string()))?;
        let crc = crc32fast::hash(&bytes);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("snap.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.write_all(SNAPSHOT_MAGIC)?;
            file.write_all(&crc.to_be_bytes())?;
            file.sync_all()?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&tmp_path, path)?;

        tracing::info!(
            records = self.records.len(),
            bytes = bytes.len(),
            crc = %format!("{crc:#010x}"),
            "saved store snapshot"
        );
        Ok(())
    }

    /// Load from `path`. Returns `Ok(None)` if no snapshot exists yet.
    pub fn load(path: &Path) -> io::Result<Option<Self>> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        if raw.len() < 8 || &raw[raw.len() - 8..raw.len() - 4] != SNAPSHOT_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("snapshot {path:?} is missing its checksum footer"),
            ));
        }
        let payload = &raw[..raw.len() - 8];
        let stored_crc = u32::from_be_bytes([
            raw[raw.len() - 4],
            raw[raw.len() - 3],
            raw[raw.len() - 2],
            raw[raw.len() - 1],
        ]);
        let computed_crc = crc32fast::hash(payload);
        if computed_crc != stored_crc {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "snapshot CRC32 mismatch: expected {stored_crc:#010x}, got {computed_crc:#010x} ({path:?})"
                ),
            ));
        }

        let snapshot: StoreSnapshot = bincode::deserialize(payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        snapshot.validate().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("snapshot validation failed: {e}"),
            )
        })?;

        tracing::info!(records = snapshot.records.len(), "loaded store snapshot");
        Ok(Some(snapshot))
    }
}
