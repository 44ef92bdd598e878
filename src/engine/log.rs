//! Durability log
//!
//! Append-only log that records every mutation before it reaches the table.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2                                │
//! │ ...                                     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! CRC32 covers the data bytes only. Replay stops at the first record whose
//! checksum or framing fails and truncates the partial tail, so a crash mid
//! write costs at most the unsynced suffix.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::SyncStrategy;
use crate::error::{Result, StoreError};

/// Record header size: LSN (8) + CRC (4) + length (4)
pub const HEADER_SIZE: usize = 16;

/// Operations that can be logged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogOp {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

/// A single record in the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// The operation to replay
    pub op: LogOp,

    /// Timestamp (unix millis) when the record was created
    pub timestamp: u64,
}

impl LogRecord {
    pub fn new(op: LogOp) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self { op, timestamp }
    }
}

/// Result of a replay pass over a log file
#[derive(Debug, Default)]
pub struct ReplayStats {
    /// Number of records successfully replayed
    pub records_recovered: u64,

    /// Number of corrupted/partial records dropped at the tail
    pub records_dropped: u64,

    /// Last valid LSN seen
    pub last_lsn: u64,

    /// Whether a partial tail was truncated away
    pub was_truncated: bool,
}

/// Appends records to the log file
pub struct LogWriter {
    path: PathBuf,
    file: BufWriter<File>,
    current_lsn: u64,
    strategy: SyncStrategy,
    unsynced: usize,
}

impl LogWriter {
    /// Open (or create) a log for appending, continuing after `start_lsn`
    pub fn open(path: &Path, strategy: SyncStrategy, start_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
            current_lsn: start_lsn,
            strategy,
            unsynced: 0,
        })
    }

    /// Append one operation; returns the LSN it was assigned
    pub fn append(&mut self, op: LogOp) -> Result<u64> {
        let record = LogRecord::new(op);
        let data = bincode::serialize(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.current_lsn += 1;
        let crc = crc32fast::hash(&data);

        self.file.write_all(&self.current_lsn.to_be_bytes())?;
        self.file.write_all(&crc.to_be_bytes())?;
        self.file.write_all(&(data.len() as u32).to_be_bytes())?;
        self.file.write_all(&data)?;

        self.unsynced += 1;
        match self.strategy {
            SyncStrategy::EveryWrite => self.sync()?,
            SyncStrategy::EveryNRecords { count } => {
                if self.unsynced >= count {
                    self.sync()?;
                }
            }
        }
        Ok(self.current_lsn)
    }

    /// Force buffered records to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop every record (after the table has been made durable elsewhere
    /// or wiped)
    pub fn truncate(&mut self) -> Result<()> {
        self.file.flush()?;
        let file = self.file.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Current LSN
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replay a log file, returning every valid operation in append order.
///
/// Steps:
/// 1. Read records sequentially, verifying CRC and framing
/// 2. Stop at the first invalid record
/// 3. Truncate the partial tail so the next append starts clean
pub fn replay(path: &Path) -> Result<(Vec<LogOp>, ReplayStats)> {
    let mut stats = ReplayStats::default();
    let mut ops = Vec::new();

    if !path.exists() {
        return Ok((ops, stats));
    }

    let mut file = File::open(path)?;
    let mut valid_len: u64 = 0;

    loop {
        let mut header = [0u8; HEADER_SIZE];
        match file.read_exact(&mut header) {
            Ok(()) => {}
            Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let lsn = u64::from_be_bytes([
            header[0], header[1], header[2], header[3], header[4], header[5], header[6], header[7],
        ]);
        let crc = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        let len = u32::from_be_bytes([header[12], header[13], header[14], header[15]]) as usize;

        let mut data = vec![0u8; len];
        match file.read_exact(&mut data) {
            Ok(()) => {}
            Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        if crc32fast::hash(&data) != crc {
            break;
        }

        let record: LogRecord = match bincode::deserialize(&data) {
            Ok(r) => r,
            Err(_) => break,
        };

        ops.push(record.op);
        stats.records_recovered += 1;
        stats.last_lsn = lsn;
        valid_len += (HEADER_SIZE + len) as u64;
    }

    // Truncate a corrupt or partial tail in place. Replay stops at the first
    // bad record, so any leftover bytes are exactly one dropped record — even
    // a tail shorter than one header.
    let actual_len = std::fs::metadata(path)?.len();
    if actual_len > valid_len {
        stats.records_dropped += 1;
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len)?;
        file.sync_data()?;
        stats.was_truncated = true;
    }

    Ok((ops, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        let mut writer = LogWriter::open(&path, SyncStrategy::EveryWrite, 0).unwrap();
        writer
            .append(LogOp::Put {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
            })
            .unwrap();
        writer.append(LogOp::Delete { key: b"k".to_vec() }).unwrap();
        drop(writer);

        let (ops, stats) = replay(&path).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(stats.records_recovered, 2);
        assert_eq!(stats.last_lsn, 2);
        assert!(!stats.was_truncated);
        assert!(matches!(ops[0], LogOp::Put { .. }));
        assert!(matches!(ops[1], LogOp::Delete { .. }));
    }

    #[test]
    fn partial_tail_is_dropped_and_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        let mut writer = LogWriter::open(&path, SyncStrategy::EveryWrite, 0).unwrap();
        writer
            .append(LogOp::Put {
                key: b"keep".to_vec(),
                value: b"1".to_vec(),
            })
            .unwrap();
        writer.sync().unwrap();
        drop(writer);

        // Simulate a crash mid-append: garbage half-record at the tail
        let good_len = std::fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0xDE, 0xAD, 0xBE]).unwrap();
        }

        let (ops, stats) = replay(&path).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(stats.records_dropped, 1);
        assert!(stats.was_truncated);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
    }

    #[test]
    fn corrupt_crc_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        let mut writer = LogWriter::open(&path, SyncStrategy::EveryWrite, 0).unwrap();
        writer
            .append(LogOp::Put {
                key: b"a".to_vec(),
                value: b"b".to_vec(),
            })
            .unwrap();
        drop(writer);

        // Flip one payload byte
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let (ops, stats) = replay(&path).unwrap();
        assert!(ops.is_empty());
        assert_eq!(stats.records_dropped, 1);
    }
}
