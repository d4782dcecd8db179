use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SyncMode;
use crate::error::{StoreError, StoreResult};
use crate::traits::{Namespace, RawKey};

/// File name of the journal inside the store directory.
pub const JOURNAL_FILE: &str = "phono.journal";

/// Frame header: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// One mutation inside a committed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOp {
    Put {
        ns: Namespace,
        key: RawKey,
        value: Vec<u8>,
    },
    Delete {
        ns: Namespace,
        key: RawKey,
    },
    Clear,
}

/// A committed write transaction; one journal frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub ops: Vec<LogOp>,
}

impl LogRecord {
    pub fn new(ops: Vec<LogOp>) -> Self {
        Self { ops }
    }
}

struct JournalWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// Append-only transaction journal.
///
/// On-disk frame:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: bincode-serialized LogRecord]
/// ```
/// Recovery reads front to back. Frames failing the CRC are skipped; a frame
/// running past the end of the file stops recovery (torn tail write).
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    sync_mode: SyncMode,
}

impl Journal {
    /// Open (or create) the journal at `path`.
    pub fn open(path: &Path, sync_mode: SyncMode) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                offset,
            }),
            sync_mode,
        })
    }

    /// Append one committed transaction. Returns the frame's byte offset.
    pub fn append(&self, record: &LogRecord) -> StoreResult<u64> {
        let frame = encode_frame(record)?;
        let mut w = self.lock()?;
        let at = w.offset;
        if let Err(e) = self.write_frame(&mut w, &frame) {
            warn!(offset = at, error = %e, "journal append failed; truncating partial frame");
            if let Err(undo) = self.truncate_to(&mut w, at) {
                warn!(offset = at, error = %undo, "journal truncation failed");
            }
            return Err(e.into());
        }
        w.offset += frame.len() as u64;
        debug!(offset = at, ops = record.ops.len(), "journal append");
        Ok(at)
    }

    fn write_frame(&self, w: &mut JournalWriter, frame: &[u8]) -> io::Result<()> {
        w.writer.write_all(frame)?;
        w.writer.flush()?;
        if self.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Cut the file back to `offset` and drop anything still buffered.
    fn truncate_to(&self, w: &mut JournalWriter, offset: u64) -> io::Result<()> {
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        file.set_len(offset)?;
        let stale = std::mem::replace(&mut w.writer, BufWriter::new(file));
        // Dropping the old writer would flush its buffer after the cut.
        let (_, _unflushed) = stale.into_parts();
        w.offset = offset;
        Ok(())
    }

    /// Every intact transaction, in commit order.
    pub fn recover(&self) -> StoreResult<Vec<LogRecord>> {
        let mut bytes = Vec::new();
        BufReader::new(File::open(&self.path)?).read_to_end(&mut bytes)?;

        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset + HEADER_SIZE <= bytes.len() {
            let length = u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]) as usize;
            let expected_crc = u32::from_le_bytes([
                bytes[offset + 4],
                bytes[offset + 5],
                bytes[offset + 6],
                bytes[offset + 7],
            ]);
            let start = offset + HEADER_SIZE;
            let end = start + length;
            if length == 0 || end > bytes.len() {
                warn!(offset, length, file_len = bytes.len(), "truncated journal frame; stopping recovery");
                break;
            }

            let payload = &bytes[start..end];
            let actual_crc = crc32fast::hash(payload);
            if actual_crc != expected_crc {
                warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping frame");
            } else {
                match bincode::deserialize::<LogRecord>(payload) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(offset, error = %e, "undecodable journal frame; skipping"),
                }
            }
            offset = end;
        }

        debug!(recovered = records.len(), "journal recovery complete");
        Ok(records)
    }

    /// Atomically replace the journal contents with `records`.
    ///
    /// Writes a sibling file and renames it over the journal.
    pub fn rewrite(&self, records: &[LogRecord]) -> StoreResult<()> {
        let mut w = self.lock()?;
        let tmp = self.path.with_extension("compact");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for record in records {
                out.write_all(&encode_frame(record)?)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.offset = file.metadata()?.len();
        w.writer = BufWriter::new(file);
        info!(path = %self.path.display(), bytes = w.offset, frames = records.len(), "journal compacted");
        Ok(())
    }

    /// Current end-of-journal offset.
    pub fn offset(&self) -> StoreResult<u64> {
        Ok(self.lock()?.offset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, JournalWriter>> {
        self.writer.lock().map_err(|_| StoreError::LockPoisoned("journal"))
    }
}

fn encode_frame(record: &LogRecord) -> StoreResult<Vec<u8>> {
    let payload = bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len()).map_err(|_| {
        StoreError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "journal frame exceeds 4 GiB",
        ))
    })?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};

    fn record(n: u8) -> LogRecord {
        LogRecord::new(vec![
            LogOp::Put {
                ns: Namespace::Main,
                key: vec![n; 10],
                value: vec![n, n],
            },
            LogOp::Delete {
                ns: Namespace::SpeakerAudio,
                key: vec![n; 16],
            },
        ])
    }

    fn open(dir: &tempfile::TempDir) -> Journal {
        Journal::open(&dir.path().join(JOURNAL_FILE), SyncMode::OsDefault).unwrap()
    }

    #[test]
    fn append_and_recover() {
        let dir = tempfile::tempdir().unwrap();
        let j = open(&dir);
        assert_eq!(j.append(&record(1)).unwrap(), 0);
        assert!(j.append(&record(2)).unwrap() > 0);
        assert_eq!(j.recover().unwrap(), vec![record(1), record(2)]);
    }

    #[test]
    fn reopen_continues_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let end = {
            let j = open(&dir);
            j.append(&record(1)).unwrap();
            j.offset().unwrap()
        };
        let j = open(&dir);
        assert_eq!(j.offset().unwrap(), end);
        j.append(&record(2)).unwrap();
        assert_eq!(j.recover().unwrap().len(), 2);
    }

    #[test]
    fn crc_mismatch_skips_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        {
            let j = open(&dir);
            j.append(&record(1)).unwrap();
            j.append(&record(2)).unwrap();
        }
        {
            let mut f = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            f.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            let mut b = [0u8; 1];
            f.read_exact(&mut b).unwrap();
            b[0] ^= 0xff;
            f.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            f.write_all(&b).unwrap();
        }
        assert_eq!(open(&dir).recover().unwrap(), vec![record(2)]);
    }

    #[test]
    fn truncated_tail_stops_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        let len = {
            let j = open(&dir);
            j.append(&record(1)).unwrap();
            j.append(&record(2)).unwrap();
            j.offset().unwrap()
        };
        OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 3).unwrap();
        assert_eq!(open(&dir).recover().unwrap(), vec![record(1)]);
    }

    #[test]
    fn partial_frame_is_cut_before_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let j = open(&dir);
        j.append(&record(1)).unwrap();
        let end = j.offset().unwrap();
        {
            let mut w = j.lock().unwrap();
            let frame = encode_frame(&record(2)).unwrap();
            w.writer.write_all(&frame[..HEADER_SIZE + 3]).unwrap();
            w.writer.flush().unwrap();
            w.writer.write_all(&frame[HEADER_SIZE + 3..]).unwrap();
            j.truncate_to(&mut w, end).unwrap();
        }
        assert_eq!(fs::metadata(j.path()).unwrap().len(), end);
        assert_eq!(j.append(&record(3)).unwrap(), end);
        assert_eq!(j.recover().unwrap(), vec![record(1), record(3)]);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let j = open(&dir);
        for n in 0..5 {
            j.append(&record(n)).unwrap();
        }
        j.rewrite(&[record(9)]).unwrap();
        assert_eq!(j.recover().unwrap(), vec![record(9)]);

        j.append(&record(10)).unwrap();
        assert_eq!(j.recover().unwrap(), vec![record(9), record(10)]);
    }

    #[test]
    fn every_write_sync_mode() {
        let dir = tempfile::tempdir().unwrap();
        let j = Journal::open(&dir.path().join(JOURNAL_FILE), SyncMode::EveryWrite).unwrap();
        j.append(&LogRecord::new(vec![LogOp::Clear])).unwrap();
        assert_eq!(j.recover().unwrap(), vec![LogRecord::new(vec![LogOp::Clear])]);
    }
}
