//! Append-only mutation log.
//!
//! Every change to the store is one framed entry. An entry is written with
//! a single `write_all`, and on open a torn or corrupt tail is cut off, so
//! a mutation is either fully present or absent after a crash.

use crate::error::{Result, TicketError};
use crate::types::{OwnerId, Ticket, TicketId, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes for log entries.
const LOG_MAGIC: &[u8; 4] = b"TKL\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Entry header size: magic + version + flags + seq + timestamp + payload length.
const ENTRY_HEADER_SIZE: usize = 4 + 1 + 1 + 8 + 8 + 4;

/// Trailing checksum size.
const ENTRY_CHECKSUM_SIZE: usize = 4;

/// Upper bound on a single payload.
const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// One atomic change to the store.
///
/// Each variant carries everything needed to replay it, including the
/// quota effect, which is derived from the ticket it touches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// A new ticket. Counts towards `total`, and `with_photo` if it has one.
    Created(Ticket),
    /// Full replacement of an existing ticket's fields.
    Updated(Ticket),
    Trashed { id: TicketId, at: Timestamp },
    Restored { id: TicketId, at: Timestamp },
    /// Physical removal. Decrements the owner's counters.
    Purged { id: TicketId },
    PhotoQuotaSet { owner: OwnerId, quota: u32 },
    /// Lowest id the store may assign next. Written by compaction so that
    /// ids of purged tickets are never reused.
    Watermark { next_id: u64 },
}

/// A mutation as stored in the log.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub mutation: Mutation,
}

enum ReadOutcome {
    Entry(LogEntry, u64),
    Torn(String),
}

/// Append-only mutation log.
pub struct RecordLog {
    /// Path to the log file.
    path: PathBuf,

    /// Log file handle.
    file: RwLock<File>,

    /// Sequence number of the next entry.
    next_seq: RwLock<u64>,

    /// Current file size (for appending).
    file_size: RwLock<u64>,

    /// Number of writes since last sync.
    writes_since_sync: RwLock<u64>,

    /// Sync every N writes.
    sync_interval: u64,
}

impl RecordLog {
    /// Default sync interval.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 100;

    /// Open or create a log and read back its entries.
    ///
    /// - sync_interval = 0 or 1: sync every write (safest, slowest)
    /// - sync_interval = 100: sync every 100 writes
    pub fn open(path: impl AsRef<Path>, sync_interval: u64) -> Result<(Self, Vec<LogEntry>)> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let (entries, valid_len) = Self::recover(&file)?;
        let file_size = file.metadata()?.len();
        if valid_len < file_size {
            warn!(
                path = %path.display(),
                valid_len,
                file_size,
                "truncating torn tail of ticket log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let next_seq = entries.last().map_or(1, |e| e.seq + 1);

        let log = Self {
            path,
            file: RwLock::new(file),
            next_seq: RwLock::new(next_seq),
            file_size: RwLock::new(valid_len),
            writes_since_sync: RwLock::new(0),
            sync_interval: sync_interval.max(1),
        };

        Ok((log, entries))
    }

    /// Append a mutation. Returns the stored entry.
    ///
    /// If the write or its sync fails the file is cut back to where the
    /// entry started, so a failed append never replays.
    pub fn append(&self, mutation: &Mutation) -> Result<LogEntry> {
        self.append_with(mutation, File::sync_all)
    }

    /// Append using `sync` to flush when the sync interval is reached.
    pub(crate) fn append_with<F>(&self, mutation: &Mutation, sync: F) -> Result<LogEntry>
    where
        F: FnOnce(&File) -> io::Result<()>,
    {
        let mut file = self.file.write();

        let seq = *self.next_seq.read();
        let timestamp = Timestamp::now();
        let frame = encode_entry(seq, timestamp, mutation)?;

        let offset = *self.file_size.read();
        let mut writes = self.writes_since_sync.write();
        // Sync periodically based on sync_interval
        let sync_due = *writes + 1 >= self.sync_interval;

        let written = write_at(&mut file, offset, &frame).and_then(|()| {
            if sync_due {
                sync(&*file)
            } else {
                Ok(())
            }
        });
        if let Err(e) = written {
            if let Err(undo) = file.set_len(offset) {
                warn!(offset, error = %undo, "could not roll back failed log append");
            }
            return Err(e.into());
        }

        *self.file_size.write() = offset + frame.len() as u64;
        *self.next_seq.write() = seq + 1;
        *writes = if sync_due { 0 } else { *writes + 1 };

        Ok(LogEntry {
            seq,
            timestamp,
            mutation: mutation.clone(),
        })
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.write();
        file.sync_all()?;
        *self.writes_since_sync.write() = 0;
        Ok(())
    }

    /// Replace the whole log with `mutations`.
    ///
    /// Writes a sibling temp file, syncs it and renames it over the log, so
    /// a crash leaves either the old or the new log in place.
    pub fn rewrite(&self, mutations: &[Mutation]) -> Result<()> {
        let mut file = self.file.write();

        let tmp_path = self.path.with_extension("log.tmp");
        let mut size = 0u64;
        {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            let timestamp = Timestamp::now();
            for (i, mutation) in mutations.iter().enumerate() {
                let frame = encode_entry(i as u64 + 1, timestamp, mutation)?;
                tmp.write_all(&frame)?;
                size += frame.len() as u64;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        *file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        *self.file_size.write() = size;
        *self.next_seq.write() = mutations.len() as u64 + 1;
        *self.writes_since_sync.write() = 0;
        Ok(())
    }

    /// Get current file size.
    pub fn size(&self) -> u64 {
        *self.file_size.read()
    }

    /// Number of entries in the log.
    pub fn entry_count(&self) -> u64 {
        *self.next_seq.read() - 1
    }

    /// Read all intact entries. Returns them with the length of the intact prefix.
    fn recover(file: &File) -> Result<(Vec<LogEntry>, u64)> {
        let mut file = file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut entries = Vec::new();
        let mut offset = 0u64;

        while offset < file_size {
            match read_entry(&mut reader)? {
                ReadOutcome::Entry(entry, len) => {
                    offset += len;
                    entries.push(entry);
                }
                ReadOutcome::Torn(reason) => {
                    warn!(offset, reason = %reason, "stopping log replay at damaged entry");
                    break;
                }
            }
        }

        Ok((entries, offset))
    }
}

fn encode_entry(seq: u64, timestamp: Timestamp, mutation: &Mutation) -> Result<Vec<u8>> {
    let payload = rmp_serde::to_vec_named(mutation)?;
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(TicketError::Serialization(format!(
            "log entry too large: {} bytes",
            payload.len()
        )));
    }

    let mut frame = Vec::with_capacity(ENTRY_HEADER_SIZE + payload.len() + ENTRY_CHECKSUM_SIZE);
    frame.extend_from_slice(LOG_MAGIC);
    frame.push(LOG_VERSION);
    // Flags (reserved)
    frame.push(0u8);
    frame.extend_from_slice(&seq.to_le_bytes());
    frame.extend_from_slice(&timestamp.0.to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    let checksum = crc32fast::hash(&payload);
    frame.extend_from_slice(&checksum.to_le_bytes());
    Ok(frame)
}

/// Read one entry. Damage (short read, bad magic, bad checksum) is reported
/// as `Torn`; an intact entry that cannot be decoded is an error.
fn read_entry(reader: &mut impl Read) -> Result<ReadOutcome> {
    let mut header = [0u8; ENTRY_HEADER_SIZE];
    if let Err(e) = reader.read_exact(&mut header) {
        return torn_or_err(e, "short header");
    }

    if &header[0..4] != LOG_MAGIC {
        return Ok(ReadOutcome::Torn("invalid entry magic".into()));
    }
    if header[4] != LOG_VERSION {
        return Err(TicketError::InvalidFormat(format!(
            "Unsupported log version: {}",
            header[4]
        )));
    }

    let seq = u64::from_le_bytes(le8(&header[6..14]));
    let timestamp = Timestamp(i64::from_le_bytes(le8(&header[14..22])));
    let payload_len = u32::from_le_bytes([header[22], header[23], header[24], header[25]]) as usize;
    if payload_len > MAX_PAYLOAD_SIZE {
        return Ok(ReadOutcome::Torn(format!("payload length {payload_len} out of range")));
    }

    let mut payload = vec![0u8; payload_len];
    if let Err(e) = reader.read_exact(&mut payload) {
        return torn_or_err(e, "short payload");
    }

    let mut checksum_bytes = [0u8; ENTRY_CHECKSUM_SIZE];
    if let Err(e) = reader.read_exact(&mut checksum_bytes) {
        return torn_or_err(e, "short checksum");
    }
    let stored = u32::from_le_bytes(checksum_bytes);
    let computed = crc32fast::hash(&payload);
    if stored != computed {
        return Ok(ReadOutcome::Torn(
            TicketError::ChecksumMismatch {
                expected: stored,
                got: computed,
            }
            .to_string(),
        ));
    }

    let mutation: Mutation = rmp_serde::from_slice(&payload)?;
    let len = (ENTRY_HEADER_SIZE + payload_len + ENTRY_CHECKSUM_SIZE) as u64;

    Ok(ReadOutcome::Entry(
        LogEntry {
            seq,
            timestamp,
            mutation,
        },
        len,
    ))
}

fn write_at(file: &mut File, offset: u64, frame: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(frame)
}

fn torn_or_err(e: io::Error, what: &str) -> Result<ReadOutcome> {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Ok(ReadOutcome::Torn(what.to_string()))
    } else {
        Err(e.into())
    }
}

fn le8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    out
}
