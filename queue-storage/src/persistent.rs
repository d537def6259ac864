//! Persistent, snappy-compressed, log-structured payload backend.
//!
//! Every `set`/`del` appends a record to a single file; `Get` consults an
//! in-memory offset index rebuilt from the log on open: open-by-path,
//! snappy compression, explicit flush-on-close, without pulling in a full
//! LSM engine.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::RwLock,
};

use queue_core::error::QueueError;
use tracing::{debug, warn};

use crate::{PayloadStore, PayloadStoreKind, Result};

const TAG_SET: u8 = 0;
const TAG_TOMBSTONE: u8 = 1;

/// Compaction runs once the log has grown past this many records...
const COMPACT_MIN_RECORDS: u64 = 64;
/// ...and fewer than this fraction of them are still live.
const COMPACT_LIVE_RATIO: f64 = 0.5;

struct Inner {
    file: File,
    index: HashMap<String, u64>,
    /// Every record ever appended, live or not — the denominator for the
    /// tombstone-ratio compaction trigger.
    total_records: u64,
}

/// On-disk, append-only `PayloadStore` implementation.
pub struct PersistentPayloadStore {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl PersistentPayloadStore {
    /// Open (creating if absent) the log file at `path`, replaying it to
    /// rebuild the key → offset index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;

        let (index, total_records) = replay(&mut file)?;
        debug!(path = %path.display(), entries = index.len(), total_records, "persistent payload store opened");

        Ok(Self {
            path,
            inner: RwLock::new(Inner {
                file,
                index,
                total_records,
            }),
        })
    }

    /// The file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the log to hold only live entries, if the tombstone/overwrite
    /// ratio has crossed the threshold. Called opportunistically after every
    /// mutation. A no-op once the log is small or mostly live.
    fn maybe_compact(&self, inner: &mut Inner) -> Result<()> {
        if inner.total_records < COMPACT_MIN_RECORDS {
            return Ok(());
        }
        let live_ratio = inner.index.len() as f64 / inner.total_records as f64;
        if live_ratio >= COMPACT_LIVE_RATIO {
            return Ok(());
        }

        let tmp_path = self.path.with_extension("compacting");
        let mut tmp_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(io_err)?;

        let mut new_index = HashMap::with_capacity(inner.index.len());
        let mut keys: Vec<&String> = inner.index.keys().collect();
        keys.sort();
        for key in keys {
            let offset = inner.index[key];
            inner.file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
            let mut tag_buf = [0u8; 1];
            inner.file.read_exact(&mut tag_buf).map_err(io_err)?;
            let mut cursor = offset + 1;
            let key_bytes = read_framed(&mut inner.file, &mut cursor).map_err(io_err)?;
            let value_bytes = read_framed(&mut inner.file, &mut cursor).map_err(io_err)?;

            let new_offset = tmp_file.stream_position().map_err(io_err)?;
            tmp_file.write_all(&[TAG_SET]).map_err(io_err)?;
            write_framed(&mut tmp_file, &key_bytes).map_err(io_err)?;
            write_framed(&mut tmp_file, &value_bytes).map_err(io_err)?;
            new_index.insert(key.clone(), new_offset);
        }
        tmp_file.flush().map_err(io_err)?;
        drop(tmp_file);

        std::fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        let new_file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;

        let live = new_index.len() as u64;
        inner.file = new_file;
        inner.total_records = live;
        inner.index = new_index;
        debug!(path = %self.path.display(), live, "compacted persistent payload store");
        Ok(())
    }
}

fn io_err(e: io::Error) -> QueueError {
    QueueError::Storage(e.to_string())
}

/// Replay the log from the start, returning the surviving key → offset map
/// and the total record count. A tombstone for a key removes any earlier
/// offset for it.
fn replay(file: &mut File) -> Result<(HashMap<String, u64>, u64)> {
    file.seek(SeekFrom::Start(0)).map_err(io_err)?;
    let mut index = HashMap::new();
    let mut offset = 0u64;
    let mut total_records = 0u64;

    loop {
        let record_start = offset;
        let mut tag_buf = [0u8; 1];
        match file.read_exact(&mut tag_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(io_err(e)),
        }
        offset += 1;

        let key = match read_framed(file, &mut offset) {
            Ok(bytes) => bytes,
            Err(_) => {
                warn!(offset = record_start, "truncated record at end of log, stopping replay");
                break;
            }
        };
        let key = String::from_utf8_lossy(&key).into_owned();

        match tag_buf[0] {
            TAG_SET => {
                let _value = match read_framed(file, &mut offset) {
                    Ok(bytes) => bytes,
                    Err(_) => {
                        warn!(offset = record_start, "truncated value at end of log, stopping replay");
                        break;
                    }
                };
                index.insert(key, record_start);
                total_records += 1;
            }
            TAG_TOMBSTONE => {
                index.remove(&key);
                total_records += 1;
            }
            other => {
                warn!(tag = other, "unknown record tag, stopping replay");
                break;
            }
        }
    }

    Ok((index, total_records))
}

/// Read a `u32`-length-prefixed byte slice, advancing `offset`.
fn read_framed(file: &mut File, offset: &mut u64) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    file.read_exact(&mut len_buf)?;
    *offset += 4;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    *offset += len as u64;
    Ok(buf)
}

fn write_framed(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(&(bytes.len() as u32).to_le_bytes())?;
    file.write_all(bytes)?;
    Ok(())
}

impl PayloadStore for PersistentPayloadStore {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let compressed = {
            let mut encoder = snap::raw::Encoder::new();
            encoder
                .compress_vec(value.as_bytes())
                .map_err(|e| QueueError::Storage(e.to_string()))?
        };

        let mut inner = self.inner.write().expect("persistent store lock poisoned");
        // The file is opened with append(true) (O_APPEND), so every write
        // lands at EOF regardless of the cursor — but a preceding `get`
        // leaves the cursor parked mid-file. Seek to the true append offset
        // rather than trusting stream_position().
        let offset = inner.file.seek(SeekFrom::End(0)).map_err(io_err)?;

        inner.file.write_all(&[TAG_SET]).map_err(io_err)?;
        write_framed(&mut inner.file, key.as_bytes()).map_err(io_err)?;
        write_framed(&mut inner.file, &compressed).map_err(io_err)?;
        inner.file.flush().map_err(io_err)?;

        inner.index.insert(key.to_string(), offset);
        inner.total_records += 1;
        self.maybe_compact(&mut inner)
    }

    fn get(&self, key: &str) -> Result<String> {
        let mut inner = self.inner.write().expect("persistent store lock poisoned");
        let offset = *inner
            .index
            .get(key)
            .ok_or_else(|| QueueError::NotExisted(key.to_string()))?;

        inner.file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
        let mut tag_buf = [0u8; 1];
        inner.file.read_exact(&mut tag_buf).map_err(io_err)?;
        let mut cursor = offset + 1;
        let _key_bytes = read_framed(&mut inner.file, &mut cursor).map_err(io_err)?;
        let value_bytes = read_framed(&mut inner.file, &mut cursor).map_err(io_err)?;

        let mut decoder = snap::raw::Decoder::new();
        let value = decoder
            .decompress_vec(&value_bytes)
            .map_err(|e| QueueError::Storage(e.to_string()))?;
        String::from_utf8(value).map_err(|e| QueueError::Storage(e.to_string()))
    }

    fn del(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write().expect("persistent store lock poisoned");
        if !inner.index.contains_key(key) {
            return Err(QueueError::NotExisted(key.to_string()));
        }

        inner.file.write_all(&[TAG_TOMBSTONE]).map_err(io_err)?;
        write_framed(&mut inner.file, key.as_bytes()).map_err(io_err)?;
        inner.file.flush().map_err(io_err)?;

        inner.index.remove(key);
        inner.total_records += 1;
        debug!(key, "payload tombstoned");
        self.maybe_compact(&mut inner)
    }

    fn kind(&self) -> PayloadStoreKind {
        PayloadStoreKind::Persistent
    }

    fn close(&self) {
        let inner = self.inner.write().expect("persistent store lock poisoned");
        if let Err(e) = inner.file.sync_all() {
            warn!(error = %e, "failed to flush persistent payload store on close");
        }
    }

    fn persistent_path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }
}
