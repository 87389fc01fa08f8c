// append-only blob log
use std::{
    collections::HashMap,
    fs::{self, File},
    io::{self, BufReader, Read, Seek, SeekFrom::Start, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::engine::{check_value_size, BlobEngine, EntryId, DEFAULT_MAX_VALUE_BYTES};
use crate::error::{StorageError, StorageResult};

pub const SEGMENT_MAX_SIZE: u64 = 1024 * 1024 * 24;

// Entries are appended as bson records to numbered segment files under
// `<root>/db`. Only the highest-numbered segment is written to; the id index
// is rebuilt by scanning every segment on open.
#[derive(Clone)]
pub struct LogStore {
    path: PathBuf,
    max_value_bytes: usize,
    segment_max_bytes: u64,

    readers: Arc<RwLock<HashMap<u32, Mutex<SegmentReader>>>>,
    writer: Arc<Mutex<ActiveSegment>>,
    index: Arc<RwLock<HashMap<EntryId, RecordPosition>>>,
}

impl LogStore {
    pub fn open(root_path: &Path) -> StorageResult<Self> {
        Self::with_limits(root_path, DEFAULT_MAX_VALUE_BYTES, SEGMENT_MAX_SIZE)
    }

    pub fn with_limits(
        root_path: &Path,
        max_value_bytes: usize,
        segment_max_bytes: u64,
    ) -> StorageResult<Self> {
        let path = root_path.join("db");
        fs::create_dir_all(&path)?;

        let mut segment_ids = list_segments(&path)?;
        if segment_ids.is_empty() {
            segment_ids.push(0);
        }
        let active_id = segment_ids[segment_ids.len() - 1];

        let mut readers = HashMap::new();
        let mut index = HashMap::new();
        let mut max_id: EntryId = 0;
        let mut active_len = 0;

        for &segment_id in &segment_ids {
            let file_path = segment_path(segment_id, &path);
            if !file_path.exists() {
                File::create(&file_path)?;
            }

            let mut reader = new_segment_reader(segment_id, &path)?;
            let valid_len = reader.scan(segment_id, &mut index, &mut max_id)?;
            let file_len = fs::metadata(&file_path)?.len();

            if valid_len < file_len {
                if segment_id == active_id {
                    log::warn!(
                        "truncating torn tail of segment {} from {} to {} bytes",
                        segment_id,
                        file_len,
                        valid_len
                    );
                    File::options()
                        .write(true)
                        .open(&file_path)?
                        .set_len(valid_len)?;
                } else {
                    log::warn!(
                        "segment {} has {} unreadable trailing bytes",
                        segment_id,
                        file_len - valid_len
                    );
                }
            }
            if segment_id == active_id {
                active_len = valid_len;
            }

            readers.insert(segment_id, Mutex::new(reader));
        }

        log::info!(
            "opened log store at {} with {} entries in {} segment(s)",
            path.display(),
            index.len(),
            segment_ids.len()
        );

        let writer = ActiveSegment {
            segment_id: active_id,
            file: new_segment_writer(active_id, &path)?,
            pos: active_len,
            next_id: max_id + 1,
            broken: false,
            #[cfg(test)]
            faults: WriteFaults::default(),
        };

        Ok(LogStore {
            path,
            max_value_bytes,
            segment_max_bytes,
            readers: Arc::new(RwLock::new(readers)),
            writer: Arc::new(Mutex::new(writer)),
            index: Arc::new(RwLock::new(index)),
        })
    }

    #[cfg(test)]
    pub(crate) fn inject_faults(&self, faults: WriteFaults) {
        if let Ok(mut active) = self.writer.lock() {
            active.faults = faults;
        }
    }

    // Called with the writer lock held, so no record can land in the old
    // segment after the switch.
    fn roll_segment(&self, active: &mut ActiveSegment) -> StorageResult<()> {
        let segment_id = active.segment_id + 1;
        let file = new_segment_writer(segment_id, &self.path)?;
        let reader = new_segment_reader(segment_id, &self.path)?;

        self.readers
            .write()
            .map_err(|_| unavailable("segment readers"))?
            .insert(segment_id, Mutex::new(reader));

        active.segment_id = segment_id;
        active.file = file;
        active.pos = 0;

        log::info!("rolled log over to segment {}", segment_id);
        Ok(())
    }
}

impl BlobEngine for LogStore {
    fn put(&self, value: String) -> StorageResult<EntryId> {
        check_value_size(&value, self.max_value_bytes)?;

        let mut active = self.writer.lock().map_err(|_| unavailable("log writer"))?;
        if active.broken {
            return Err(StorageError::Unavailable(
                "log writer is unusable after a failed rollback".to_string(),
            ));
        }
        if active.pos > self.segment_max_bytes {
            self.roll_segment(&mut active)?;
        }

        let id = active.next_id;
        let bytes = Record { id, value }.to_bytes()?;
        let offset = active.pos;

        if let Err(e) = active.append(&bytes) {
            if !active.rollback(offset) {
                // later records must not land behind the partial one
                if let Err(roll_err) = self.roll_segment(&mut active) {
                    log::error!("retire damaged segment failed, reason: {}", roll_err);
                    active.broken = true;
                }
            }
            return Err(e);
        }
        active.next_id += 1;

        self.index.write().map_err(|_| unavailable("index"))?.insert(
            id,
            RecordPosition {
                segment_id: active.segment_id,
                offset,
                len: bytes.len() as u64,
            },
        );

        Ok(id)
    }

    fn get(&self, id: EntryId) -> StorageResult<Option<String>> {
        let pos = match self
            .index
            .read()
            .map_err(|_| unavailable("index"))?
            .get(&id)
        {
            Some(pos) => *pos,
            None => return Ok(None),
        };

        let readers = self
            .readers
            .read()
            .map_err(|_| unavailable("segment readers"))?;
        let reader = readers.get(&pos.segment_id).ok_or_else(|| {
            StorageError::Corrupted(format!("segment {} is missing", pos.segment_id))
        })?;

        let mut data = vec![0; pos.len as usize];
        reader
            .lock()
            .map_err(|_| unavailable("segment reader"))?
            .read_exact(pos.offset, &mut data)?;

        let record = Record::from_bytes(&data)?;
        if record.id != id {
            return Err(StorageError::Corrupted(format!(
                "index points entry {} at record {}",
                id, record.id
            )));
        }

        Ok(Some(record.value))
    }
}

fn unavailable(what: &str) -> StorageError {
    StorageError::Unavailable(format!("{} lock poisoned", what))
}

fn list_segments(path: &Path) -> StorageResult<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(path)? {
        let file_path = entry?.path();
        if file_path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        if let Some(id) = file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok())
        {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

fn new_segment_writer(segment_id: u32, path: &Path) -> StorageResult<File> {
    Ok(File::options()
        .create(true)
        .append(true)
        .open(segment_path(segment_id, path))?)
}

fn new_segment_reader(segment_id: u32, path: &Path) -> StorageResult<SegmentReader> {
    Ok(SegmentReader {
        inner: BufReader::new(File::open(segment_path(segment_id, path))?),
    })
}

fn segment_path(segment_id: u32, path: &Path) -> PathBuf {
    path.join(format!("{}.log", segment_id))
}

#[derive(Serialize, Deserialize, Debug)]
struct Record {
    id: EntryId,
    value: String,
}

impl Record {
    fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        Ok(bson::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        Ok(bson::from_slice(bytes)?)
    }
}

#[derive(Clone, Copy, Debug)]
struct RecordPosition {
    segment_id: u32,
    offset: u64,
    len: u64,
}

struct SegmentReader {
    inner: BufReader<File>,
}

impl SegmentReader {
    // Returns the length of the readable prefix of the segment.
    fn scan(
        &mut self,
        segment_id: u32,
        index: &mut HashMap<EntryId, RecordPosition>,
        max_id: &mut EntryId,
    ) -> StorageResult<u64> {
        let mut valid_len = 0;
        while let Ok(record) = bson::from_reader::<_, Record>(&mut self.inner) {
            let end = self.inner.stream_position()?;
            index.insert(
                record.id,
                RecordPosition {
                    segment_id,
                    offset: valid_len,
                    len: end - valid_len,
                },
            );
            *max_id = (*max_id).max(record.id);
            valid_len = end;
        }
        Ok(valid_len)
    }

    fn read_exact(&mut self, offset: u64, data: &mut [u8]) -> StorageResult<()> {
        self.inner.seek(Start(offset))?;
        self.inner.read_exact(data)?;
        Ok(())
    }
}

struct ActiveSegment {
    segment_id: u32,
    file: File,
    pos: u64,
    next_id: EntryId,
    broken: bool,

    #[cfg(test)]
    faults: WriteFaults,
}

#[cfg(test)]
#[derive(Default)]
pub(crate) struct WriteFaults {
    // write only this many bytes of the next record, then fail
    pub partial_append: Option<usize>,
    pub fail_rollback: bool,
}

impl ActiveSegment {
    fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        #[cfg(test)]
        {
            if let Some(len) = self.faults.partial_append.take() {
                self.file.write_all(&data[..len.min(data.len())])?;
                return Err(io::Error::new(io::ErrorKind::Other, "injected write failure").into());
            }
        }

        self.file.write_all(data)?;
        self.file.sync_data()?;
        self.pos += data.len() as u64;
        Ok(())
    }

    // Cuts the segment back to `offset`; false if the partial bytes stay.
    fn rollback(&mut self, offset: u64) -> bool {
        let result = self.truncate(offset);
        if let Err(e) = &result {
            log::error!(
                "failed to drop partial record at offset {} of segment {}: {}",
                offset,
                self.segment_id,
                e
            );
        }
        result.is_ok()
    }

    fn truncate(&mut self, offset: u64) -> io::Result<()> {
        #[cfg(test)]
        {
            if self.faults.fail_rollback {
                return Err(io::Error::new(io::ErrorKind::Other, "injected truncate failure"));
            }
        }
        self.file.set_len(offset)
    }
}
