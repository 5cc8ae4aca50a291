//! Memory-mapped, multi-process key-value log.
//!
//! Every handle keeps an in-memory index of the live entries and replays new
//! records from the mapped file before each operation, so writes made by other
//! processes become visible without reopening. Writers hold the exclusive file
//! lock while they refresh, append and (occasionally) compact; readers hold it
//! shared. Compaction writes the live entries to a fresh file with a bumped
//! generation and renames it into place; handles that see a new generation
//! rebuild their index from scratch.

mod format;


use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use memmap2::Mmap;

pub use format::{LogHeader, LogOp, HEADER_SIZE, LOG_VERSION};

use self::format::{encode_record, replay, RECORD_HEADER_SIZE};
use super::contract::{Backend, Storage};
use super::error::{StorageError, StorageResult};
use super::lock::{LockMode, StorageLock, StorageLockGuard};
use super::paths::StoragePaths;

const LOG_EXTENSION: &str = "kvlog";
const LOCK_EXTENSION: &str = "lock";
const COMPACT_SUFFIX: &str = "compact";
const DEFAULT_STORE_ID: &str = "default";

/// Default size after which the log is considered for compaction.
pub const DEFAULT_COMPACTION_THRESHOLD: u64 = 256 * 1024;

/// Whether other processes may open the same log concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Only this process touches the log; no file lock is taken.
    SingleProcess,
    /// Every operation takes the cross-process file lock.
    MultiProcess,
}

/// Options for opening a [`MappedStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedOptions {
    /// Locking discipline.
    pub mode: AccessMode,
    /// Log size in bytes after which compaction is attempted.
    pub compaction_threshold: u64,
}

impl Default for MappedOptions {
    fn default() -> Self {
        Self {
            mode: AccessMode::MultiProcess,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
        }
    }
}

#[derive(Default)]
struct LogState {
    entries: HashMap<String, Vec<u8>>,
    generation: u64,
    applied_len: usize,
}

impl LogState {
    fn apply(&mut self, op: &LogOp<'_>) {
        match op {
            LogOp::Put { key, value } => {
                self.entries.insert((*key).to_string(), value.to_vec());
            }
            LogOp::Delete { key } => {
                self.entries.remove(*key);
            }
        }
    }

    fn live_len(&self) -> usize {
        self.entries.iter().fold(HEADER_SIZE, |acc, (key, value)| {
            acc + RECORD_HEADER_SIZE + key.len() + value.len()
        })
    }
}

/// Mapped log backend.
pub struct MappedStore {
    id: String,
    dir: PathBuf,
    log_path: PathBuf,
    lock: Option<StorageLock>,
    options: MappedOptions,
    state: Mutex<LogState>,
}

impl MappedStore {
    /// Opens (creating if needed) the log `id` inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or files cannot be created, the lock
    /// cannot be taken, or the existing log header is corrupt.
    pub fn open(dir: &Path, id: &str, options: MappedOptions) -> StorageResult<Self> {
        if id.is_empty() || id.contains(['/', '\\']) {
            return Err(StorageError::InvalidConfig(format!(
                "invalid mapped store id '{id}'"
            )));
        }
        fs::create_dir_all(dir)
            .map_err(|err| StorageError::io(format!("creating {}", dir.display()), &err))?;

        let lock = match options.mode {
            AccessMode::MultiProcess => Some(StorageLock::open(
                &dir.join(format!("{id}.{LOCK_EXTENSION}")),
            )?),
            AccessMode::SingleProcess => None,
        };

        let store = Self {
            id: id.to_string(),
            dir: dir.to_path_buf(),
            log_path: dir.join(format!("{id}.{LOG_EXTENSION}")),
            lock,
            options,
            state: Mutex::new(LogState::default()),
        };

        {
            let mut state = store.lock_state()?;
            let _guard = store.guard(LockMode::Exclusive)?;
            store.create_if_empty()?;
            store.refresh(&mut state)?;
            log::debug!(
                "opened mapped store '{}' with {} entries",
                store.id,
                state.entries.len()
            );
        }

        Ok(store)
    }

    /// Returns the process-wide default store under `local_root`.
    ///
    /// The instance is shared by every caller in this process that asks for
    /// the same root; it is the last resort when a scoped store cannot be
    /// opened. `options` apply when the instance is first opened; later
    /// callers get the existing instance as is.
    ///
    /// # Errors
    ///
    /// Returns an error if the default log cannot be opened either.
    pub fn default_instance(
        local_root: &Path,
        options: MappedOptions,
    ) -> StorageResult<Arc<Self>> {
        static INSTANCES: OnceLock<Mutex<HashMap<PathBuf, Arc<MappedStore>>>> =
            OnceLock::new();

        let dir = StoragePaths::new(local_root).default_kvlog_dir();
        let mut instances = INSTANCES
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .map_err(|_| StorageError::Lock("default store registry poisoned".to_string()))?;

        if let Some(store) = instances.get(&dir) {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(Self::open(&dir, DEFAULT_STORE_ID, options)?);
        instances.insert(dir, Arc::clone(&store));
        Ok(store)
    }

    /// Whether a log for `id` has ever been created in `dir`.
    #[must_use]
    pub fn exists(dir: &Path, id: &str) -> bool {
        dir.join(format!("{id}.{LOG_EXTENSION}")).is_file()
    }

    /// Store identifier (file stem of the log).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of the log file.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Options this store was opened with.
    #[must_use]
    pub const fn options(&self) -> MappedOptions {
        self.options
    }

    /// Returns the live keys, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be refreshed.
    pub fn keys(&self) -> StorageResult<Vec<String>> {
        let mut state = self.lock_state()?;
        let _guard = self.guard(LockMode::Shared)?;
        self.refresh(&mut state)?;
        let mut keys: Vec<String> = state.entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    /// Current compaction generation of the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be refreshed.
    pub fn generation(&self) -> StorageResult<u64> {
        let mut state = self.lock_state()?;
        let _guard = self.guard(LockMode::Shared)?;
        self.refresh(&mut state)?;
        Ok(state.generation)
    }

    fn lock_state(&self) -> StorageResult<MutexGuard<'_, LogState>> {
        self.state
            .lock()
            .map_err(|_| StorageError::Lock("mapped store mutex poisoned".to_string()))
    }

    fn guard(&self, mode: LockMode) -> StorageResult<Option<StorageLockGuard>> {
        self.lock.as_ref().map(|lock| lock.lock(mode)).transpose()
    }

    fn create_if_empty(&self) -> StorageResult<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.log_path)
            .map_err(|err| self.io_err("opening", &err))?;
        let len = file
            .metadata()
            .map_err(|err| self.io_err("inspecting", &err))?
            .len();
        if len == 0 {
            file.write_all(&LogHeader { generation: 1 }.encode())
                .map_err(|err| self.io_err("writing header of", &err))?;
            file.sync_all()
                .map_err(|err| self.io_err("syncing", &err))?;
        }
        Ok(())
    }

    /// Brings `state` up to date with the file and returns the file length.
    ///
    /// Must be called with the file lock held.
    fn refresh(&self, state: &mut LogState) -> StorageResult<usize> {
        let file = File::open(&self.log_path).map_err(|err| self.io_err("opening", &err))?;
        let len = file
            .metadata()
            .map_err(|err| self.io_err("inspecting", &err))?
            .len();
        if len < HEADER_SIZE as u64 {
            return Err(StorageError::CorruptedHeader(format!(
                "{} is {len} bytes long",
                self.log_path.display()
            )));
        }

        // SAFETY: the file is only appended to, truncated, or replaced by
        // rename while the exclusive lock is held, and the caller holds the
        // lock for as long as the map is alive.
        let map = unsafe { Mmap::map(&file) }.map_err(|err| self.io_err("mapping", &err))?;
        let header = LogHeader::decode(&map[..HEADER_SIZE])?;

        if header.generation != state.generation || map.len() < state.applied_len {
            state.entries.clear();
            state.generation = header.generation;
            state.applied_len = HEADER_SIZE;
        }

        let replayed = replay(&map[state.applied_len..]);
        for op in &replayed.ops {
            state.apply(op);
        }
        state.applied_len += replayed.consumed;
        if replayed.torn {
            log::debug!(
                "mapped store '{}' has {} unreadable trailing bytes",
                self.id,
                map.len() - state.applied_len
            );
        }
        Ok(map.len())
    }

    fn append(&self, op: &LogOp<'_>) -> StorageResult<()> {
        let record = encode_record(op)?;
        let mut state = self.lock_state()?;
        let _guard = self.guard(LockMode::Exclusive)?;
        let file_len = self.refresh(&mut state)?;

        if matches!(op, LogOp::Delete { key } if !state.entries.contains_key(*key)) {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.log_path)
            .map_err(|err| self.io_err("opening", &err))?;
        if file_len > state.applied_len {
            log::warn!(
                "truncating torn tail of mapped store '{}' at {}",
                self.id,
                state.applied_len
            );
            file.set_len(state.applied_len as u64)
                .map_err(|err| self.io_err("truncating", &err))?;
        }
        file.seek(SeekFrom::Start(state.applied_len as u64))
            .map_err(|err| self.io_err("seeking", &err))?;
        file.write_all(&record)
            .map_err(|err| self.io_err("appending to", &err))?;

        state.apply(op);
        state.applied_len += record.len();

        if state.applied_len as u64 > self.options.compaction_threshold {
            if let Err(err) = self.compact(&mut state) {
                log::warn!("compaction of mapped store '{}' failed: {err}", self.id);
            }
        }
        Ok(())
    }

    /// Rewrites the live entries into a new file when at least half of the
    /// log is dead. Must be called with the exclusive lock held.
    fn compact(&self, state: &mut LogState) -> StorageResult<()> {
        let live_len = state.live_len();
        if live_len * 2 > state.applied_len {
            return Ok(());
        }

        let generation = state.generation + 1;
        let mut buf = Vec::with_capacity(live_len);
        buf.extend_from_slice(&LogHeader { generation }.encode());
        let mut entries: Vec<_> = state.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in entries {
            buf.extend(encode_record(&LogOp::Put { key, value })?);
        }

        let tmp_path = self
            .dir
            .join(format!("{}.{LOG_EXTENSION}.{COMPACT_SUFFIX}", self.id));
        let mut tmp = File::create(&tmp_path).map_err(|err| self.io_err("creating", &err))?;
        tmp.write_all(&buf)
            .map_err(|err| self.io_err("writing compacted", &err))?;
        tmp.sync_all()
            .map_err(|err| self.io_err("syncing compacted", &err))?;
        drop(tmp);

        fs::rename(&tmp_path, &self.log_path).map_err(|err| {
            let _ = fs::remove_file(&tmp_path);
            self.io_err("replacing", &err)
        })?;
        sync_dir(&self.dir);

        log::debug!(
            "compacted mapped store '{}' from {} to {} bytes",
            self.id,
            state.applied_len,
            buf.len()
        );
        state.generation = generation;
        state.applied_len = buf.len();
        Ok(())
    }

    fn io_err(&self, action: &str, err: &std::io::Error) -> StorageError {
        StorageError::io(format!("{action} {}", self.log_path.display()), err)
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(err) = File::open(dir).and_then(|handle| handle.sync_all()) {
        log::debug!("directory sync of {} failed: {err}", dir.display());
    }
}

#[cfg(not(unix))]
const fn sync_dir(_dir: &Path) {}

impl Storage for MappedStore {
    fn backend(&self) -> Backend {
        Backend::Mapped
    }

    fn location(&self) -> String {
        format!("mapped:{}", self.log_path.display())
    }

    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let mut state = self.lock_state()?;
        let _guard = self.guard(LockMode::Shared)?;
        self.refresh(&mut state)?;
        Ok(state.entries.get(key).cloned())
    }

    fn store(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        self.append(&LogOp::Put { key, value: bytes })
    }

    fn erase(&self, key: &str) -> StorageResult<()> {
        self.append(&LogOp::Delete { key })
    }

    fn flush(&self) -> StorageResult<()> {
        let mut state = self.lock_state()?;
        let _guard = self.guard(LockMode::Shared)?;
        OpenOptions::new()
            .write(true)
            .open(&self.log_path)
            .and_then(|file| file.sync_all())
            .map_err(|err| self.io_err("syncing", &err))?;
        self.refresh(&mut state)?;
        Ok(())
    }
}

impl fmt::Debug for MappedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedStore")
            .field("id", &self.id)
            .field("log_path", &self.log_path)
            .field("mode", &self.options.mode)
            .finish_non_exhaustive()
    }
}
