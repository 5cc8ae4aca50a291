//! Cross-process lock guarding a mapped log.
//!
//! On native targets an advisory lock on a sidecar file (`flock` on Unix,
//! `LockFileEx` on Windows) serializes writers across every process sharing
//! the container, while readers take the lock in shared mode. Each
//! [`StorageLock::open`] creates its own file handle, so two handles in one
//! process contend exactly like two processes would.
//!
//! On WASM targets the lock is a no-op: the runtime is a single worker.

use std::path::Path;

use super::error::{StorageError, StorageResult};

/// How the lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many holders at once; used for reads.
    Shared,
    /// A single holder; used for appends and compaction.
    Exclusive,
}

#[cfg(target_arch = "wasm32")]
mod imp {
    use super::{LockMode, Path, StorageResult};

    /// No-op storage lock for WASM.
    #[derive(Debug, Clone)]
    pub struct StorageLock;

    /// No-op lock guard.
    #[derive(Debug)]
    pub struct StorageLockGuard;

    impl StorageLockGuard {
        /// Always exclusive: there is nobody to share with.
        #[must_use]
        pub const fn mode(&self) -> LockMode {
            LockMode::Exclusive
        }
    }

    impl StorageLock {
        /// Returns the no-op lock.
        ///
        /// # Errors
        ///
        /// Never fails.
        pub fn open(_path: &Path) -> StorageResult<Self> {
            Ok(Self)
        }

        /// Returns a guard immediately.
        ///
        /// # Errors
        ///
        /// Never fails.
        pub fn lock(&self, _mode: LockMode) -> StorageResult<StorageLockGuard> {
            Ok(StorageLockGuard)
        }

        /// Returns a guard immediately.
        ///
        /// # Errors
        ///
        /// Never fails.
        pub fn try_lock(&self, _mode: LockMode) -> StorageResult<Option<StorageLockGuard>> {
            Ok(Some(StorageLockGuard))
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod imp {
    use super::{LockMode, Path, StorageError, StorageResult};
    use std::fs::{self, File, OpenOptions};
    use std::sync::Arc;

    /// A file-backed lock shared by every process using the same log.
    #[derive(Debug, Clone)]
    pub struct StorageLock {
        file: Arc<File>,
    }

    /// Guard that holds the lock for its lifetime.
    #[derive(Debug)]
    pub struct StorageLockGuard {
        file: Arc<File>,
        mode: LockMode,
    }

    impl StorageLockGuard {
        /// Mode this guard was acquired in.
        #[must_use]
        pub const fn mode(&self) -> LockMode {
            self.mode
        }
    }

    impl StorageLock {
        /// Opens or creates the lock file at `path`.
        ///
        /// # Errors
        ///
        /// Returns an error if the file cannot be opened or created.
        pub fn open(path: &Path) -> StorageResult<Self> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|err| map_io_err(&err))?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(|err| map_io_err(&err))?;
            Ok(Self {
                file: Arc::new(file),
            })
        }

        /// Blocks until the lock is held in `mode`.
        ///
        /// # Errors
        ///
        /// Returns an error if the lock cannot be acquired.
        pub fn lock(&self, mode: LockMode) -> StorageResult<StorageLockGuard> {
            lock_file(&self.file, mode).map_err(|err| map_io_err(&err))?;
            Ok(StorageLockGuard {
                file: Arc::clone(&self.file),
                mode,
            })
        }

        /// Attempts to take the lock in `mode` without blocking.
        ///
        /// # Errors
        ///
        /// Returns an error if the attempt fails for any reason other than the
        /// lock being held elsewhere.
        pub fn try_lock(&self, mode: LockMode) -> StorageResult<Option<StorageLockGuard>> {
            if try_lock_file(&self.file, mode).map_err(|err| map_io_err(&err))? {
                Ok(Some(StorageLockGuard {
                    file: Arc::clone(&self.file),
                    mode,
                }))
            } else {
                Ok(None)
            }
        }
    }

    impl Drop for StorageLockGuard {
        fn drop(&mut self) {
            let _ = unlock(&self.file);
        }
    }

    fn map_io_err(err: &std::io::Error) -> StorageError {
        StorageError::Lock(err.to_string())
    }

    // Unix flock

    #[cfg(unix)]
    const fn flock_operation(mode: LockMode) -> c_int {
        match mode {
            LockMode::Shared => LOCK_SH,
            LockMode::Exclusive => LOCK_EX,
        }
    }

    #[cfg(unix)]
    fn lock_file(file: &File, mode: LockMode) -> std::io::Result<()> {
        call_flock(file, flock_operation(mode))
    }

    #[cfg(unix)]
    fn try_lock_file(file: &File, mode: LockMode) -> std::io::Result<bool> {
        match call_flock(file, flock_operation(mode) | LOCK_NB) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(err) => Err(err),
        }
    }

    #[cfg(unix)]
    fn unlock(file: &File) -> std::io::Result<()> {
        call_flock(file, LOCK_UN)
    }

    #[cfg(unix)]
    fn call_flock(file: &File, op: c_int) -> std::io::Result<()> {
        let fd = std::os::unix::io::AsRawFd::as_raw_fd(file);
        // SAFETY: the descriptor is owned by `file`, which outlives the call.
        let result = unsafe { flock(fd, op) };
        if result == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(unix)]
    use std::os::raw::c_int;

    #[cfg(unix)]
    const LOCK_SH: c_int = 1;
    #[cfg(unix)]
    const LOCK_EX: c_int = 2;
    #[cfg(unix)]
    const LOCK_NB: c_int = 4;
    #[cfg(unix)]
    const LOCK_UN: c_int = 8;

    #[cfg(unix)]
    extern "C" {
        fn flock(fd: c_int, operation: c_int) -> c_int;
    }

    // Windows LockFileEx

    #[cfg(windows)]
    const fn lock_flags(mode: LockMode) -> u32 {
        match mode {
            LockMode::Shared => 0,
            LockMode::Exclusive => LOCKFILE_EXCLUSIVE_LOCK,
        }
    }

    #[cfg(windows)]
    fn lock_file(file: &File, mode: LockMode) -> std::io::Result<()> {
        call_lock_file_ex(file, lock_flags(mode))
    }

    #[cfg(windows)]
    fn try_lock_file(file: &File, mode: LockMode) -> std::io::Result<bool> {
        match call_lock_file_ex(file, lock_flags(mode) | LOCKFILE_FAIL_IMMEDIATELY) {
            Ok(()) => Ok(true),
            Err(err) if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION) => Ok(false),
            Err(err) => Err(err),
        }
    }

    #[cfg(windows)]
    fn unlock(file: &File) -> std::io::Result<()> {
        let handle = std::os::windows::io::AsRawHandle::as_raw_handle(file);
        // SAFETY: an all-zero Overlapped is valid and locks from offset 0.
        let mut overlapped: Overlapped = unsafe { std::mem::zeroed() };
        // SAFETY: `handle` is owned by `file` and `overlapped` outlives the call.
        let result = unsafe { UnlockFileEx(handle, 0, 1, 0, &mut overlapped) };
        if result == 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    #[cfg(windows)]
    fn call_lock_file_ex(file: &File, flags: u32) -> std::io::Result<()> {
        let handle = std::os::windows::io::AsRawHandle::as_raw_handle(file);
        // SAFETY: an all-zero Overlapped is valid and locks from offset 0.
        let mut overlapped: Overlapped = unsafe { std::mem::zeroed() };
        // SAFETY: `handle` is owned by `file` and `overlapped` outlives the call.
        let result = unsafe { LockFileEx(handle, flags, 0, 1, 0, &mut overlapped) };
        if result == 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    #[cfg(windows)]
    type Handle = std::os::windows::io::RawHandle;

    #[cfg(windows)]
    #[repr(C)]
    #[allow(dead_code, reason = "filled in by the OS")]
    struct Overlapped {
        internal: usize,
        internal_high: usize,
        offset: u32,
        offset_high: u32,
        h_event: Handle,
    }

    #[cfg(windows)]
    const LOCKFILE_EXCLUSIVE_LOCK: u32 = 0x2;
    #[cfg(windows)]
    const LOCKFILE_FAIL_IMMEDIATELY: u32 = 0x1;
    #[cfg(windows)]
    const ERROR_LOCK_VIOLATION: i32 = 33;

    #[cfg(windows)]
    extern "system" {
        fn LockFileEx(
            h_file: Handle,
            flags: u32,
            reserved: u32,
            bytes_to_lock_low: u32,
            bytes_to_lock_high: u32,
            overlapped: *mut Overlapped,
        ) -> i32;
        fn UnlockFileEx(
            h_file: Handle,
            reserved: u32,
            bytes_to_unlock_low: u32,
            bytes_to_unlock_high: u32,
            overlapped: *mut Overlapped,
        ) -> i32;
    }
}

pub use imp::{StorageLock, StorageLockGuard};
