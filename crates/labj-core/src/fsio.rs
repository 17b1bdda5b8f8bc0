//! File locking and atomic replacement primitives.
//!
//! Two guarantees underpin the append-only discipline:
//!
//! 1. **Scoped exclusive locks** ([`ScopedLock`]): an advisory `flock` on a
//!    sibling `.lock` file, acquired with a bounded retry loop and released
//!    on every exit path via `Drop`. Multiple processes sharing a project
//!    root coordinate exclusively through these.
//! 2. **Atomic replacement** ([`atomic_replace`]): write to a temp file in
//!    the same directory, flush, fsync, rename over the target, then fsync
//!    the parent directory. A crash at any point leaves either the old
//!    complete file or the new complete file — never a partial write.
//!
//! Appending to an existing daily file is read–modify–[`atomic_replace`]
//! under the lock: a whole-file rewrite rather than a streaming append, so
//! parse state and disk state stay consistent even across concurrent
//! writers.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{JournalError, Result};

/// Default window for acquiring an advisory lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between lock acquisition attempts.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive advisory lock on a sibling `.lock` file.
///
/// The lock file is created next to the target (`{target}.lock`) and is left
/// in place after release; only the `flock` is dropped. Unlock happens on
/// `Drop`, so the lock is released on all exit paths including panics and
/// early `?` returns.
#[derive(Debug)]
pub struct ScopedLock {
    file: File,
    path: PathBuf,
}

impl ScopedLock {
    /// Acquires an exclusive lock for `target` with the default 10 s timeout.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::LockTimeout`] if the lock is held elsewhere
    /// for the whole window, or [`JournalError::Io`] if the lock file cannot
    /// be created.
    pub fn acquire(target: &Path) -> Result<Self> {
        Self::acquire_timeout(target, DEFAULT_LOCK_TIMEOUT)
    }

    /// Acquires an exclusive lock for `target`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::LockTimeout`] on expiry, [`JournalError::Io`]
    /// on filesystem failure.
    pub fn acquire_timeout(target: &Path, timeout: Duration) -> Result<Self> {
        let lock_path = lock_path_for(target);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| JournalError::io("create lock file directory", e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| JournalError::io("open lock file", e))?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: lock_path,
                    });
                }
                Err(err) if is_contended(&err) => {
                    if started.elapsed() >= timeout {
                        return Err(JournalError::LockTimeout {
                            path: lock_path,
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(err) => return Err(JournalError::io("acquire advisory lock", err)),
            }
        }
    }

    /// Path of the lock file itself.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedLock {
    fn drop(&mut self) {
        // Best-effort: the OS releases the flock when the fd closes anyway.
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Lock file path for a target: `{target}.lock`.
#[must_use]
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map_or_else(|| "file".into(), std::ffi::OsStr::to_os_string);
    name.push(".lock");
    target.with_file_name(name)
}

/// Writes `data` to `path` atomically via the temp-file + fsync + rename
/// protocol.
///
/// # Errors
///
/// Returns [`JournalError::Io`] if any filesystem step fails. On failure the
/// target is untouched.
pub fn atomic_replace(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        JournalError::io(
            "resolve parent directory",
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"),
        )
    })?;
    fs::create_dir_all(parent).map_err(|e| JournalError::io("create parent directory", e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| JournalError::io("create temp file", e))?;
    tmp.write_all(data)
        .map_err(|e| JournalError::io("write temp file", e))?;
    tmp.flush()
        .map_err(|e| JournalError::io("flush temp file", e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| JournalError::io("fsync temp file", e))?;
    tmp.persist(path)
        .map_err(|e| JournalError::io("rename temp file over target", e.error))?;

    // fsync the directory so the rename itself is durable.
    fsync_dir(parent)
}

/// Reads a file that might not exist, returning `None` when absent.
///
/// # Errors
///
/// Returns [`JournalError::Io`] on any failure other than `NotFound`.
pub fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(JournalError::io(
            format!("read {}", path.display()),
            e,
        )),
    }
}

fn fsync_dir(dir: &Path) -> Result<()> {
    let handle = File::open(dir).map_err(|e| JournalError::io("open directory for fsync", e))?;
    handle
        .sync_all()
        .map_err(|e| JournalError::io("fsync directory", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_replace_creates_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2026-01-17.md");

        atomic_replace(&path, b"first").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");

        atomic_replace(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn test_atomic_replace_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("file.md");

        atomic_replace(&path, b"content").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "content");
    }

    #[test]
    fn test_atomic_replace_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.md");
        atomic_replace(&path, b"x").unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["target.md".to_string()]);
    }

    #[test]
    fn test_lock_path_is_sibling() {
        let p = lock_path_for(Path::new("/a/journal/2026-01-17.md"));
        assert_eq!(p, Path::new("/a/journal/2026-01-17.md.lock"));
    }

    #[test]
    fn test_scoped_lock_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("2026-01-17.md");

        {
            let lock = ScopedLock::acquire(&target).unwrap();
            assert!(lock.path().exists());
        }
        // Released on drop: reacquire immediately.
        let _lock = ScopedLock::acquire(&target).unwrap();
    }

    #[test]
    fn test_scoped_lock_times_out_when_held() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("held.md");

        let _held = ScopedLock::acquire(&target).unwrap();
        let result = ScopedLock::acquire_timeout(&target, Duration::from_millis(150));
        match result {
            Err(JournalError::LockTimeout { waited_ms, .. }) => {
                assert!(waited_ms >= 150);
            }
            other => panic!("expected LockTimeout, got {other:?}"),
        }
    }

    #[test]
    fn test_read_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maybe.md");
        assert!(read_if_exists(&path).unwrap().is_none());

        fs::write(&path, "hello").unwrap();
        assert_eq!(read_if_exists(&path).unwrap().unwrap(), "hello");
    }
}
