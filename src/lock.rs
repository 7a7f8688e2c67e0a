//! Working-area lock
//!
//! Two runs sharing a working area would overwrite each other's override
//! document and intermediate files, so a run takes an exclusive advisory
//! lock on the working area and a second run fails immediately instead of
//! waiting. Runs with different working areas but the same output
//! directory and prefix would overwrite each other's final files, so the
//! output prefix is locked as well. Locks are released when the guard is
//! dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("{} is in use by another run (lock {})", .dir.display(), .lock_path.display())]
    Busy { dir: PathBuf, lock_path: PathBuf },

    #[error("cannot lock {}: {source}", .dir.display())]
    Io {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive lock on a working area
pub struct WorkDirLock {
    lock_path: PathBuf,
    lock_file: File,
}

impl WorkDirLock {
    /// Lock file name
    pub const LOCK_FILENAME: &'static str = ".tinker-prep.lock";

    /// Acquire the lock without waiting
    ///
    /// Creates the working area if it does not exist. The lock file records
    /// the holder's process id for diagnostics.
    pub fn acquire(work_dir: &Path) -> Result<Self, LockError> {
        Self::lock(work_dir, Self::LOCK_FILENAME)
    }

    /// Lock the final files `<prefix>_final.*` in `output_dir`
    pub fn acquire_output(output_dir: &Path, prefix: &str) -> Result<Self, LockError> {
        Self::lock(output_dir, &format!(".{prefix}{}", Self::LOCK_FILENAME))
    }

    fn lock(dir: &Path, file_name: &str) -> Result<Self, LockError> {
        let io_error = |source| LockError::Io {
            dir: dir.to_path_buf(),
            source,
        };
        fs::create_dir_all(dir).map_err(io_error)?;

        let lock_path = dir.join(file_name);
        let mut lock_file = match try_lock_exclusive(&lock_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(LockError::Busy {
                    dir: dir.to_path_buf(),
                    lock_path,
                });
            }
            Err(e) => return Err(io_error(e)),
        };

        lock_file
            .set_len(0)
            .and_then(|()| writeln!(lock_file, "{}", std::process::id()))
            .map_err(io_error)?;
        debug!("Locked {}", lock_path.display());

        Ok(Self {
            lock_path,
            lock_file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

/// Open the lock file and take a non-blocking exclusive lock
#[cfg(unix)]
fn try_lock_exclusive(lock_path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;

    // Not truncated here: the current holder's pid must survive a failed attempt
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o644)
        .open(lock_path)?;

    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(file)
    } else {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
        } else {
            Err(err)
        }
    }
}

/// Non-Unix fallback: exclusive creation of the lock file
#[cfg(not(unix))]
fn try_lock_exclusive(lock_path: &Path) -> io::Result<File> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
        }
        Err(e) => Err(e),
    }
}

impl Drop for WorkDirLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.lock_file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_directory_and_file() {
        let temp_dir = TempDir::new().unwrap();
        let work_dir = temp_dir.path().join("temp");

        let lock = WorkDirLock::acquire(&work_dir).unwrap();
        assert!(work_dir.is_dir());
        assert!(lock.path().exists());
        assert_eq!(lock.path().file_name().unwrap(), WorkDirLock::LOCK_FILENAME);

        let pid = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_second_acquire_is_busy() {
        let temp_dir = TempDir::new().unwrap();
        let _lock = WorkDirLock::acquire(temp_dir.path()).unwrap();

        let err = WorkDirLock::acquire(temp_dir.path()).err().unwrap();
        assert!(matches!(err, LockError::Busy { .. }));
        assert!(err.to_string().contains("in use by another run"));
    }

    #[test]
    fn test_released_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        {
            let _lock = WorkDirLock::acquire(temp_dir.path()).unwrap();
        }
        assert!(WorkDirLock::acquire(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_output_prefix_lock() {
        let temp_dir = TempDir::new().unwrap();
        let lock = WorkDirLock::acquire_output(temp_dir.path(), "crambin").unwrap();
        assert_eq!(lock.path().file_name().unwrap(), ".crambin.tinker-prep.lock");

        let err = WorkDirLock::acquire_output(temp_dir.path(), "crambin").err().unwrap();
        assert!(matches!(err, LockError::Busy { .. }));

        // Other prefixes and the working-area lock are independent
        assert!(WorkDirLock::acquire_output(temp_dir.path(), "ubiquitin").is_ok());
        assert!(WorkDirLock::acquire(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_unusable_work_dir() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, "").unwrap();

        let err = WorkDirLock::acquire(&blocker.join("sub")).err().unwrap();
        assert!(matches!(err, LockError::Io { .. }));
    }
}
