/// Sequential record numbering across concurrent shim processes
///
/// Every shim in a session races for the same log directory. Numbers are
/// handed out under an exclusive flock on the session lock file, and the
/// record file for a number is created before the lock is dropped, so the next
/// holder always sees it.
use crate::config::constants::{LOCK_FILE_NAME, RECORD_PREFIX};
use crate::config::types::{CaptureError, Result, SequenceNumber};
use crate::safety::SessionContext;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, IntoRawFd};
use std::path::{Path, PathBuf};

/// Path of record `number` inside `log_dir`
pub fn record_path(log_dir: &Path, number: SequenceNumber) -> PathBuf {
    log_dir.join(format!("{}{}", RECORD_PREFIX, number))
}

/// Sequence number encoded in a record file name, if it is one
pub fn parse_record_name(name: &str) -> Option<SequenceNumber> {
    let digits = name.strip_prefix(RECORD_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// A freshly created, still empty record file
#[derive(Debug)]
pub struct RecordSlot {
    number: SequenceNumber,
    path: PathBuf,
    file: File,
}

impl RecordSlot {
    pub fn number(&self) -> SequenceNumber {
        self.number
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_file(self) -> File {
        self.file
    }
}

/// Exclusive hold on the session lock file
struct SequencerLock {
    file: File,
    path: PathBuf,
}

impl SequencerLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .mode(0o600)
            .open(&path)
            .map_err(|e| CaptureError::Lock(format!("could not open {}: {}", path.display(), e)))?;

        loop {
            // SAFETY: fd is owned by `file` and stays open for the call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc == 0 {
                break;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(CaptureError::Lock(format!(
                "locking {} failed: {}",
                path.display(),
                err
            )));
        }

        Ok(Self { file, path })
    }

    /// Unlock and close, surfacing errors that a plain drop would swallow
    fn release(self) -> Result<()> {
        // SAFETY: fd is owned by `self.file`.
        let rc = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        if rc != 0 {
            return Err(CaptureError::Lock(format!(
                "unlocking {} failed: {}",
                self.path.display(),
                std::io::Error::last_os_error()
            )));
        }

        let fd = self.file.into_raw_fd();
        nix::unistd::close(fd).map_err(|e| {
            CaptureError::Lock(format!("closing {} failed: {}", self.path.display(), e))
        })
    }
}

/// Hands out record numbers for one session's log directory
pub struct LogSequencer<'a> {
    log_dir: &'a Path,
}

impl<'a> LogSequencer<'a> {
    pub fn new(session: &'a SessionContext) -> Self {
        Self::for_log_dir(session.log_dir())
    }

    pub fn for_log_dir(log_dir: &'a Path) -> Self {
        Self { log_dir }
    }

    /// Highest record number currently present; entries that are not records are ignored
    fn highest_number(&self) -> Result<SequenceNumber> {
        let mut highest = 0;
        for entry in fs::read_dir(self.log_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match parse_record_name(name) {
                Some(number) => highest = highest.max(number),
                None if name.starts_with(RECORD_PREFIX) => {
                    log::debug!("Ignoring log entry with invalid number: {}", name);
                }
                None => {}
            }
        }
        Ok(highest)
    }

    /// Claim the next number and create its record file
    pub fn next_number(&self) -> Result<RecordSlot> {
        let lock = SequencerLock::acquire(self.log_dir.join(LOCK_FILE_NAME))?;

        let number = self
            .highest_number()?
            .checked_add(1)
            .ok_or_else(|| CaptureError::Lock("record numbers exhausted".to_string()))?;
        let path = record_path(self.log_dir, number);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
            .map_err(|e| {
                CaptureError::Filesystem(format!("could not create {}: {}", path.display(), e))
            })?;

        lock.release()?;

        log::debug!("Claimed record {} at {}", number, path.display());
        Ok(RecordSlot { number, path, file })
    }
}
