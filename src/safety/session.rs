/// Session-scoped log and shim-bin directories
///
/// One orchestrator invocation owns exactly one session. Shims never create a
/// session; they attach to the one exported through the environment.
use crate::config::constants::{BIN_DIR_ENV, LOG_DIR_ENV};
use crate::config::types::{CaptureError, Result};
use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct SessionContext {
    log_dir: PathBuf,
    bin_dir: PathBuf,
    retain: bool,
}

fn create_private_dir(path: &Path) -> Result<()> {
    DirBuilder::new().mode(0o700).create(path).map_err(|e| {
        CaptureError::Filesystem(format!(
            "Failed to create session directory {}: {}",
            path.display(),
            e
        ))
    })
}

impl SessionContext {
    /// Create both session directories under `root`.
    /// They exist on disk before anything can export their paths.
    pub fn create(root: &Path, retain: bool) -> Result<Self> {
        let session_id = Uuid::new_v4().simple().to_string();
        let log_dir = root.join(format!("ccbox-logdir-{}", session_id));
        let bin_dir = root.join(format!("ccbox-bindir-{}", session_id));

        create_private_dir(&log_dir)?;
        if let Err(e) = create_private_dir(&bin_dir) {
            let _ = fs::remove_dir_all(&log_dir);
            return Err(e);
        }

        log::debug!(
            "Created session {} (logs: {}, shims: {})",
            session_id,
            log_dir.display(),
            bin_dir.display()
        );

        Ok(Self {
            log_dir,
            bin_dir,
            retain,
        })
    }

    /// Attach to an existing session, e.g. one exported by the orchestrator
    pub fn attach(log_dir: PathBuf, bin_dir: PathBuf) -> Self {
        Self {
            log_dir,
            bin_dir,
            retain: true,
        }
    }

    /// Session as seen by a compiler shim. Both variables are mandatory.
    pub fn from_env() -> Result<Self> {
        let log_dir = std::env::var_os(LOG_DIR_ENV)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CaptureError::Config(format!("{} not set", LOG_DIR_ENV)))?;
        let bin_dir = std::env::var_os(BIN_DIR_ENV)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CaptureError::Config(format!("{} not set", BIN_DIR_ENV)))?;

        Ok(Self::attach(PathBuf::from(log_dir), PathBuf::from(bin_dir)))
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Environment entries that hand this session to the shims
    pub fn env_vars(&self) -> [(&'static str, &Path); 2] {
        [(LOG_DIR_ENV, &self.log_dir), (BIN_DIR_ENV, &self.bin_dir)]
    }

    /// Export into the current process environment.
    /// Only called in the single-threaded build driver right before exec.
    pub fn export_to_env(&self) {
        for (key, value) in self.env_vars() {
            std::env::set_var(key, value);
        }
    }

    /// End of session: remove both directories unless retention was requested
    pub fn dispose(self) -> Result<()> {
        if self.retain {
            log::warn!(
                "Keeping session directories: logs at {}, shims at {}",
                self.log_dir.display(),
                self.bin_dir.display()
            );
            return Ok(());
        }

        let mut first_error = None;
        for dir in [&self.log_dir, &self.bin_dir] {
            if let Err(e) = fs::remove_dir_all(dir) {
                if e.kind() == std::io::ErrorKind::NotFound {
                    continue;
                }
                log::warn!("Failed to remove session directory {}: {}", dir.display(), e);
                first_error.get_or_insert(CaptureError::Filesystem(format!(
                    "Failed to remove {}: {}",
                    dir.display(),
                    e
                )));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
