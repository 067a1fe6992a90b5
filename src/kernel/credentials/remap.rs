//! One-shot identity remap for a fresh user namespace.
//!
//! The invoking host user becomes UID/GID 0 inside the namespace, which gives
//! the build driver the capability it needs for bind mounts. The kernel accepts
//! each map file exactly once, so the remap is consumed by `apply`.

use crate::config::types::{CaptureError, Result};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One line of a `uid_map` / `gid_map` file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdMapping {
    pub container_id: u32,
    pub host_id: u32,
    pub count: u32,
}

impl IdMapping {
    /// Map a single host ID to 0
    pub fn root_for(host_id: u32) -> Self {
        Self {
            container_id: 0,
            host_id,
            count: 1,
        }
    }
}

impl fmt::Display for IdMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.container_id, self.host_id, self.count)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct IdentityRemap {
    uid: IdMapping,
    gid: IdMapping,
}

fn write_proc_file(path: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new().write(true).open(path).map_err(|e| {
        CaptureError::Privilege(format!("Failed to open {}: {}", path.display(), e))
    })?;
    // The kernel parses each map file from a single write.
    file.write_all(contents.as_bytes()).map_err(|e| {
        CaptureError::Privilege(format!(
            "Failed to write {:?} to {}: {}",
            contents,
            path.display(),
            e
        ))
    })
}

impl IdentityRemap {
    pub fn new(host_uid: u32, host_gid: u32) -> Self {
        Self {
            uid: IdMapping::root_for(host_uid),
            gid: IdMapping::root_for(host_gid),
        }
    }

    /// Remap for the real UID/GID of this process.
    /// Capture this before unsharing: inside a fresh user namespace the
    /// IDs read back as the overflow user.
    pub fn for_invoking_user() -> Self {
        Self::new(nix::unistd::getuid().as_raw(), nix::unistd::getgid().as_raw())
    }

    pub fn uid_mapping(&self) -> IdMapping {
        self.uid
    }

    pub fn gid_mapping(&self) -> IdMapping {
        self.gid
    }

    /// Apply to the calling process's user namespace
    pub fn apply(self) -> Result<()> {
        self.apply_at(Path::new("/proc/self"))
    }

    /// Deny setgroups, then write the UID map and the GID map, each through its own file
    pub fn apply_at(self, proc_dir: &Path) -> Result<()> {
        let setgroups: PathBuf = proc_dir.join("setgroups");
        let uid_map = proc_dir.join("uid_map");
        let gid_map = proc_dir.join("gid_map");

        write_proc_file(&setgroups, "deny")?;
        write_proc_file(&uid_map, &self.uid.to_string())?;
        write_proc_file(&gid_map, &self.gid.to_string())?;

        log::info!(
            "Identity remapped: uid {} -> 0, gid {} -> 0",
            self.uid.host_id,
            self.gid.host_id
        );
        Ok(())
    }
}
