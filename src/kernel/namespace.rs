/// Namespace isolation for the supervised build
/// The build gets private mount, user, and PID namespaces; networking, IPC and
/// UTS stay shared with the host.
use crate::config::types::{CaptureError, Result};

use nix::sched::{unshare, CloneFlags};

/// Namespace set entered by the namespace owner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NamespaceIsolation {
    enable_mount_namespace: bool,
    enable_user_namespace: bool,
    enable_pid_namespace: bool,
}

impl NamespaceIsolation {
    pub fn new(enable_mount: bool, enable_user: bool, enable_pid: bool) -> Self {
        Self {
            enable_mount_namespace: enable_mount,
            enable_user_namespace: enable_user,
            enable_pid_namespace: enable_pid,
        }
    }

    /// Mount + user + PID, the only combination the sandbox uses
    pub fn for_build() -> Self {
        Self::new(true, true, true)
    }

    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        if self.enable_mount_namespace {
            flags |= CloneFlags::CLONE_NEWNS;
        }
        if self.enable_user_namespace {
            flags |= CloneFlags::CLONE_NEWUSER;
        }
        if self.enable_pid_namespace {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        flags
    }

    /// Unshare the configured namespaces.
    /// With CLONE_NEWPID the caller stays outside; its next child becomes PID 1.
    pub fn apply_isolation(&self) -> Result<()> {
        let flags = self.clone_flags();
        if flags.is_empty() {
            return Ok(());
        }

        unshare(flags).map_err(|e| {
            CaptureError::Namespace(format!("Failed to unshare namespaces: {}", e))
        })?;

        log::info!(
            "Successfully applied namespace isolation: {:?}",
            self.get_enabled_namespaces()
        );
        Ok(())
    }

    pub fn get_enabled_namespaces(&self) -> Vec<String> {
        let mut namespaces = Vec::new();
        if self.enable_mount_namespace {
            namespaces.push("Mount".to_string());
        }
        if self.enable_user_namespace {
            namespaces.push("User".to_string());
        }
        if self.enable_pid_namespace {
            namespaces.push("PID".to_string());
        }
        namespaces
    }
}

/// Check if host supports unprivileged user namespaces
pub fn check_unprivileged_userns_support() -> bool {
    // Debian/Ubuntu knob; absent elsewhere
    if let Ok(content) = std::fs::read_to_string("/proc/sys/kernel/unprivileged_userns_clone") {
        if content.trim() != "1" {
            return false;
        }
    }

    match std::fs::read_to_string("/proc/sys/user/max_user_namespaces") {
        Ok(content) => content.trim().parse::<u32>().map(|max| max > 0).unwrap_or(false),
        Err(_) => false,
    }
}
