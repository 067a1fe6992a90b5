/// Propagation hardening and file bind mounts inside the build's mount namespace
use crate::config::types::{CaptureError, Result};
use nix::mount::{mount, MsFlags};
use std::fs::OpenOptions;
use std::path::Path;

/// Mount points detached from host propagation, in order
pub const PRIVATE_MOUNT_POINTS: [&str; 2] = ["/", "/proc"];

/// Remount `/` and `/proc` as `MS_REC | MS_PRIVATE`.
/// Without this the compiler bind mounts would leak into the host namespace.
pub fn harden_mount_propagation() -> Result<()> {
    for target in PRIVATE_MOUNT_POINTS {
        mount(
            None::<&str>,
            target,
            None::<&str>,
            MsFlags::MS_REC | MsFlags::MS_PRIVATE,
            None::<&str>,
        )
        .map_err(|e| {
            CaptureError::Namespace(format!(
                "Failed to harden mount propagation (MS_PRIVATE|MS_REC on {}): {}",
                target, e
            ))
        })?;
    }

    log::info!("Mount propagation hardened: / and /proc set to MS_PRIVATE|MS_REC");
    Ok(())
}

/// Bind-mount file `source` over `target`, creating an empty `target` first if needed
pub fn bind_mount_file(source: &Path, target: &Path) -> Result<()> {
    if !target.exists() {
        OpenOptions::new()
            .write(true)
            .create(true)
            .open(target)
            .map_err(|e| {
                CaptureError::Filesystem(format!(
                    "Failed to create bind target {}: {}",
                    target.display(),
                    e
                ))
            })?;
    }

    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .map_err(|e| {
        CaptureError::Filesystem(format!(
            "Failed to bind mount {} to {}: {}",
            source.display(),
            target.display(),
            e
        ))
    })?;

    log::debug!("Bound {} to {}", source.display(), target.display());
    Ok(())
}
