/// Other names for an intercepted compiler
///
/// The build driver binds this executable over each genuine compiler binary,
/// so every other path to that binary runs ccbox too: `gcc-12`,
/// `x86_64-linux-gnu-gcc-12`, or the canonical path itself. The driver leaves
/// a redirect table in the log directory. A call under an unknown name inside
/// a session is matched against it by executable path and handled as the
/// compiler it stands for.
use crate::config::constants::REDIRECTS_FILE_NAME;
use crate::config::types::{CaptureError, CompilerRedirect, Result};
use crate::safety::SessionContext;
use std::fs;
use std::path::{Path, PathBuf};

pub fn redirect_table_path(session: &SessionContext) -> PathBuf {
    session.log_dir().join(REDIRECTS_FILE_NAME)
}

pub fn write_redirect_table(session: &SessionContext, redirects: &[CompilerRedirect]) -> Result<()> {
    let path = redirect_table_path(session);
    let payload = serde_json::to_vec_pretty(redirects)?;
    fs::write(&path, payload).map_err(|e| {
        CaptureError::Filesystem(format!("Failed to write {}: {}", path.display(), e))
    })?;
    log::debug!("Published {} compiler redirects to {}", redirects.len(), path.display());
    Ok(())
}

pub fn read_redirect_table(session: &SessionContext) -> Result<Vec<CompilerRedirect>> {
    let data = fs::read(redirect_table_path(session))?;
    Ok(serde_json::from_slice(&data)?)
}

/// First redirect whose genuine binary is `exe`
pub fn find_redirect<'a>(redirects: &'a [CompilerRedirect], exe: &Path) -> Option<&'a CompilerRedirect> {
    redirects.iter().find(|r| r.real_path == exe)
}

/// A call that reached ccbox through another name for a redirected compiler
#[derive(Clone, Debug)]
pub struct CompilerAlias {
    session: SessionContext,
    redirect: CompilerRedirect,
}

impl CompilerAlias {
    /// Match `exe` against the table of `session`
    pub fn lookup(session: SessionContext, exe: &Path) -> Option<Self> {
        let redirects = match read_redirect_table(&session) {
            Ok(redirects) => redirects,
            Err(CaptureError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Ignoring unreadable redirect table: {}", e);
                return None;
            }
        };

        let redirect = find_redirect(&redirects, exe)?.clone();
        log::debug!("{} is an alias of {}", exe.display(), redirect.name);
        Some(Self { session, redirect })
    }

    /// The current process, when it was started inside a session through a
    /// redirected compiler binary
    pub fn detect() -> Option<Self> {
        let session = SessionContext::from_env().ok()?;
        let exe = std::env::current_exe().ok()?;
        let exe = fs::canonicalize(&exe).unwrap_or(exe);
        Self::lookup(session, &exe)
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn redirect(&self) -> &CompilerRedirect {
        &self.redirect
    }
}
