/// Process image replacement
///
/// Nothing runs after a successful exec, so callers release descriptors and
/// flush records before getting here.
use crate::config::types::{CaptureError, Infallible, Result};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

fn to_cstring(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| CaptureError::Config(format!("argument contains NUL byte: {:?}", value)))
}

fn build_argv(argv0: &str, args: &[String]) -> Result<Vec<CString>> {
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(to_cstring(argv0)?);
    for arg in args {
        argv.push(to_cstring(arg)?);
    }
    Ok(argv)
}

/// Run `program` while the new image sees itself as `name`.
///
/// Shims exec the genuine compiler from the shim-bin directory but keep the
/// plain basename in argv[0]; gcc locates its helpers relative to argv[0] and
/// misbehaves on path-qualified names such as `./gcc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameRedirect {
    program: PathBuf,
    name: String,
}

impl NameRedirect {
    pub fn new(program: PathBuf, name: &str) -> Self {
        Self {
            program,
            name: name.to_string(),
        }
    }

    /// The genuine compiler `name` as bound into the shim-bin directory
    pub fn for_shim(bin_dir: &Path, name: &str) -> Self {
        Self::new(bin_dir.join(name), name)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exec(&self, args: &[String]) -> Result<Infallible> {
        let program = CString::new(self.program.as_os_str().as_bytes()).map_err(|_| {
            CaptureError::Config(format!("program path contains NUL byte: {}", self.program.display()))
        })?;
        let argv = build_argv(&self.name, args)?;

        nix::unistd::execv(&program, &argv).map_err(|e| {
            CaptureError::Process(format!("failed to execute {}: {}", self.program.display(), e))
        })
    }
}

/// Replace this process with `command[0]`, searched on PATH
pub fn exec_command(command: &[String]) -> Result<Infallible> {
    let (first, rest) = command
        .split_first()
        .ok_or_else(|| CaptureError::Config("empty command for exec".to_string()))?;
    let argv = build_argv(first, rest)?;

    log::info!("Executing build command via execvp: {:?}", command);
    nix::unistd::execvp(&argv[0], &argv)
        .map_err(|e| CaptureError::Process(format!("failed to execute {}: {}", first, e)))
}
