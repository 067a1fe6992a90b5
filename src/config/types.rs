/// Core types shared by the orchestrator and compiler shim roles
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Process-replacing calls return `Infallible` on success.
pub use std::convert::Infallible;

/// Record sequence number, unique and contiguous within one session
pub type SequenceNumber = u32;

/// Custom error types for ccbox
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Namespace isolation error: {0}")]
    Namespace(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Privilege error: {0}")]
    Privilege(String),

    #[error("Malformed record {path}: {details}")]
    Record { path: PathBuf, details: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for ccbox operations
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Orchestrator settings resolved from the command line and environment
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Where the compilation database is written
    pub output: PathBuf,
    /// Keep the log and shim-bin directories after the session
    pub keep_session: bool,
    /// Parent directory for the session directories
    pub session_root: PathBuf,
    /// Supervised build command and its arguments
    pub command: Vec<String>,
}

impl OrchestratorConfig {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            output: PathBuf::from(crate::config::constants::DATABASE_FILE_NAME),
            keep_session: false,
            session_root: std::env::temp_dir(),
            command,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.is_empty() {
            return Err(CaptureError::Config(
                "no build command given; usage: ccbox <command> [args...]".to_string(),
            ));
        }
        if self.output.as_os_str().is_empty() {
            return Err(CaptureError::Config("output path is empty".to_string()));
        }
        Ok(())
    }
}

/// Reason the build driver gave up before exec'ing the build.
/// Travels from the build driver to the orchestrator over the status pipe.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetupFailure {
    pub stage: String,
    pub message: String,
}

impl SetupFailure {
    pub fn new(stage: &str, err: &CaptureError) -> Self {
        Self {
            stage: stage.to_string(),
            message: err.to_string(),
        }
    }
}

/// A known compiler name and the genuine binary it resolved to.
/// The build driver publishes the full set to the session so that other
/// names for the same binary can be traced back to it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompilerRedirect {
    pub name: String,
    pub real_path: PathBuf,
}

/// How a supervised process ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
}

impl ExitOutcome {
    /// Shell convention: exit code as-is, 128 + signal number otherwise
    pub fn code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(sig) => 128 + sig,
        }
    }
}
