//! Names shared between the orchestrator and every shim in a session.
//!
//! These are part of the on-disk and environment contract: a shim built from
//! one revision must understand a session created by the orchestrator.

/// Compiler basenames intercepted inside the sandbox
pub const KNOWN_COMPILERS: [&str; 6] = ["clang", "clang++", "gcc", "cc", "c++", "g++"];

/// Log directory of the current session
pub const LOG_DIR_ENV: &str = "CC_LOGDIR";

/// Shim-bin directory holding the genuine compilers
pub const BIN_DIR_ENV: &str = "CC_BINDIR";

/// Lock file guarding record numbering
pub const LOCK_FILE_NAME: &str = "ccbox.lock";

/// Record file names are this prefix plus a decimal sequence number
pub const RECORD_PREFIX: &str = "exec.log.";

/// Redirect table of the session, kept in the log directory
pub const REDIRECTS_FILE_NAME: &str = "ccbox.redirects";

pub const CWD_TAG: &str = "CWD: ";
pub const FILE_TAG: &str = "FILE: ";
pub const CMD_TAG: &str = "CMD: ";

/// Default database name, relative to the orchestrator's working directory
pub const DATABASE_FILE_NAME: &str = "compile_commands.json";

pub fn is_known_compiler(name: &str) -> bool {
    KNOWN_COMPILERS.contains(&name)
}
