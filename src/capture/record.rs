/// Invocation records: one per intercepted compiler call
///
/// On disk a record is exactly three tagged lines:
///
/// ```text
/// CWD: <working directory>
/// FILE: <source file, or the working directory when none was found>
/// CMD: <real compiler> <arguments...>
/// ```
///
/// Values are escaped to keep each on its own line: `\\` stands for a
/// backslash, `\n` and `\r` for line breaks.
use crate::capture::sequencer::LogSequencer;
use crate::config::constants::{CMD_TAG, CWD_TAG, FILE_TAG};
use crate::config::types::{CaptureError, Result, SequenceNumber};
use crate::safety::SessionContext;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One compiler invocation as captured by a shim
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationRecord {
    pub working_directory: PathBuf,
    pub source_file: PathBuf,
    /// Absolute path of the real compiler
    pub command: PathBuf,
    /// Arguments after argv[0]
    pub arguments: Vec<String>,
}

/// Public compilation database entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompileCommand {
    pub directory: String,
    pub file: String,
    pub command: String,
}

/// First argument that is not an option and names an existing file.
/// Relative names are checked against `cwd`; the name is returned as written.
pub fn detect_source_file(arguments: &[String], cwd: &Path) -> Option<PathBuf> {
    arguments
        .iter()
        .filter(|arg| !arg.is_empty() && !arg.starts_with('-'))
        .map(PathBuf::from)
        .find(|candidate| cwd.join(candidate).is_file())
}

fn escape_field(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// `None` for an unknown escape or a dangling backslash
fn unescape_field(value: &str) -> Option<String> {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => unescaped.push('\\'),
            'n' => unescaped.push('\n'),
            'r' => unescaped.push('\r'),
            _ => return None,
        }
    }
    Some(unescaped)
}

impl InvocationRecord {
    /// Build a record, falling back to `cwd` when no source file is found
    pub fn capture(command: PathBuf, arguments: Vec<String>, cwd: PathBuf) -> Self {
        let source_file = detect_source_file(&arguments, &cwd).unwrap_or_else(|| cwd.clone());
        Self {
            working_directory: cwd,
            source_file,
            command,
            arguments,
        }
    }

    /// Shell-quoted command line; plain arguments are kept verbatim
    pub fn command_line(&self) -> String {
        let command = self.command.to_string_lossy();
        let words = std::iter::once(command.as_ref()).chain(self.arguments.iter().map(String::as_str));
        shell_words::join(words)
    }

    /// Serialized three-line body
    pub fn to_log_text(&self) -> String {
        format!(
            "{}{}\n{}{}\n{}{}\n",
            CWD_TAG,
            escape_field(&self.working_directory.to_string_lossy()),
            FILE_TAG,
            escape_field(&self.source_file.to_string_lossy()),
            CMD_TAG,
            escape_field(&self.command_line())
        )
    }

    /// Parse a record body; lines are matched by tag, not position
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let malformed = |details: &str| CaptureError::Record {
            path: path.to_path_buf(),
            details: details.to_string(),
        };

        let mut cwd = None;
        let mut file = None;
        let mut cmd = None;
        for line in text.lines() {
            if let Some(value) = line.strip_prefix(CWD_TAG) {
                cwd = Some(value);
            } else if let Some(value) = line.strip_prefix(FILE_TAG) {
                file = Some(value);
            } else if let Some(value) = line.strip_prefix(CMD_TAG) {
                cmd = Some(value);
            }
        }

        let cwd = cwd.ok_or_else(|| malformed("missing CWD line"))?;
        let file = file.ok_or_else(|| malformed("missing FILE line"))?;
        let cmd = cmd.ok_or_else(|| malformed("missing CMD line"))?;

        let cwd = unescape_field(cwd).ok_or_else(|| malformed("bad escape in CWD line"))?;
        let file = unescape_field(file).ok_or_else(|| malformed("bad escape in FILE line"))?;
        let cmd = unescape_field(cmd).ok_or_else(|| malformed("bad escape in CMD line"))?;

        let mut words = shell_words::split(&cmd)
            .map_err(|e| malformed(&format!("unparsable command line: {}", e)))?
            .into_iter();
        let command = words.next().ok_or_else(|| malformed("empty command line"))?;

        Ok(Self {
            working_directory: PathBuf::from(cwd),
            source_file: PathBuf::from(file),
            command: PathBuf::from(command),
            arguments: words.collect(),
        })
    }

    /// Projection onto the public database schema
    pub fn to_compile_command(&self) -> CompileCommand {
        CompileCommand {
            directory: self.working_directory.to_string_lossy().into_owned(),
            file: self.source_file.to_string_lossy().into_owned(),
            command: self.command_line(),
        }
    }
}

/// Persist one invocation into the session log.
/// Any failure here is fatal for the shim: a lost record corrupts the database.
pub fn record(
    session: &SessionContext,
    real_compiler: &Path,
    arguments: &[String],
    cwd: &Path,
) -> Result<SequenceNumber> {
    let invocation =
        InvocationRecord::capture(real_compiler.to_path_buf(), arguments.to_vec(), cwd.to_path_buf());

    let slot = LogSequencer::new(session).next_number()?;
    let number = slot.number();
    let path = slot.path().to_path_buf();

    let mut file = slot.into_file();
    file.write_all(invocation.to_log_text().as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| {
            CaptureError::Filesystem(format!("could not write record {}: {}", path.display(), e))
        })?;

    log::debug!(
        "Recorded invocation {} of {} for {}",
        number,
        real_compiler.display(),
        invocation.source_file.display()
    );
    Ok(number)
}
