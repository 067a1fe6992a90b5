/// Compilation database assembly
///
/// Runs once in the orchestrator after the supervised build is gone. Records
/// are numbered 1..N without gaps, so the first missing number ends the scan.
use crate::capture::record::{CompileCommand, InvocationRecord};
use crate::capture::sequencer::record_path;
use crate::config::types::{CaptureError, Result, SequenceNumber};
use crate::safety::SessionContext;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct DatabaseAssembler<'a> {
    log_dir: &'a Path,
}

impl<'a> DatabaseAssembler<'a> {
    pub fn new(session: &'a SessionContext) -> Self {
        Self::for_log_dir(session.log_dir())
    }

    pub fn for_log_dir(log_dir: &'a Path) -> Self {
        Self { log_dir }
    }

    /// All readable records in session order
    pub fn collect(&self) -> Vec<InvocationRecord> {
        let mut records = Vec::new();
        let mut number: SequenceNumber = 1;

        loop {
            let path = record_path(self.log_dir, number);
            match fs::read_to_string(&path) {
                Ok(text) => match InvocationRecord::parse(&path, &text) {
                    Ok(record) => records.push(record),
                    Err(e) => log::warn!("Skipping record {}: {}", number, e),
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(e) => {
                    log::warn!("Could not read {}, stopping: {}", path.display(), e);
                    break;
                }
            }

            number = match number.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }

        log::info!(
            "Collected {} compile commands from {}",
            records.len(),
            self.log_dir.display()
        );
        records
    }
}

/// Render the database as a JSON array with 4-space indentation
pub fn render_database(records: &[InvocationRecord]) -> Result<Vec<u8>> {
    let entries: Vec<CompileCommand> = records.iter().map(InvocationRecord::to_compile_command).collect();

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    entries.serialize(&mut serializer)?;
    out.push(b'\n');
    Ok(out)
}

fn staging_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "compile_commands.json".into());
    name.push(format!(".{}.tmp", std::process::id()));
    output.with_file_name(name)
}

/// Write the database once: stage next to `output`, then rename over it.
/// Readers see either the previous file or the complete new one.
pub fn write_database(records: &[InvocationRecord], output: &Path) -> Result<()> {
    let body = render_database(records)?;
    let staging = staging_path(output);

    let written = fs::File::create(&staging).and_then(|mut file| {
        file.write_all(&body)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&staging);
        return Err(CaptureError::Filesystem(format!(
            "could not write {}: {}",
            staging.display(),
            e
        )));
    }

    fs::rename(&staging, output).map_err(|e| {
        let _ = fs::remove_file(&staging);
        CaptureError::Filesystem(format!("could not move database to {}: {}", output.display(), e))
    })?;

    log::info!("Wrote {} entries to {}", records.len(), output.display());
    Ok(())
}
