/// Compiler shim role
///
/// Entered when this executable runs under a known compiler name inside a
/// session, or under another name of a redirected compiler binary: record
/// the call, then become the genuine compiler.
use crate::capture::alias::CompilerAlias;
use crate::capture::record::record;
use crate::capture::resolve::resolve_real_compiler;
use crate::config::types::{CaptureError, Result};
use crate::exec::redirect::NameRedirect;
use crate::safety::SessionContext;

/// Exit status when the shim fails before reaching the compiler
pub const SHIM_FAILURE_EXIT: i32 = 1;
/// Exit status when exec of the genuine compiler fails
pub const EXEC_FAILURE_EXIT: i32 = 127;

/// Record the invocation and work out what to exec
fn capture(name: &str, args: &[String]) -> Result<NameRedirect> {
    let session = SessionContext::from_env()?;

    let real_compiler = resolve_real_compiler(name, &[session.bin_dir()])
        .ok_or_else(|| CaptureError::Config(format!("real {} not found on PATH", name)))?;
    let cwd = std::env::current_dir()?;

    record(&session, &real_compiler, args, &cwd)?;
    Ok(NameRedirect::for_shim(session.bin_dir(), name))
}

/// An alias records the binary it was mapped to and keeps its own name
/// in argv[0]
fn capture_alias(alias: &CompilerAlias, invoked_as: &str, args: &[String]) -> Result<NameRedirect> {
    let session = alias.session();
    let redirect = alias.redirect();
    let cwd = std::env::current_dir()?;

    record(session, &redirect.real_path, args, &cwd)?;
    Ok(NameRedirect::new(session.bin_dir().join(&redirect.name), invoked_as))
}

fn exec_captured(label: &str, captured: Result<NameRedirect>, args: &[String]) -> i32 {
    let redirect = match captured {
        Ok(redirect) => redirect,
        Err(e) => {
            eprintln!("ccbox ({}): {}", label, e);
            return SHIM_FAILURE_EXIT;
        }
    };

    match redirect.exec(args) {
        Ok(never) => match never {},
        Err(e) => {
            eprintln!("ccbox ({}): {}", label, e);
            EXEC_FAILURE_EXIT
        }
    }
}

/// Run as compiler `name`; only returns the exit status on failure
pub fn run_compiler_shim(name: &str, args: &[String]) -> i32 {
    exec_captured(name, capture(name, args), args)
}

/// Run as the compiler `alias` stands for, invoked under `invoked_as`;
/// only returns the exit status on failure
pub fn run_alias_shim(alias: &CompilerAlias, invoked_as: &str, args: &[String]) -> i32 {
    exec_captured(invoked_as, capture_alias(alias, invoked_as, args), args)
}
