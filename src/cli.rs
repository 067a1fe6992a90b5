use crate::capture::alias::CompilerAlias;
use crate::capture::shim::{run_alias_shim, run_compiler_shim, SHIM_FAILURE_EXIT};
use crate::config::constants::{is_known_compiler, DATABASE_FILE_NAME};
use crate::config::types::OrchestratorConfig;
use crate::exec::supervisor::run_orchestrator;
use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::Parser;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// What this process is, decided by the name it was invoked under
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Role {
    /// Running as a known compiler inside a session
    CompilerShim { name: String },
    /// Running as `ccbox <command> [args...]`
    Orchestrator,
}

fn invoked_name(argv0: &OsStr) -> &str {
    Path::new(argv0)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
}

impl Role {
    pub fn from_invocation(argv0: &OsStr) -> Self {
        let name = invoked_name(argv0);

        if is_known_compiler(name) {
            Self::CompilerShim {
                name: name.to_string(),
            }
        } else {
            Self::Orchestrator
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "ccbox",
    author,
    version,
    about = "Capture a compilation database by running a build in a compiler-intercepting sandbox"
)]
struct Cli {
    /// Where to write the compilation database
    #[arg(short, long, value_name = "PATH", default_value = DATABASE_FILE_NAME)]
    output: PathBuf,

    /// Keep the session's log and shim directories for inspection
    #[arg(long, env = "CCBOX_KEEP_SESSION", value_parser = FalseyValueParser::new())]
    keep_session: bool,

    /// Directory in which session directories are created
    #[arg(long, env = "CCBOX_SESSION_ROOT", value_name = "DIR")]
    session_root: Option<PathBuf>,

    /// Build command and its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

impl Cli {
    fn into_config(self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::new(self.command);
        config.output = self.output;
        config.keep_session = self.keep_session;
        if let Some(root) = self.session_root {
            config.session_root = root;
        }
        config
    }
}

fn init_logging() {
    // Shims share stderr with the compiler; stay quiet unless asked
    let env = env_logger::Env::default().default_filter_or("warn");
    let _ = env_logger::Builder::from_env(env).try_init();
}

fn shim_arguments(args: impl Iterator<Item = OsString>) -> Option<Vec<String>> {
    args.map(|arg| arg.into_string().ok()).collect()
}

fn reject_non_utf8(name: &str) -> i32 {
    eprintln!("ccbox ({}): arguments must be valid UTF-8", name);
    SHIM_FAILURE_EXIT
}

/// Dispatch on argv[0]; returns the process exit status.
/// An unknown name inside a session may still be a redirected compiler
/// reached through one of its other names; only then is it a shim.
pub fn run() -> Result<i32> {
    init_logging();

    let mut args = std::env::args_os();
    let argv0 = args.next().unwrap_or_default();

    match Role::from_invocation(&argv0) {
        Role::CompilerShim { name } => match shim_arguments(args) {
            Some(args) => Ok(run_compiler_shim(&name, &args)),
            None => Ok(reject_non_utf8(&name)),
        },
        Role::Orchestrator => {
            if let Some(alias) = CompilerAlias::detect() {
                let invoked_as = invoked_name(&argv0).to_string();
                return Ok(match shim_arguments(args) {
                    Some(args) => run_alias_shim(&alias, &invoked_as, &args),
                    None => reject_non_utf8(&invoked_as),
                });
            }

            let cli = Cli::parse_from(std::iter::once(argv0).chain(args));
            let config = cli.into_config();
            log::debug!("Orchestrator config: {:?}", config);
            Ok(run_orchestrator(&config)?)
        }
    }
}
