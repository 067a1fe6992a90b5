use crate::capture::assembler::{write_database, DatabaseAssembler};
use crate::capture::resolve::own_executable;
use crate::config::types::{
    CaptureError, ExitOutcome, Infallible, OrchestratorConfig, Result, SetupFailure,
};
use crate::exec::preexec::{FreshChild, NamespacesReady, Sandbox};
use crate::kernel::credentials::IdentityRemap;
use crate::kernel::namespace::{check_unprivileged_userns_support, NamespaceIsolation};
use crate::kernel::signal::SignalRecorder;
use crate::safety::SessionContext;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, pipe2, ForkResult, Pid};
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::OwnedFd;
use std::path::PathBuf;

/// Orchestrator exit status when the sandbox could not be built
pub const SETUP_FAILURE_EXIT: i32 = 1;

/// Build driver exit status after reporting a setup failure
const DRIVER_SETUP_EXIT: i32 = 126;

/// Everything the build driver needs, fixed before the first fork
struct BuildLaunch {
    session: SessionContext,
    remap: IdentityRemap,
    own_exe: PathBuf,
    command: Vec<String>,
}

fn to_process_error(prefix: &str, err: impl std::fmt::Display) -> CaptureError {
    CaptureError::Process(format!("{prefix}: {err}"))
}

fn report_setup_failure(status: OwnedFd, failure: &SetupFailure) {
    let mut file = File::from(status);
    match serde_json::to_vec(failure) {
        Ok(payload) => {
            let _ = file.write_all(&payload);
        }
        Err(e) => {
            let _ = writeln!(std::io::stderr(), "ccbox: could not encode setup failure: {e}");
        }
    }
}

/// `None` on EOF: the status pipe is close-on-exec, so a successful exec
/// of the build closes it without a report.
fn read_setup_failure(status: OwnedFd) -> Result<Option<SetupFailure>> {
    let mut file = File::from(status);
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&data)?))
}

fn wait_for_child(child: Pid, label: &str) -> Result<ExitOutcome> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ExitOutcome::Exited(code)),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(ExitOutcome::Signaled(sig as i32)),
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(to_process_error(&format!("waitpid({label})"), e)),
        }
    }
}

fn drive_build(
    sandbox: Sandbox<NamespacesReady>,
    launch: BuildLaunch,
) -> std::result::Result<Infallible, SetupFailure> {
    let BuildLaunch {
        session,
        remap,
        own_exe,
        command,
    } = launch;

    let sandbox = sandbox
        .harden_mount_propagation()
        .map_err(|e| SetupFailure::new("mount-propagation", &e))?;
    let sandbox = sandbox
        .remap_identity(remap)
        .map_err(|e| SetupFailure::new("identity-remap", &e))?;
    let sandbox = sandbox
        .redirect_compilers(&own_exe, session.bin_dir())
        .map_err(|e| SetupFailure::new("compiler-redirect", &e))?;

    let sandbox = sandbox
        .publish_session(&session)
        .map_err(|e| SetupFailure::new("session-export", &e))?;

    sandbox.exec_build(&command).map_err(|e| SetupFailure::new("exec", &e))
}

/// PID 1 of the build's PID namespace. Only returns by exec'ing the build.
fn run_build_driver(sandbox: Sandbox<NamespacesReady>, launch: BuildLaunch, status: OwnedFd) -> ! {
    let failure = match drive_build(sandbox, launch) {
        Ok(never) => match never {},
        Err(failure) => failure,
    };

    log::error!("Sandbox setup failed at {}: {}", failure.stage, failure.message);
    report_setup_failure(status, &failure);
    std::process::exit(DRIVER_SETUP_EXIT);
}

/// Enter the build namespaces, fork the build driver, forward its status
fn run_namespace_owner(launch: BuildLaunch, status: OwnedFd) -> ! {
    let sandbox = match Sandbox::<FreshChild>::new().enter_namespaces(&NamespaceIsolation::for_build()) {
        Ok(sandbox) => sandbox,
        Err(e) => {
            if !check_unprivileged_userns_support() {
                log::warn!("This host does not allow unprivileged user namespaces");
            }
            report_setup_failure(status, &SetupFailure::new("namespaces", &e));
            std::process::exit(DRIVER_SETUP_EXIT);
        }
    };

    // SAFETY: the orchestrator is single-threaded; the child only runs the
    // setup sequence and then execs.
    let driver = match unsafe { fork() } {
        Ok(ForkResult::Child) => run_build_driver(sandbox, launch, status),
        Ok(ForkResult::Parent { child }) => child,
        Err(e) => {
            let err = to_process_error("fork(build driver)", e);
            report_setup_failure(status, &SetupFailure::new("fork", &err));
            std::process::exit(DRIVER_SETUP_EXIT);
        }
    };
    drop(status);

    match wait_for_child(driver, "build driver") {
        Ok(outcome) => {
            log::debug!("Build driver {} finished: {:?}", driver, outcome);
            std::process::exit(outcome.code());
        }
        Err(e) => {
            let _ = writeln!(std::io::stderr(), "ccbox: {e}");
            std::process::exit(SETUP_FAILURE_EXIT);
        }
    }
}

fn finish_session(session: SessionContext) {
    if let Err(e) = session.dispose() {
        log::warn!("Session cleanup incomplete: {}", e);
    }
}

/// Supervise `config.command` and write its compilation database.
/// Returns the exit status the orchestrator should exit with.
pub fn run_orchestrator(config: &OrchestratorConfig) -> Result<i32> {
    config.validate()?;

    let signals = SignalRecorder::install().map_err(CaptureError::Process)?;
    // Host IDs must be read before the user namespace hides them
    let remap = IdentityRemap::for_invoking_user();
    let own_exe = own_executable()?;
    let session = SessionContext::create(&config.session_root, config.keep_session)?;

    let (status_read, status_write) = match pipe2(OFlag::O_CLOEXEC) {
        Ok(fds) => fds,
        Err(e) => {
            finish_session(session);
            return Err(to_process_error("pipe2(status)", e));
        }
    };

    let launch = BuildLaunch {
        session: session.clone(),
        remap,
        own_exe,
        command: config.command.clone(),
    };

    // SAFETY: no threads have been started in the orchestrator.
    let owner = match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(status_read);
            run_namespace_owner(launch, status_write)
        }
        Ok(ForkResult::Parent { child }) => child,
        Err(e) => {
            finish_session(session);
            return Err(to_process_error("fork(namespace owner)", e));
        }
    };
    drop(status_write);

    let outcome = wait_for_child(owner, "namespace owner");
    signals.report();
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            finish_session(session);
            return Err(e);
        }
    };

    match read_setup_failure(status_read) {
        Ok(None) => {}
        Ok(Some(failure)) => {
            eprintln!("ccbox: sandbox setup failed at {}: {}", failure.stage, failure.message);
            finish_session(session);
            return Ok(SETUP_FAILURE_EXIT);
        }
        Err(e) => {
            eprintln!("ccbox: unreadable setup status: {}", e);
            finish_session(session);
            return Ok(SETUP_FAILURE_EXIT);
        }
    }

    log::info!("Build finished: {:?}", outcome);

    // Written even for failed builds; the exit status still mirrors the build
    let records = DatabaseAssembler::new(&session).collect();
    if let Err(e) = write_database(&records, &config.output) {
        log::error!("Failed to write {}: {}", config.output.display(), e);
    }

    finish_session(session);
    Ok(outcome.code())
}
