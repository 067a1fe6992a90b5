use log::info;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
/// Async-safe signal recording for supervising processes
///
/// The orchestrator and namespace owner must outlive an interrupted build so
/// the wait returns the build's status and the database still gets written.
/// The handler only stores the signal number; `SA_RESTART` keeps `waitpid`
/// running. Handlers are reset to default by exec, so the build itself keeps
/// normal signal behavior.
use std::sync::atomic::{AtomicI32, Ordering};

/// Last signal received (0 if none)
static SIGNAL_RECEIVED: AtomicI32 = AtomicI32::new(0);

const RECORDED_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP];

extern "C" fn record_signal(signal: libc::c_int) {
    SIGNAL_RECEIVED.store(signal, Ordering::SeqCst);
}

/// Handle proving the recording handlers are installed
pub struct SignalRecorder;

impl SignalRecorder {
    /// Install handlers for SIGINT, SIGTERM, SIGHUP.
    /// Must run before any fork so both supervising levels inherit them.
    pub fn install() -> Result<Self, String> {
        let action = SigAction::new(
            SigHandler::Handler(record_signal),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );

        for sig in RECORDED_SIGNALS {
            // SAFETY: the handler only performs an atomic store.
            unsafe { signal::sigaction(sig, &action) }
                .map_err(|e| format!("Failed to install {} handler: {}", sig, e))?;
        }

        log::debug!("Signal recorder installed (SIGINT, SIGTERM, SIGHUP)");
        Ok(Self)
    }

    /// Signal received while supervising, if any
    pub fn received(&self) -> Option<Signal> {
        match SIGNAL_RECEIVED.load(Ordering::SeqCst) {
            0 => None,
            raw => Signal::try_from(raw).ok(),
        }
    }

    /// Log a signal that arrived during supervision
    pub fn report(&self) {
        if let Some(sig) = self.received() {
            info!("Received {} while supervising the build; it was left to the build to handle", sig);
        }
    }
}
