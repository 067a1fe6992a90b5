//! Execution control
//!
//! Process topology, the type-state setup chain of the build driver, and
//! process image replacement.

pub mod preexec;
pub mod redirect;
pub mod supervisor;

pub use redirect::NameRedirect;
pub use supervisor::run_orchestrator;
