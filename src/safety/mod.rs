//! Session ownership
//!
//! Ephemeral directories live exactly as long as one orchestrator session.

pub mod session;

pub use session::SessionContext;
