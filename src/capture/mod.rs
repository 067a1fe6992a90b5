//! Invocation capture
//!
//! - [`sequencer`]: race-free record numbering under flock
//! - [`record`]: record format, source detection, persistence
//! - [`resolve`]: genuine compiler lookup on PATH
//! - [`alias`]: other names of a redirected compiler binary
//! - [`shim`]: the compiler shim role
//! - [`assembler`]: compilation database assembly

pub mod alias;
pub mod assembler;
pub mod record;
pub mod resolve;
pub mod sequencer;
pub mod shim;

pub use alias::CompilerAlias;
pub use assembler::{write_database, DatabaseAssembler};
pub use record::{record, CompileCommand, InvocationRecord};
pub use sequencer::{LogSequencer, RecordSlot};
