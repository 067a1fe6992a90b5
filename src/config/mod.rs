//! Configuration
//!
//! Fixed session layout, the known compiler set, and error types.

pub mod constants;
pub mod types;
