//! Thin wrappers around Linux kernel primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Dependency direction: signal -> namespace -> credentials -> mount

pub mod credentials;
pub mod mount;
pub mod namespace;
pub mod signal;
