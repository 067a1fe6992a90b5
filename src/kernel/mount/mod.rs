//! Mount management inside the build's mount namespace
//!
//! Propagation hardening and the file bind mounts that redirect compilers.

pub mod bind;

pub use bind::{bind_mount_file, harden_mount_propagation};
