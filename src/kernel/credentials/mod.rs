//! UID/GID mapping for the build's user namespace.
//!
//! setgroups MUST be denied before gid_map is written.

mod remap;

pub use remap::{IdMapping, IdentityRemap};
