//! ccbox: compilation database capture through compiler interception
//!
//! One executable, two roles picked from argv[0]. As `ccbox <command>` it
//! supervises a build inside private mount, user and PID namespaces where
//! every known compiler on PATH has been bind-mounted over by ccbox itself.
//! Under a compiler name it is the shim: it records the call and then execs
//! the genuine compiler. Any other name for a redirected compiler binary is
//! recognised through the session's redirect table and treated the same.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::namespace`]: mount, user and PID namespace entry
//! - [`kernel::credentials`]: one-shot UID/GID remap to root
//! - [`kernel::mount`]: propagation hardening and file bind mounts
//! - [`kernel::signal`]: flag-only signal recording for supervisors
//!
//! ## Execution Control ([`exec`])
//! - [`exec::supervisor`]: orchestrator, namespace owner, build driver
//! - [`exec::preexec`]: type-state enforced setup ordering
//! - [`exec::redirect`]: process image replacement
//!
//! ## Capture ([`capture`])
//! - [`capture::sequencer`]: flock-guarded record numbering
//! - [`capture::record`]: record format and source detection
//! - [`capture::alias`]: redirect table and alias detection
//! - [`capture::shim`]: the compiler shim role
//! - [`capture::assembler`]: `compile_commands.json` assembly
//!
//! ## Session ([`safety`])
//! - [`safety::session`]: session directories and their disposal
//!
//! # Design Principles
//!
//! 1. **Types prevent errors** - the setup sequence cannot be reordered
//! 2. **Safety without Drop** - sessions are disposed explicitly
//! 3. **Minimal unsafe** - fork and sigaction only, in thin wrappers

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Invocation capture and database assembly
pub mod capture;

// Session lifecycle
pub mod safety;

// Configuration & shared types
pub mod config;

// Role dispatch
pub mod cli;
