use crate::capture::alias::write_redirect_table;
use crate::capture::resolve::resolve_excluding;
use crate::config::constants::KNOWN_COMPILERS;
use crate::config::types::{CaptureError, CompilerRedirect, Infallible, Result};
use crate::exec::redirect::exec_command;
/// Build driver setup sequence
///
/// The sequence is FIXED:
/// 1. namespace setup (mount + user + PID), done by the namespace owner
/// 2. mount propagation hardening: `/` and `/proc` to MS_PRIVATE | MS_REC
/// 3. identity remap: setgroups deny, uid_map, gid_map
/// 4. compiler redirection: genuine compilers into the shim-bin directory,
///    then this executable over each genuine compiler
/// 5. session export: environment plus the redirect table
/// 6. exec the build
use crate::kernel::credentials::IdentityRemap;
use crate::kernel::mount::{bind_mount_file, harden_mount_propagation};
use crate::kernel::namespace::NamespaceIsolation;
use crate::safety::SessionContext;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::marker::PhantomData;
use std::path::Path;

/// Resolve every known compiler on `path_var`, ignoring `own_exe`'s directory
/// and any link that leads back to `own_exe`.
/// Names that are not installed are skipped.
pub fn plan_compiler_redirects(path_var: &OsStr, own_exe: &Path, cwd: &Path) -> Result<Vec<CompilerRedirect>> {
    let own_dir = own_exe.parent().ok_or_else(|| {
        CaptureError::Filesystem(format!("{} has no parent directory", own_exe.display()))
    })?;

    let mut plan = Vec::with_capacity(KNOWN_COMPILERS.len());
    for name in KNOWN_COMPILERS {
        match resolve_excluding(name, path_var, &[own_dir], &[own_exe], cwd) {
            Some(real_path) => plan.push(CompilerRedirect {
                name: name.to_string(),
                real_path,
            }),
            None => log::info!("{} not found on PATH; it will not be intercepted", name),
        }
    }
    Ok(plan)
}

/// Genuine binaries to cover with this executable, each once.
/// `cc` and `gcc` commonly resolve to the same file.
pub fn distinct_real_paths(plan: &[CompilerRedirect]) -> BTreeSet<&Path> {
    plan.iter().map(|r| r.real_path.as_path()).collect()
}

// State progression, each step consuming the previous one:
//
// FreshChild -> NamespacesReady -> MountsPrivate -> IdentityMapped ->
// CompilersRedirected -> ExecReady
//
// Only Sandbox<ExecReady> can exec the build.

/// Type-state marker: fresh child process, no setup done yet
pub struct FreshChild;

/// Type-state marker: mount, user and PID namespaces entered
pub struct NamespacesReady;

/// Type-state marker: mount propagation has been hardened
pub struct MountsPrivate;

/// Type-state marker: host user mapped to root in the user namespace
pub struct IdentityMapped;

/// Type-state marker: compiler bind mounts in place
pub struct CompilersRedirected;

/// Type-state marker: session exported, ready for exec
pub struct ExecReady;

pub struct Sandbox<S> {
    redirects: Vec<CompilerRedirect>,
    _state: PhantomData<S>,
}

impl<S> Sandbox<S> {
    fn advance<T>(self) -> Sandbox<T> {
        Sandbox {
            redirects: self.redirects,
            _state: PhantomData,
        }
    }
}

impl Default for Sandbox<FreshChild> {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox<FreshChild> {
    pub fn new() -> Self {
        Self {
            redirects: Vec::new(),
            _state: PhantomData,
        }
    }

    /// Unshare the build namespaces.
    /// The PID namespace applies to children only, so the build driver must
    /// be forked after this.
    pub fn enter_namespaces(self, isolation: &NamespaceIsolation) -> Result<Sandbox<NamespacesReady>> {
        isolation.apply_isolation()?;
        Ok(self.advance())
    }
}

impl Sandbox<NamespacesReady> {
    /// Must precede any bind mount, or the mounts propagate to the host
    pub fn harden_mount_propagation(self) -> Result<Sandbox<MountsPrivate>> {
        harden_mount_propagation()?;
        Ok(self.advance())
    }
}

impl Sandbox<MountsPrivate> {
    pub fn remap_identity(self, remap: IdentityRemap) -> Result<Sandbox<IdentityMapped>> {
        remap.apply()?;
        Ok(self.advance())
    }
}

impl Sandbox<IdentityMapped> {
    /// Bind each genuine compiler to `<bin_dir>/<name>`, then bind `own_exe`
    /// over every genuine compiler so the build runs shims instead.
    pub fn redirect_compilers(mut self, own_exe: &Path, bin_dir: &Path) -> Result<Sandbox<CompilersRedirected>> {
        let path_var = std::env::var_os("PATH").unwrap_or_default();
        let cwd = std::env::current_dir()?;

        let plan = plan_compiler_redirects(&path_var, own_exe, &cwd)?;
        if plan.is_empty() {
            log::warn!("No known compiler found on PATH; nothing will be captured");
        }

        for redirect in &plan {
            bind_mount_file(&redirect.real_path, &bin_dir.join(&redirect.name))?;
        }
        for real_path in distinct_real_paths(&plan) {
            bind_mount_file(own_exe, real_path)?;
        }

        self.redirects = plan;
        Ok(self.advance())
    }
}

impl Sandbox<CompilersRedirected> {
    /// Hand the session to the shims: the redirect table goes into the log
    /// directory, the directory paths into the environment
    pub fn publish_session(self, session: &SessionContext) -> Result<Sandbox<ExecReady>> {
        write_redirect_table(session, &self.redirects)?;
        session.export_to_env();
        Ok(self.advance())
    }
}

impl Sandbox<ExecReady> {
    /// Replace the build driver with the supervised build
    pub fn exec_build(self, command: &[String]) -> Result<Infallible> {
        exec_command(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::{symlink, PermissionsExt};

    fn make_executable(path: &Path) {
        fs::write(path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_plan_skips_own_directory_and_missing_names() {
        let own = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        for name in ["gcc", "cc", "clang"] {
            make_executable(&own.path().join(name));
        }
        make_executable(&tools.path().join("gcc"));

        let path_var = std::env::join_paths([own.path(), tools.path()]).unwrap();
        let own_exe = own.path().join("ccbox");
        let plan = plan_compiler_redirects(&path_var, &own_exe, tools.path()).unwrap();

        let real_gcc = fs::canonicalize(tools.path().join("gcc")).unwrap();
        assert_eq!(
            plan,
            vec![CompilerRedirect {
                name: "gcc".to_string(),
                real_path: real_gcc
            }]
        );
    }

    #[test]
    fn test_aliases_share_one_real_path() {
        let own = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        make_executable(&tools.path().join("gcc-13"));
        symlink(tools.path().join("gcc-13"), tools.path().join("gcc")).unwrap();
        symlink(tools.path().join("gcc-13"), tools.path().join("cc")).unwrap();

        let own_exe = own.path().join("ccbox");
        let plan = plan_compiler_redirects(tools.path().as_os_str(), &own_exe, tools.path()).unwrap();
        let names: Vec<_> = plan.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["gcc", "cc"]);

        let distinct = distinct_real_paths(&plan);
        assert_eq!(distinct.len(), 1);
        assert!(distinct.iter().all(|p| p.ends_with("gcc-13")));
    }

    #[test]
    fn test_plan_ignores_links_back_to_own_executable() {
        let base = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(base.path()).unwrap();
        for dir in ["own", "links", "tools"] {
            fs::create_dir(base.join(dir)).unwrap();
        }
        let own_exe = base.join("own/ccbox");
        make_executable(&own_exe);
        symlink(&own_exe, base.join("links/gcc")).unwrap();
        make_executable(&base.join("tools/gcc"));

        let path_var = std::env::join_paths([base.join("links"), base.join("tools")]).unwrap();
        let plan = plan_compiler_redirects(&path_var, &own_exe, &base).unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].name, "gcc");
        assert_eq!(plan[0].real_path, base.join("tools/gcc"));
        assert!(distinct_real_paths(&plan).iter().all(|p| *p != own_exe.as_path()));
    }

    #[test]
    fn test_fresh_sandbox_has_no_redirects() {
        let sandbox = Sandbox::<FreshChild>::new();
        assert!(sandbox.redirects.is_empty());

        // Sandbox::<FreshChild>::new().exec_build(..) does not compile:
        // only Sandbox<ExecReady> exposes exec.
    }

    #[test]
    fn test_empty_isolation_still_advances() {
        let sandbox = Sandbox::<FreshChild>::new()
            .enter_namespaces(&NamespaceIsolation::new(false, false, false))
            .unwrap();
        assert!(sandbox.redirects.is_empty());
    }
}
