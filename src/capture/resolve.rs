/// Locating the genuine compiler binaries on PATH
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// PATH with the excluded directories (and empty entries) removed, order preserved
pub fn filtered_search_path(path_var: &OsStr, exclude: &[&Path]) -> Option<OsString> {
    let kept: Vec<PathBuf> = std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .filter(|dir| !exclude.iter().any(|excluded| same_dir(dir, excluded)))
        .collect();

    if kept.is_empty() {
        return None;
    }
    std::env::join_paths(kept).ok()
}

/// Canonical location of executable `name` on `path_var`, skipping `exclude`.
/// `None` means the name is not available; callers decide whether that matters.
pub fn resolve_in(name: &str, path_var: &OsStr, exclude: &[&Path], cwd: &Path) -> Option<PathBuf> {
    resolve_excluding(name, path_var, exclude, &[], cwd)
}

/// Like [`resolve_in`], but candidates whose canonical path is one of
/// `exclude_files` are passed over and the search continues down PATH.
pub fn resolve_excluding(
    name: &str,
    path_var: &OsStr,
    exclude_dirs: &[&Path],
    exclude_files: &[&Path],
    cwd: &Path,
) -> Option<PathBuf> {
    let search_path = filtered_search_path(path_var, exclude_dirs)?;
    let candidates = match which::which_in_all(name, Some(search_path), cwd) {
        Ok(candidates) => candidates,
        Err(e) => {
            log::debug!("{} not found on PATH: {}", name, e);
            return None;
        }
    };

    for found in candidates {
        let real = match std::fs::canonicalize(&found) {
            Ok(real) => real,
            Err(e) => {
                log::warn!("Could not canonicalize {}: {}", found.display(), e);
                continue;
            }
        };
        if exclude_files.iter().any(|excluded| *excluded == real.as_path()) {
            log::debug!("Skipping {}: resolves to {}", found.display(), real.display());
            continue;
        }
        return Some(real);
    }

    log::debug!("{} not found on PATH", name);
    None
}

/// Same as [`resolve_in`] against this process's PATH and working directory
pub fn resolve_real_compiler(name: &str, exclude: &[&Path]) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    let cwd = std::env::current_dir().ok()?;
    resolve_in(name, &path_var, exclude, &cwd)
}

/// Canonical path of this executable, as `/proc/self/exe` reports it
pub fn own_executable() -> std::io::Result<PathBuf> {
    std::env::current_exe().and_then(std::fs::canonicalize)
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
    fn test_resolve_follows_symlinks_to_canonical_path() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        make_executable(&bin.join("gcc-13"));
        symlink("gcc-13", bin.join("gcc")).unwrap();

        let path_var = OsString::from(bin.as_os_str());
        let found = resolve_in("gcc", &path_var, &[], dir.path()).unwrap();
        assert_eq!(found, fs::canonicalize(bin.join("gcc-13")).unwrap());
    }

    #[test]
    fn test_resolve_skips_excluded_directory() {
        let dir = tempfile::tempdir().unwrap();
        let own = dir.path().join("own");
        let real = dir.path().join("real");
        fs::create_dir(&own).unwrap();
        fs::create_dir(&real).unwrap();
        make_executable(&own.join("cc"));
        make_executable(&real.join("cc"));

        let path_var = std::env::join_paths([&own, &real]).unwrap();
        let found = resolve_in("cc", &path_var, &[own.as_path()], dir.path()).unwrap();
        assert_eq!(found, fs::canonicalize(real.join("cc")).unwrap());

        let found = resolve_in("cc", &path_var, &[], dir.path()).unwrap();
        assert_eq!(found, fs::canonicalize(own.join("cc")).unwrap());
    }

    #[test]
    fn test_resolve_passes_over_links_to_excluded_file() {
        let dir = tempfile::tempdir().unwrap();
        let own = dir.path().join("own");
        let links = dir.path().join("links");
        let real = dir.path().join("real");
        for d in [&own, &links, &real] {
            fs::create_dir(d).unwrap();
        }
        make_executable(&own.join("ccbox"));
        symlink(own.join("ccbox"), links.join("gcc")).unwrap();
        make_executable(&real.join("gcc"));

        let own_exe = fs::canonicalize(own.join("ccbox")).unwrap();
        let path_var = std::env::join_paths([&links, &real]).unwrap();
        let found = resolve_excluding("gcc", &path_var, &[own.as_path()], &[own_exe.as_path()], dir.path());
        assert_eq!(found, Some(fs::canonicalize(real.join("gcc")).unwrap()));

        let path_var = OsString::from(links.as_os_str());
        assert_eq!(
            resolve_excluding("gcc", &path_var, &[own.as_path()], &[own_exe.as_path()], dir.path()),
            None
        );
    }

    #[test]
    fn test_resolve_missing_compiler_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path_var = OsString::from(dir.path().as_os_str());
        assert_eq!(resolve_in("clang++", &path_var, &[], dir.path()), None);
    }

    #[test]
    fn test_filtered_search_path_drops_empty_entries() {
        let path_var = OsString::from("/usr/local/bin::/usr/bin:");
        let filtered = filtered_search_path(&path_var, &[Path::new("/usr/local/bin")]).unwrap();
        assert_eq!(filtered, OsString::from("/usr/bin"));

        assert_eq!(filtered_search_path(&OsString::from(""), &[]), None);
    }
}
