//! Compiler shim role, driven through the built binary
//!
//! The sandbox is simulated: the shim is a symlink named `gcc`, and the
//! shim-bin directory holds a copy of a fake compiler instead of a bind mount.

use ccbox::capture::alias::write_redirect_table;
use ccbox::capture::{write_database, CompileCommand, DatabaseAssembler};
use ccbox::config::types::CompilerRedirect;
use ccbox::safety::SessionContext;
use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

const FAKE_GCC: &str = "#!/bin/sh\necho \"fake-gcc $*\"\nexit ${FAKE_GCC_EXIT:-0}\n";

struct ShimFixture {
    _root: tempfile::TempDir,
    shim: PathBuf,
    tools: PathBuf,
    log_dir: PathBuf,
    bin_dir: PathBuf,
    src: PathBuf,
}

fn write_executable(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

impl ShimFixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(root.path()).unwrap();
        let dirs: Vec<PathBuf> = ["shim", "tools", "logs", "bin", "src"]
            .iter()
            .map(|name| {
                let dir = base.join(name);
                fs::create_dir(&dir).unwrap();
                dir
            })
            .collect();

        let shim = dirs[0].join("gcc");
        symlink(env!("CARGO_BIN_EXE_ccbox"), &shim).unwrap();
        write_executable(&dirs[1].join("gcc"), FAKE_GCC);
        write_executable(&dirs[3].join("gcc"), FAKE_GCC);
        fs::write(dirs[4].join("foo.c"), "int main(void) { return 0; }\n").unwrap();

        Self {
            _root: root,
            shim,
            tools: dirs[1].clone(),
            log_dir: dirs[2].clone(),
            bin_dir: dirs[3].clone(),
            src: dirs[4].clone(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        self.command_for(&self.shim, args)
    }

    fn command_for(&self, program: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.src)
            .env("PATH", &self.tools)
            .env("CC_LOGDIR", &self.log_dir)
            .env("CC_BINDIR", &self.bin_dir)
            .env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command(args).output().unwrap()
    }

    /// Redirect table as the build driver would leave it
    fn publish_redirect(&self, name: &str, real_path: &Path) {
        let session = SessionContext::attach(self.log_dir.clone(), self.bin_dir.clone());
        let redirect = CompilerRedirect {
            name: name.to_string(),
            real_path: real_path.to_path_buf(),
        };
        write_redirect_table(&session, &[redirect]).unwrap();
    }

    fn record(&self, number: u32) -> String {
        fs::read_to_string(self.log_dir.join(format!("exec.log.{}", number))).unwrap()
    }
}

#[test]
fn test_shim_records_and_runs_real_compiler() {
    let fx = ShimFixture::new();
    let out = fx.run(&["-c", "foo.c", "-o", "foo.o"]);

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "fake-gcc -c foo.c -o foo.o\n");

    let real_gcc = fx.tools.join("gcc");
    let expected = format!(
        "CWD: {}\nFILE: foo.c\nCMD: {} -c foo.c -o foo.o\n",
        fx.src.display(),
        real_gcc.display()
    );
    assert_eq!(fx.record(1), expected);
}

#[test]
fn test_shim_exit_status_is_the_compilers() {
    let fx = ShimFixture::new();
    let out = fx.command(&["-c", "foo.c"]).env("FAKE_GCC_EXIT", "3").output().unwrap();

    assert_eq!(out.status.code(), Some(3));
    assert!(fx.log_dir.join("exec.log.1").is_file());
}

#[test]
fn test_version_query_falls_back_to_working_directory() {
    let fx = ShimFixture::new();
    let out = fx.run(&["--version"]);
    assert!(out.status.success());

    let record = fx.record(1);
    assert!(record.contains(&format!("FILE: {}\n", fx.src.display())), "{}", record);
}

#[test]
fn test_missing_session_environment_is_fatal() {
    let fx = ShimFixture::new();
    let out = fx.command(&["-c", "foo.c"]).env_remove("CC_LOGDIR").output().unwrap();

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("CC_LOGDIR"));
    assert!(out.stdout.is_empty(), "real compiler must not run");
    assert_eq!(fs::read_dir(&fx.log_dir).unwrap().count(), 0);
}

#[test]
fn test_missing_real_compiler_is_fatal() {
    let fx = ShimFixture::new();
    let empty = fx.src.join("empty-path");
    fs::create_dir(&empty).unwrap();

    let out = fx.command(&["-c", "foo.c"]).env("PATH", &empty).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(!fx.log_dir.join("exec.log.1").exists());
}

#[test]
fn test_sequential_invocations_assemble_in_order() {
    let fx = ShimFixture::new();
    fs::write(fx.src.join("bar.c"), "int bar;\n").unwrap();

    for args in [&["-c", "foo.c"][..], &["-c", "bar.c"][..], &["--version"][..]] {
        assert!(fx.run(args).status.success());
    }

    let records = DatabaseAssembler::for_log_dir(&fx.log_dir).collect();
    assert_eq!(records.len(), 3);

    let output = fx.src.join("compile_commands.json");
    write_database(&records, &output).unwrap();
    let entries: Vec<CompileCommand> =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();

    let files: Vec<&str> = entries.iter().map(|e| e.file.as_str()).collect();
    assert_eq!(files, vec!["foo.c", "bar.c", fx.src.to_str().unwrap()]);
    for entry in &entries {
        assert_eq!(entry.directory, fx.src.to_str().unwrap());
        assert!(entry.command.starts_with(fx.tools.join("gcc").to_str().unwrap()));
    }
}

#[test]
fn test_parallel_shims_get_distinct_records() {
    let fx = ShimFixture::new();
    let children: Vec<_> = (0..8)
        .map(|_| fx.command(&["-c", "foo.c"]).stdout(Stdio::null()).spawn().unwrap())
        .collect();
    for child in children {
        assert!(child.wait_with_output().unwrap().status.success());
    }

    for n in 1..=8 {
        assert!(fx.log_dir.join(format!("exec.log.{}", n)).is_file(), "record {} missing", n);
    }
    assert!(!fx.log_dir.join("exec.log.9").exists());
}

#[test]
fn test_other_name_of_redirected_binary_runs_as_its_compiler() {
    let fx = ShimFixture::new();
    let ccbox = fs::canonicalize(env!("CARGO_BIN_EXE_ccbox")).unwrap();
    let alias = fx.shim.with_file_name("x86_64-linux-gnu-gcc-12");
    symlink(&ccbox, &alias).unwrap();
    // Inside the sandbox ccbox sits on the genuine binary's path
    fx.publish_redirect("gcc", &ccbox);

    let out = fx.command_for(&alias, &["-c", "foo.c"]).output().unwrap();

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "fake-gcc -c foo.c\n");
    let expected = format!(
        "CWD: {}\nFILE: foo.c\nCMD: {} -c foo.c\n",
        fx.src.display(),
        ccbox.display()
    );
    assert_eq!(fx.record(1), expected);
}

#[test]
fn test_unmatched_name_in_session_stays_orchestrator() {
    let fx = ShimFixture::new();
    fx.publish_redirect("gcc", &fx.tools.join("gcc"));

    let out = fx
        .command_for(Path::new(env!("CARGO_BIN_EXE_ccbox")), &[])
        .output()
        .unwrap();

    // A nested ccbox without a build command is a usage error, not a shim
    assert_eq!(out.status.code(), Some(2));
    assert!(out.stdout.is_empty());
    assert!(!fx.log_dir.join("exec.log.1").exists());
}
