//! Process execution for modship.
//!
//! Runs the external build tool (the Gradle wrapper by default) with captured
//! output, an explicit working directory and extra environment variables.
//!
//! # Example
//!
//! ```ignore
//! use modship_process::run_in;
//! use std::path::Path;
//!
//! let out = run_in(Path::new("."), "./gradlew", &["build"], &[])?;
//! if !out.success() {
//!     eprintln!("{}", out.tail(40));
//! }
//! ```

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// What a finished child process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    fn capture(output: Output, elapsed: Duration) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout then stderr. Gradle prints its failure summary on stderr after
    /// the task log, so this reads in the order a terminal would show it.
    pub fn combined(&self) -> String {
        match (self.stdout.trim_end(), self.stderr.trim_end()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }

    /// The last `n` lines of [`ProcessOutput::combined`].
    pub fn tail(&self, n: usize) -> String {
        tail_lines(&self.combined(), n)
    }
}

/// Keep the last `n` lines of `s`.
pub fn tail_lines(s: &str, n: usize) -> String {
    let lines = s.trim_end().lines().collect::<Vec<_>>();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Run `program args..` with `dir` as working directory and `env` added to
/// the inherited environment. A non-zero exit is not an error; failing to
/// spawn is.
pub fn run_in(
    dir: &Path,
    program: &str,
    args: &[&str],
    env: &[(String, String)],
) -> Result<ProcessOutput> {
    let started = Instant::now();
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .output()
        .with_context(|| format!("failed to start `{program}` in {}", dir.display()))?;

    Ok(ProcessOutput::capture(output, started.elapsed()))
}

/// `chmod +x` on a checked-out wrapper script. Checkouts from some CI
/// providers drop the executable bit on `gradlew`.
///
/// Silently does nothing when the file is missing; running it reports that.
pub fn ensure_executable(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let Ok(meta) = std::fs::metadata(path) else {
            return;
        };
        let mut perms = meta.permissions();
        if perms.mode() & 0o111 != 0o111 {
            perms.set_mode(perms.mode() | 0o755);
            let _ = std::fs::set_permissions(path, perms);
        }
    }

    #[cfg(not(unix))]
    let _ = path;
}

/// Whether `program` can be started from `dir`. Paths with a separator are
/// resolved against `dir`; bare names are looked up on `PATH`.
pub fn command_exists_in(program: &str, dir: &Path) -> bool {
    if program.contains(['/', '\\']) {
        dir.join(program).is_file()
    } else {
        which(program).is_some()
    }
}

pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: Option<i32>, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn only_exit_zero_is_success() {
        assert!(output(Some(0), "BUILD SUCCESSFUL", "").success());
        assert!(!output(Some(1), "", "").success());
        assert!(!output(None, "", "").success());
    }

    #[test]
    fn combined_puts_stderr_last() {
        assert_eq!(output(Some(1), "out\n", "err\n").combined(), "out\nerr");
        assert_eq!(output(Some(1), "", "err\n").combined(), "err");
        assert_eq!(output(Some(0), "out\n", "").combined(), "out");
    }

    #[test]
    fn tail_lines_keeps_last_lines() {
        assert_eq!(tail_lines("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail_lines("a\nb\n", 5), "a\nb");
        assert_eq!(tail_lines("", 3), "");
    }

    #[test]
    fn tail_spans_both_streams() {
        let out = output(Some(1), "> Task :compileJava\n", "FAILURE\n* What went wrong:\n");
        assert_eq!(out.tail(2), "FAILURE\n* What went wrong:");
    }

    #[test]
    fn unknown_programs_do_not_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!command_exists_in("modship-no-such-tool-7f3a", dir.path()));
        assert!(!command_exists_in("./gradlew", dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn runs_in_dir_with_env() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = vec![("MODSHIP_TEST_VALUE".to_string(), "42".to_string())];
        let out = run_in(
            dir.path(),
            "sh",
            &["-c", "echo \"$MODSHIP_TEST_VALUE\"; pwd"],
            &env,
        )
        .expect("run");

        assert!(out.success());
        assert!(out.stdout.starts_with("42\n"));
        let reported = out.stdout.lines().nth(1).expect("pwd line");
        assert_eq!(
            std::fs::canonicalize(reported).expect("canonical"),
            std::fs::canonicalize(dir.path()).expect("canonical")
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_captured_not_raised() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = run_in(dir.path(), "sh", &["-c", "echo boom >&2; exit 7"], &[]).expect("run");
        assert!(!out.success());
        assert_eq!(out.exit_code, Some(7));
        assert_eq!(out.stderr.trim(), "boom");
    }

    #[cfg(unix)]
    #[test]
    fn ensure_executable_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("gradlew");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").expect("write");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).expect("chmod");

        ensure_executable(&script);

        let mode = std::fs::metadata(&script).expect("meta").permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        assert!(command_exists_in("./gradlew", dir.path()));
    }

    #[test]
    fn spawn_failure_names_the_program() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = run_in(dir.path(), "modship-no-such-tool-7f3a", &[], &[])
            .expect_err("spawn should fail");
        assert!(err.to_string().contains("failed to start `modship-no-such-tool-7f3a`"));
    }
}
