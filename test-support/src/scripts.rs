//! Fake daemon executables.
//!
//! Each helper writes a small `sh` script into a directory and marks it
//! executable. Scripts record what the supervisor handed them so tests can
//! assert on arguments, environment and launch counts.

#![expect(clippy::expect_used, reason = "simplify test setup")]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write `body` as an executable `sh` script named `name` inside `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// A daemon that appends one line per launch to `launches.log`, records its
/// arguments and `PATH`, then sleeps until terminated.
pub fn long_running_daemon(dir: &Path) -> PathBuf {
    let log = dir.join("launches.log");
    let env = dir.join("env.log");
    write_script(
        dir,
        "plug-my-ai",
        &format!(
            "echo \"$$ $*\" >> '{}'\necho \"$PATH\" > '{}'\nexec sleep 30",
            log.display(),
            env.display()
        ),
    )
}

/// A daemon that records its launch and exits immediately with `code`.
pub fn crashing_daemon(dir: &Path, code: i32) -> PathBuf {
    let log = dir.join("launches.log");
    write_script(
        dir,
        "plug-my-ai",
        &format!("echo \"$$ $*\" >> '{}'\nexit {code}", log.display()),
    )
}

/// A file at the daemon path without any execute bit.
pub fn non_executable_daemon(dir: &Path) -> PathBuf {
    let path = dir.join("plug-my-ai");
    fs::write(&path, "#!/bin/sh\nexit 0\n").expect("write file");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod file");
    path
}

/// Number of launches recorded by a fake daemon in `dir`.
pub fn launch_count(dir: &Path) -> usize {
    fs::read_to_string(dir.join("launches.log"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

/// Lines recorded in `launches.log` by a fake daemon in `dir`.
pub fn launches(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("launches.log"))
        .map(|s| s.lines().map(str::to_owned).collect())
        .unwrap_or_default()
}

/// `PATH` seen by the most recent launch of a fake daemon in `dir`.
pub fn recorded_path(dir: &Path) -> Option<String> {
    fs::read_to_string(dir.join("env.log"))
        .ok()
        .map(|s| s.trim_end().to_owned())
}

/// A `launchctl` stand-in that appends its arguments to `launchctl.log` and
/// succeeds.
pub fn fake_launchctl(dir: &Path) -> PathBuf {
    let log = dir.join("launchctl.log");
    write_script(
        dir,
        "launchctl",
        &format!("echo \"$*\" >> '{}'", log.display()),
    )
}

/// A `launchctl` stand-in that records its arguments and then fails.
pub fn failing_launchctl(dir: &Path) -> PathBuf {
    let log = dir.join("launchctl.log");
    write_script(
        dir,
        "launchctl",
        &format!(
            "echo \"$*\" >> '{}'\necho 'Bootstrap failed: 5: Input/output error' >&2\nexit 5",
            log.display()
        ),
    )
}

/// Invocations recorded by a fake `launchctl` in `dir`, one per line.
pub fn launchctl_calls(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("launchctl.log"))
        .map(|s| s.lines().map(str::to_owned).collect())
        .unwrap_or_default()
}
