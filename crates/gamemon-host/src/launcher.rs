//! Monitor launcher: locate the monitor executable and start it detached.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Environment variable the monitor reads its handshake key from
pub const AUTH_KEY_ENV: &str = "GAMEMON_AUTH_KEY";

/// File name of the monitor binary on this platform
pub fn monitor_file_name() -> String {
    format!("gamemon{}", std::env::consts::EXE_SUFFIX)
}

/// Default monitor location: next to the running host executable.
pub fn default_monitor_path(host_exe: &Path) -> anyhow::Result<PathBuf> {
    let dir = host_exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Host path has no parent: {}", host_exe.display()))?;
    Ok(dir.join(monitor_file_name()))
}

/// Resolve the monitor path from an explicit override or the host location
pub fn resolve_monitor_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => default_monitor_path(&std::env::current_exe()?),
    }
}

/// Build the command that starts the monitor.
///
/// The monitor must not inherit the host's stdio: stdout carries frames for
/// the browser. The key goes through the environment so it never shows up
/// in the child's command line.
pub fn monitor_command(exe: &Path, args: &[String], auth_key: &str) -> Command {
    let mut command = Command::new(exe);
    command
        .args(args)
        .env(AUTH_KEY_ENV, auth_key)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    detach(&mut command);
    command
}

#[cfg(target_os = "windows")]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;

    const DETACHED_PROCESS: u32 = 0x0000_0008;
    command.creation_flags(DETACHED_PROCESS);
}

#[cfg(not(target_os = "windows"))]
fn detach(_command: &mut Command) {}

/// Launch the monitor and return its process ID.
///
/// The child is not waited on; it outlives the host if the browser closes
/// the pipe first.
pub fn launch_monitor(exe: &Path, args: &[String], auth_key: &str) -> anyhow::Result<u32> {
    if !exe.exists() {
        anyhow::bail!("Monitor executable not found at: {}", exe.display());
    }

    let child = monitor_command(exe, args, auth_key)
        .spawn()
        .map_err(|e| anyhow::anyhow!("Failed to launch monitor: {e}"))?;

    Ok(child.id())
}
