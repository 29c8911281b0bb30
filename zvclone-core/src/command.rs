// Standard library
use std::ffi::OsStr;

// External crates
use crate::error::{Result, ZvError};
use duct::cmd;
use tracing::debug;
use which::which;

/// Checks if a command-line tool is available in the system's PATH.
pub fn is_tool_installed(tool_name: &str) -> bool {
    which(tool_name).is_ok()
}

fn render<A: AsRef<OsStr>>(command: &str, args: &[A]) -> String {
    format!(
        "{} {}",
        command,
        args.iter()
            .map(|a| a.as_ref().to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    )
}

/// Run a command and capture its trimmed stdout.
///
/// A non-zero exit status is an error carrying the command line and
/// whatever the command wrote to stderr.
pub fn run_capture<A: AsRef<OsStr>>(command: &str, args: &[A]) -> Result<String> {
    let full_command = render(command, args);
    debug!("running: {}", full_command);

    let output = cmd(command, args)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .map_err(|e| ZvError::Command(format!("failed to start '{}': {}", full_command, e)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ZvError::Command(format!(
            "'{}' exited with {:?}: {}",
            full_command,
            output.status.code(),
            stderr.trim()
        )))
    }
}

/// Run a probe command where a non-zero exit is an expected outcome
/// (e.g. querying a dataset that may not exist).
///
/// Returns `Ok(Some(stdout))` on success, `Ok(None)` on non-zero exit, and
/// an error only when the command could not be started at all.
pub fn probe<A: AsRef<OsStr>>(command: &str, args: &[A]) -> Result<Option<(String, String)>> {
    let full_command = render(command, args);
    debug!("probing: {}", full_command);

    let output = cmd(command, args)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .map_err(|e| ZvError::Command(format!("failed to start '{}': {}", full_command, e)))?;

    if output.status.success() {
        Ok(Some((
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )))
    } else {
        Ok(None)
    }
}

/// Run a probe command, returning stdout on success and stderr on failure.
///
/// Used where the failure text matters (e.g. distinguishing "dataset does
/// not exist" from a real storage error).
pub fn probe_with_stderr<A: AsRef<OsStr>>(
    command: &str,
    args: &[A],
) -> Result<std::result::Result<String, String>> {
    let full_command = render(command, args);
    debug!("probing: {}", full_command);

    let output = cmd(command, args)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .map_err(|e| ZvError::Command(format!("failed to start '{}': {}", full_command, e)))?;

    if output.status.success() {
        Ok(Ok(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    } else {
        Ok(Err(String::from_utf8_lossy(&output.stderr)
            .trim()
            .to_string()))
    }
}
