use crate::error::LaunchError;
use std::io;
use std::process::ExitStatus;

/// Exit code reported when a program could not be launched at all.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 1;

/// Outcome of running a command or pipeline.
///
/// Either the process(es) ran to completion, in which case `exit_code`, `stdout` and `stderr`
/// describe the last one, or `launch_error` is set and nothing useful was produced.
/// A nonzero exit code is never treated as an error by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code of the (last) process. Processes killed by a signal report `-signum`.
    pub exit_code: i32,

    /// Everything the (last) process wrote to stdout, lossily decoded, with a single trailing
    /// newline removed.
    pub stdout: String,

    /// Everything the (last) process wrote to stderr, lossily decoded, with a single trailing
    /// newline removed.
    pub stderr: String,

    /// Set when a program could not be started.
    pub launch_error: Option<LaunchError>,

    /// Whether the configured deadline expired and the process(es) were terminated.
    pub timed_out: bool,

    /// Exit codes of every awaited stage, in launch order.
    pub stage_exit_codes: Vec<i32>,
}

impl ExecutionResult {
    pub(crate) fn completed(
        exit_code: i32,
        stdout: &[u8],
        stderr: &[u8],
        stage_exit_codes: Vec<i32>,
        timed_out: bool,
    ) -> Self {
        Self {
            exit_code,
            stdout: decode_trimmed(stdout),
            stderr: decode_trimmed(stderr),
            launch_error: None,
            timed_out,
            stage_exit_codes,
        }
    }

    pub(crate) fn launch_failed(error: LaunchError, stage_exit_codes: Vec<i32>) -> Self {
        Self {
            exit_code: LAUNCH_FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: error.to_string(),
            launch_error: Some(error),
            timed_out: false,
            stage_exit_codes,
        }
    }

    /// `true` if everything launched and the (last) process exited with code 0.
    pub fn success(&self) -> bool {
        self.launch_error.is_none() && self.exit_code == 0
    }

    pub fn launch_failed_with(&self) -> Option<&LaunchError> {
        self.launch_error.as_ref()
    }

    /// Rightmost nonzero stage exit code, or 0 if every stage succeeded.
    ///
    /// This is what a shell with `set -o pipefail` would report. For single commands it equals
    /// `exit_code`.
    pub fn pipefail_exit_code(&self) -> i32 {
        if self.launch_error.is_some() {
            return self.exit_code;
        }
        self.stage_exit_codes
            .iter()
            .rev()
            .copied()
            .find(|code| *code != 0)
            .unwrap_or(0)
    }
}

/// Maps a status to an integer code, signal terminations becoming `-signum`.
pub(crate) fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Like [`exit_code_of`], reporting `-1` when the status could not be obtained.
pub(crate) fn exit_code_of_waited(waited: &io::Result<ExitStatus>) -> i32 {
    match waited {
        Ok(status) => exit_code_of(*status),
        Err(_) => -1,
    }
}

pub(crate) fn decode_trimmed(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
