//! Graceful-then-forceful shutdown of child processes.

use crate::error::TerminationError;
use std::borrow::Cow;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;

/// A polite request to stop, sent before resorting to a kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    /// `SIGINT` on unix, `CTRL_C_EVENT` on windows.
    Interrupt,
    /// `SIGTERM` on unix, `CTRL_BREAK_EVENT` on windows.
    Terminate,
}

impl Shutdown {
    fn as_str(self) -> &'static str {
        match self {
            Shutdown::Interrupt => "interrupt",
            Shutdown::Terminate => "terminate",
        }
    }
}

fn send(child: &Child, shutdown: Shutdown) -> io::Result<()> {
    let Some(pid) = child.id() else {
        // Returns `None` if child was already "polled to completion".
        return Ok(());
    };

    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let signal = match shutdown {
            Shutdown::Interrupt => Signal::SIGINT,
            Shutdown::Terminate => Signal::SIGTERM,
        };
        signal::kill(Pid::from_raw(pid as i32), signal).map_err(io::Error::other)
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::{CTRL_BREAK_EVENT, CTRL_C_EVENT};
        use windows_sys::Win32::System::Console::GenerateConsoleCtrlEvent;

        let event = match shutdown {
            Shutdown::Interrupt => CTRL_C_EVENT,
            Shutdown::Terminate => CTRL_BREAK_EVENT,
        };
        let success = unsafe { GenerateConsoleCtrlEvent(event, pid) };
        if success == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(all(not(windows), not(unix)))]
    {
        let _ = pid;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("Cannot send {} to process, platform is unsupported", shutdown.as_str()),
        ))
    }
}

async fn wait_at_most(child: &mut Child, timeout: Duration) -> io::Result<ExitStatus> {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(exit_status) => exit_status,
        Err(elapsed) => Err(io::Error::new(io::ErrorKind::TimedOut, elapsed)),
    }
}

async fn request(
    child: &mut Child,
    shutdown: Shutdown,
    timeout: Duration,
) -> io::Result<ExitStatus> {
    send(child, shutdown)?;
    wait_at_most(child, timeout).await
}

/// Stops `child`, escalating from interrupt to terminate to kill.
///
/// Each polite request is given its timeout to take effect. If the process already exited, its
/// status is returned right away.
pub(crate) async fn terminate(
    child: &mut Child,
    process_name: &Cow<'static, str>,
    interrupt_timeout: Duration,
    terminate_timeout: Duration,
) -> Result<ExitStatus, TerminationError> {
    if let Ok(Some(exit_status)) = child.try_wait() {
        return Ok(exit_status);
    }

    let interrupt_error = match request(child, Shutdown::Interrupt, interrupt_timeout).await {
        Ok(exit_status) => return Ok(exit_status),
        Err(err) => err,
    };
    tracing::debug!(
        process = %process_name,
        signal = Shutdown::Interrupt.as_str(),
        error = %interrupt_error,
        "Process did not stop, escalating"
    );

    let terminate_error = match request(child, Shutdown::Terminate, terminate_timeout).await {
        Ok(exit_status) => return Ok(exit_status),
        Err(err) => err,
    };
    tracing::warn!(
        process = %process_name,
        signal = Shutdown::Terminate.as_str(),
        error = %terminate_error,
        "Graceful shutdown failed, attempting forceful termination"
    );

    match child.kill().await {
        Ok(()) => child.wait().await.map_err(|kill_error| {
            TerminationError::TerminationFailed {
                process_name: process_name.clone(),
                interrupt_error: interrupt_error.to_string(),
                terminate_error: terminate_error.to_string(),
                kill_error,
            }
        }),
        Err(kill_error) => Err(TerminationError::TerminationFailed {
            process_name: process_name.clone(),
            interrupt_error: interrupt_error.to_string(),
            terminate_error: terminate_error.to_string(),
            kill_error,
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::output::exit_code_of;
    use assertr::prelude::*;
    use tokio::process::Command;

    #[tokio::test]
    async fn interrupt_stops_a_sleeping_process() {
        let mut child = Command::new("sleep").arg("1000").spawn().unwrap();

        let exit_status = terminate(
            &mut child,
            &Cow::Borrowed("sleep"),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        // Terminating a process with a signal results in no code being emitted (on linux).
        assert_that(exit_status.code()).is_none();
        assert_that(exit_code_of(exit_status)).is_equal_to(-2);
    }

    #[tokio::test]
    async fn escalates_when_interrupt_is_ignored() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("trap '' INT; sleep 5")
            .spawn()
            .unwrap();
        // Give the shell a moment to install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let exit_status = terminate(
            &mut child,
            &Cow::Borrowed("sh"),
            Duration::from_millis(200),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_that(exit_status.success()).is_false();
        assert_that(exit_code_of(exit_status)).is_equal_to(-15);
    }

    #[tokio::test]
    async fn already_exited_process_is_reported_as_is() {
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().await.unwrap();

        let exit_status = terminate(
            &mut child,
            &Cow::Borrowed("true"),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_that(exit_status.success()).is_true();
    }
}
