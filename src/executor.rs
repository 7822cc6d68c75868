//! Running a single external program to completion.

use crate::collector::{Collector, Drained, StreamType};
use crate::command::CommandSpec;
use crate::error::LaunchError;
use crate::output::{ExecutionResult, exit_code_of, exit_code_of_waited};
use crate::terminate::terminate;
use bytes::BytesMut;
use std::borrow::Cow;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStdout};
use tokio::time::Instant;

/// Default size of the buffers used to drain stdout and stderr.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024; // 16 kb

/// What the spawned program (or the first stage of a pipeline) reads as its stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdinMode {
    /// Reads see an immediate EOF.
    #[default]
    Null,

    /// Share the stdin of the current process.
    Inherit,
}

impl StdinMode {
    fn to_stdio(self) -> Stdio {
        match self {
            StdinMode::Null => Stdio::null(),
            StdinMode::Inherit => Stdio::inherit(),
        }
    }
}

/// Options applied to every execution of an [`Executor`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tokio_pipeline_tools::{ExecOptions, StdinMode};
///
/// let options = ExecOptions::default()
///     .timeout(Duration::from_secs(600))
///     .stdin(StdinMode::Inherit);
/// assert_eq!(options.get_timeout(), Some(Duration::from_secs(600)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    timeout: Option<Duration>,
    stdin: StdinMode,
    interrupt_timeout: Duration,
    terminate_timeout: Duration,
    read_buffer_size: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            stdin: StdinMode::default(),
            interrupt_timeout: Duration::from_secs(1),
            terminate_timeout: Duration::from_secs(1),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ExecOptions {
    /// Deadline for a whole execution.
    ///
    /// When it expires, every running process is asked to stop and is killed if it does not.
    /// The result then has `timed_out` set. Without a timeout, an execution waits as long as
    /// its processes run.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn stdin(mut self, stdin: StdinMode) -> Self {
        self.stdin = stdin;
        self
    }

    /// How long a process gets to exit after being interrupted (`SIGINT`).
    pub fn interrupt_timeout(mut self, timeout: Duration) -> Self {
        self.interrupt_timeout = timeout;
        self
    }

    /// How long a process gets to exit after being asked to terminate (`SIGTERM`) before it
    /// is killed.
    pub fn terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    /// Initial size of the buffers draining stdout and stderr. They grow as needed.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn get_stdin(&self) -> StdinMode {
        self.stdin
    }

    pub(crate) fn stdin_stdio(&self) -> Stdio {
        self.stdin.to_stdio()
    }
}

/// Runs commands and pipelines, turning every outcome into an [`ExecutionResult`].
///
/// Each call owns its processes and pipes. Nothing is shared between calls and nothing keeps
/// running once a call returned. Dropping a pending call kills the processes it spawned.
///
/// # Examples
///
/// ```no_run
/// use tokio_pipeline_tools::{CommandSpec, Executor};
///
/// # async fn run() {
/// let result = Executor::new()
///     .execute(&CommandSpec::new("echo", ["hello"]))
///     .await;
/// assert_eq!(result.stdout, "hello");
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Executor {
    pub(crate) options: ExecOptions,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ExecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    /// Runs `spec` until it exits, capturing its exit code, stdout and stderr.
    ///
    /// A program that cannot be started results in `launch_error` being set, a program exiting
    /// with a nonzero code is reported as is. This never fails.
    pub async fn execute(&self, spec: &CommandSpec) -> ExecutionResult {
        let deadline = self.deadline();
        let stage = match Stage::spawn(spec, self.options.stdin_stdio(), true, &self.options) {
            Ok(stage) => stage,
            Err(err) => {
                tracing::debug!(process = %spec.display_name(), error = %err, "Failed to launch");
                return ExecutionResult::launch_failed(err, Vec::new());
            }
        };
        self.finish(vec![stage], deadline).await
    }

    /// The instant by which a call starting now has to be done.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.options.timeout.map(|timeout| Instant::now() + timeout)
    }

    /// Waits for all `stages`, returning the last stage's output.
    ///
    /// Both waiting for the processes and draining their output are bounded by `deadline`.
    pub(crate) async fn finish(
        &self,
        mut stages: Vec<Stage>,
        deadline: Option<Instant>,
    ) -> ExecutionResult {
        let (waited, mut timed_out) = self.await_stages(&mut stages, deadline).await;
        let stage_exit_codes: Vec<i32> = waited.iter().map(exit_code_of_waited).collect();

        // A stage killed on timeout may have left children behind which still hold its pipes.
        let drain_deadline = match timed_out {
            true => Some(Instant::now() + self.options.terminate_timeout),
            false => deadline,
        };

        let Some(mut last) = stages.pop() else {
            return ExecutionResult::completed(-1, &[], &[], stage_exit_codes, timed_out);
        };
        for (index, mut stage) in stages.into_iter().enumerate() {
            let stderr = stage.collect_stderr(drain_deadline).await;
            timed_out |= !stderr.complete;
            if !stderr.bytes.is_empty() {
                tracing::debug!(
                    process = %stage.name,
                    stage = index,
                    stderr = %String::from_utf8_lossy(&stderr.bytes),
                    "Intermediate stage wrote to stderr"
                );
            }
        }

        let stdout = last.collect_stdout(drain_deadline).await;
        let stderr = last.collect_stderr(drain_deadline).await;
        timed_out |= !(stdout.complete && stderr.complete);
        let exit_code = stage_exit_codes.last().copied().unwrap_or(-1);
        tracing::debug!(process = %last.name, exit_code, timed_out, "Process exited");

        ExecutionResult::completed(
            exit_code,
            &stdout.bytes,
            &stderr.bytes,
            stage_exit_codes,
            timed_out,
        )
    }

    /// Waits for every stage in launch order, terminating all of them at `deadline`.
    async fn await_stages(
        &self,
        stages: &mut [Stage],
        deadline: Option<Instant>,
    ) -> (Vec<io::Result<ExitStatus>>, bool) {
        let Some(deadline) = deadline else {
            return (wait_all(stages).await, false);
        };

        match tokio::time::timeout_at(deadline, wait_all(stages)).await {
            Ok(waited) => (waited, false),
            Err(_elapsed) => {
                let timeout = self.options.timeout;
                tracing::warn!(?timeout, "Execution timed out, terminating processes");
                (self.terminate_all(stages).await, true)
            }
        }
    }

    /// Stops every stage that is still running and reports all exit statuses.
    pub(crate) async fn terminate_all(
        &self,
        stages: &mut [Stage],
    ) -> Vec<io::Result<ExitStatus>> {
        let mut waited = Vec::with_capacity(stages.len());
        for stage in stages.iter_mut() {
            let result = terminate(
                &mut stage.child,
                &stage.name,
                self.options.interrupt_timeout,
                self.options.terminate_timeout,
            )
            .await;
            match result {
                Ok(exit_status) => waited.push(Ok(exit_status)),
                Err(err) => {
                    tracing::warn!(
                        process = %stage.name,
                        error = %err,
                        "Could not terminate process"
                    );
                    waited.push(Err(io::Error::other(err)));
                }
            }
        }
        waited
    }
}

async fn wait_all(stages: &mut [Stage]) -> Vec<io::Result<ExitStatus>> {
    let mut waited = Vec::with_capacity(stages.len());
    for stage in stages.iter_mut() {
        let result = stage.child.wait().await;
        match &result {
            Ok(exit_status) => {
                tracing::trace!(
                    process = %stage.name,
                    exit_code = exit_code_of(*exit_status),
                    "Stage exited"
                );
            }
            Err(err) => {
                tracing::warn!(process = %stage.name, error = %err, "Could not wait for process");
            }
        }
        waited.push(result);
    }
    waited
}

/// One spawned process together with the collectors draining its output.
#[derive(Debug)]
pub(crate) struct Stage {
    pub(crate) name: Cow<'static, str>,
    pub(crate) child: Child,
    stdout: Option<Collector>,
    stderr: Option<Collector>,
}

impl Stage {
    /// Spawns `spec` with stdout and stderr piped.
    ///
    /// With `collect_stdout`, stdout is drained like stderr. Otherwise it stays on the child so
    /// that it can be handed to the next pipeline stage with [`Stage::take_stdout`].
    pub(crate) fn spawn(
        spec: &CommandSpec,
        stdin: Stdio,
        collect_stdout: bool,
        options: &ExecOptions,
    ) -> Result<Self, LaunchError> {
        let name = spec.display_name();
        let mut cmd = spec.to_command();
        cmd.stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| LaunchError::from_spawn_error(spec.program(), &err))?;

        // The command still owns our copy of whatever `stdin` refers to. For a pipeline, that
        // is the read end of the previous stage's stdout. Releasing it now leaves the child as
        // its only reader, so the upstream stage sees a broken pipe once this one exits.
        drop(cmd);

        let stdout = match collect_stdout {
            true => child.stdout.take().map(|stream| {
                Collector::spawn(
                    stream,
                    StreamType::StdOut,
                    name.clone(),
                    options.read_buffer_size,
                )
            }),
            false => None,
        };
        let stderr = child.stderr.take().map(|stream| {
            Collector::spawn(
                stream,
                StreamType::StdErr,
                name.clone(),
                options.read_buffer_size,
            )
        });

        tracing::debug!(process = %name, pid = ?child.id(), "Spawned process");

        Ok(Self {
            name,
            child,
            stdout,
            stderr,
        })
    }

    pub(crate) fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    async fn collect_stdout(&mut self, deadline: Option<Instant>) -> Drained {
        collect(self.stdout.take(), &self.name, deadline).await
    }

    async fn collect_stderr(&mut self, deadline: Option<Instant>) -> Drained {
        collect(self.stderr.take(), &self.name, deadline).await
    }
}

async fn collect(
    collector: Option<Collector>,
    process_name: &Cow<'static, str>,
    deadline: Option<Instant>,
) -> Drained {
    let Some(collector) = collector else {
        return Drained {
            bytes: BytesMut::new(),
            complete: true,
        };
    };
    match collector.drain(deadline).await {
        Ok(drained) => {
            if !drained.complete {
                tracing::warn!(
                    process = %process_name,
                    bytes = drained.bytes.len(),
                    "Output stream still open at the deadline, keeping what was read"
                );
            }
            drained
        }
        Err(err) => {
            tracing::warn!(process = %process_name, error = %err, "Could not collect output");
            Drained {
                bytes: BytesMut::new(),
                complete: true,
            }
        }
    }
}

/// Runs `spec` with default [`ExecOptions`]. See [`Executor::execute`].
pub async fn execute(spec: &CommandSpec) -> ExecutionResult {
    Executor::new().execute(spec).await
}
