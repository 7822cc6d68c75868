//! Chaining commands stdout-to-stdin, the way a shell pipeline does.

use crate::command::PipelineSpec;
use crate::error::LaunchError;
use crate::executor::{Executor, Stage};
use crate::output::{ExecutionResult, exit_code_of_waited};
use std::io;
use std::process::Stdio;

impl Executor {
    /// Runs all stages of `pipeline` connected by OS pipes.
    ///
    /// Stage `k` writes directly into stage `k + 1`, so data never passes through this process
    /// and a slow reader slows down its writer exactly like in a shell. Every stage is awaited,
    /// but only the last stage's exit code and output are reported. An intermediate stage
    /// exiting nonzero is visible in `stage_exit_codes` only.
    ///
    /// If a stage cannot be launched, no later stage is launched, the already running ones are
    /// stopped, and `launch_error` is set to [`LaunchError::StageLaunchFailed`].
    pub async fn execute_pipeline(&self, pipeline: &PipelineSpec) -> ExecutionResult {
        let deadline = self.deadline();
        let last = pipeline.stages().len() - 1;
        let mut stages: Vec<Stage> = Vec::with_capacity(pipeline.stages().len());

        for (index, spec) in pipeline.stages().iter().enumerate() {
            let stdin = match stages.last_mut() {
                None => Ok(self.options.stdin_stdio()),
                Some(upstream) => upstream_stdin(upstream),
            };

            let spawned = stdin
                .map_err(|err| LaunchError::SpawnFailed {
                    program: spec.program().to_owned(),
                    kind: err.kind(),
                    message: err.to_string(),
                })
                .and_then(|stdin| Stage::spawn(spec, stdin, index == last, &self.options));

            match spawned {
                Ok(stage) => {
                    tracing::debug!(
                        process = %stage.name,
                        stage = index,
                        "Launched pipeline stage"
                    );
                    stages.push(stage);
                }
                Err(cause) => {
                    tracing::warn!(
                        process = %spec.display_name(),
                        stage = index,
                        error = %cause,
                        "Pipeline stage failed to launch, aborting pipeline"
                    );
                    let waited = self.terminate_all(&mut stages).await;
                    let stage_exit_codes = waited.iter().map(exit_code_of_waited).collect();
                    return ExecutionResult::launch_failed(
                        LaunchError::StageLaunchFailed {
                            index,
                            cause: Box::new(cause),
                        },
                        stage_exit_codes,
                    );
                }
            }
        }

        self.finish(stages, deadline).await
    }
}

/// Turns the upstream stage's stdout into the next stage's stdin.
fn upstream_stdin(upstream: &mut Stage) -> io::Result<Stdio> {
    match upstream.take_stdout() {
        Some(stdout) => stdout.try_into(),
        None => Err(io::Error::other(format!(
            "stdout of '{}' was already taken",
            upstream.name
        ))),
    }
}

/// Runs `pipeline` with default [`crate::ExecOptions`]. See [`Executor::execute_pipeline`].
pub async fn execute_pipeline(pipeline: &PipelineSpec) -> ExecutionResult {
    Executor::new().execute_pipeline(pipeline).await
}
