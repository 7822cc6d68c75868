//! Error types for command construction, launching, termination and install sequencing.

use std::borrow::Cow;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Misuse detected while constructing a command or pipeline.
///
/// Nothing is ever launched for a spec that failed to construct.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// A command needs at least a program name.
    #[error("Command spec is empty, expected at least a program name")]
    EmptyCommand,

    /// A pipeline needs at least two stages.
    #[error("Pipeline needs at least 2 stages, got {stages}")]
    InvalidPipeline {
        /// The number of stages that were supplied.
        stages: usize,
    },
}

/// A program could not be started.
///
/// This is data carried by an [`crate::ExecutionResult`], never raised by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    /// The OS could not locate the program.
    #[error("Program '{program}' could not be found")]
    ProgramNotFound {
        /// The program that was requested.
        program: String,
    },

    /// The program exists but may not be executed.
    #[error("Program '{program}' could not be executed: permission denied")]
    PermissionDenied {
        /// The program that was requested.
        program: String,
    },

    /// Any other spawn failure.
    #[error("Failed to spawn program '{program}': {message}")]
    SpawnFailed {
        /// The program that was requested.
        program: String,
        /// The kind of the underlying IO error.
        kind: io::ErrorKind,
        /// The rendered underlying IO error.
        message: String,
    },

    /// A pipeline stage could not be started. Stages after it were never launched.
    #[error("Pipeline stage {index} failed to launch: {cause}")]
    StageLaunchFailed {
        /// Zero-based index of the stage.
        index: usize,
        /// Why the stage could not be started.
        cause: Box<LaunchError>,
    },
}

impl LaunchError {
    pub(crate) fn from_spawn_error(program: &str, err: &io::Error) -> Self {
        let program = program.to_owned();
        match err.kind() {
            io::ErrorKind::NotFound => LaunchError::ProgramNotFound { program },
            io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied { program },
            kind => LaunchError::SpawnFailed {
                program,
                kind,
                message: err.to_string(),
            },
        }
    }

    /// Whether the program (or the failing pipeline stage's program) was not found.
    pub fn is_program_not_found(&self) -> bool {
        match self {
            LaunchError::ProgramNotFound { .. } => true,
            LaunchError::StageLaunchFailed { cause, .. } => cause.is_program_not_found(),
            LaunchError::PermissionDenied { .. } | LaunchError::SpawnFailed { .. } => false,
        }
    }

    /// Index of the pipeline stage that failed to launch, if this came from a pipeline.
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            LaunchError::StageLaunchFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Errors that can occur when terminating a process.
#[derive(Debug, Error)]
pub enum TerminationError {
    /// Failed to terminate the process after trying all signals (interrupt, terminate, kill).
    #[error(
        "Failed to terminate process '{process_name}'. Interrupt failed: {interrupt_error}. Terminate failed: {terminate_error}. Kill failed: {kill_error}"
    )]
    TerminationFailed {
        /// The name of the process.
        process_name: Cow<'static, str>,
        /// Error from the interrupt attempt.
        interrupt_error: String,
        /// Error from the terminate attempt.
        terminate_error: String,
        /// Error from the kill attempt.
        #[source]
        kill_error: io::Error,
    },
}

/// Errors that can occur when loading an install plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan file could not be read.
    #[error("Could not read install plan '{}': {source}", path.display())]
    Read {
        /// Path of the plan file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The plan file is not a valid plan.
    #[error("Could not parse install plan '{}': {source}", path.display())]
    Parse {
        /// Path of the plan file.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// The install sequence halted.
///
/// Later tools are never attempted, as they may depend on the one that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// The package manager the plan relies on is not available.
    #[error("Package manager probe '{probe}' failed, install '{probe}' manually and re-run")]
    PackageManagerMissing {
        /// The probe command that failed.
        probe: String,
    },

    /// A checked install step failed.
    #[error(
        "{tool} install failed at step '{step}' (exit code {exit_code}): {stderr}. Install {tool} manually and re-run"
    )]
    InstallFailed {
        /// The tool being installed.
        tool: String,
        /// The step that failed.
        step: String,
        /// The exit code of the failed step.
        exit_code: i32,
        /// Captured error output of the failed step.
        stderr: String,
    },

    /// All install steps succeeded but the probe still does not find the tool.
    #[error("{tool} is still missing after installation. Install {tool} manually and re-run")]
    StillMissing {
        /// The tool being installed.
        tool: String,
    },
}

impl SequenceError {
    /// Name of the tool the sequence halted on, if any.
    pub fn tool(&self) -> Option<&str> {
        match self {
            SequenceError::PackageManagerMissing { .. } => None,
            SequenceError::InstallFailed { tool, .. } | SequenceError::StillMissing { tool } => {
                Some(tool)
            }
        }
    }
}
