mod answer;
mod collector;
mod command;
mod error;
mod executor;
mod install;
mod output;
mod pipeline;
mod terminate;

pub use answer::{Answer, prompt_yes_no};
pub use command::{CommandSpec, PipelineSpec};
pub use error::{LaunchError, PlanError, SequenceError, SpecError, TerminationError};
pub use executor::{DEFAULT_READ_BUFFER_SIZE, ExecOptions, Executor, StdinMode, execute};
pub use install::{
    APT_PACKAGES, Action, BREW_PACKAGES, DEFAULT_SUDO, InstallPlan, InstallReport, Platform, Probe,
    Satisfied, Sequencer, SequencerConfig, Step, Tool, ToolOutcome, ToolReport,
};
pub use output::{ExecutionResult, LAUNCH_FAILURE_EXIT_CODE};
pub use pipeline::execute_pipeline;
