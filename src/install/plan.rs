use crate::command::{CommandSpec, PipelineSpec};
use crate::error::PlanError;
use crate::output::ExecutionResult;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;

/// When a probe counts a tool as present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Satisfied {
    /// The probe exited with code 0, e.g. `helm version --short`.
    #[default]
    ExitCodeZero,

    /// The probe printed something to stdout.
    ///
    /// `brew ls --versions <package>` exits 0 either way and prints nothing for missing
    /// packages.
    OutputNotEmpty,
}

/// A lightweight command detecting whether a tool is already installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub command: CommandSpec,

    #[serde(default)]
    pub satisfied_when: Satisfied,
}

impl Probe {
    pub fn exit_code_zero(command: CommandSpec) -> Self {
        Self {
            command,
            satisfied_when: Satisfied::ExitCodeZero,
        }
    }

    pub fn output_not_empty(command: CommandSpec) -> Self {
        Self {
            command,
            satisfied_when: Satisfied::OutputNotEmpty,
        }
    }

    pub fn is_satisfied_by(&self, result: &ExecutionResult) -> bool {
        match self.satisfied_when {
            Satisfied::ExitCodeZero => result.success(),
            Satisfied::OutputNotEmpty => {
                result.launch_error.is_none() && !result.stdout.trim().is_empty()
            }
        }
    }
}

/// What a [`Step`] launches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Run(CommandSpec),
    Pipe(PipelineSpec),
}

/// A single command or pipeline run while installing a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,

    /// A failing checked step halts the whole sequence. Unchecked steps are best effort.
    #[serde(default = "checked_by_default")]
    pub checked: bool,
}

fn checked_by_default() -> bool {
    true
}

impl Step {
    pub fn run(command: CommandSpec) -> Self {
        Self {
            action: Action::Run(command),
            checked: true,
        }
    }

    pub fn pipe(pipeline: PipelineSpec) -> Self {
        Self {
            action: Action::Pipe(pipeline),
            checked: true,
        }
    }

    /// Marks this step as best effort.
    pub fn unchecked(mut self) -> Self {
        self.checked = false;
        self
    }

    pub fn display_name(&self) -> Cow<'static, str> {
        match &self.action {
            Action::Run(command) => command.display_name(),
            Action::Pipe(pipeline) => pipeline.display_name(),
        }
    }
}

/// A tool, how to detect it and how to install it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub probe: Probe,
    pub install: Vec<Step>,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        probe: Probe,
        install: impl IntoIterator<Item = Step>,
    ) -> Self {
        Self {
            name: name.into(),
            probe,
            install: install.into_iter().collect(),
        }
    }
}

/// Everything the sequencer needs to bring a machine up to date, in order.
///
/// Plans read from JSON look like this:
///
/// ```json
/// {
///   "package_manager": { "command": ["apt", "--version"] },
///   "preflight": [{ "run": ["sudo", "apt", "update"] }],
///   "tools": [
///     {
///       "name": "azure-cli",
///       "probe": { "command": ["az", "--version"] },
///       "install": [
///         { "pipe": [["curl", "-sL", "https://aka.ms/InstallAzureCLIDeb"], ["sudo", "bash"]] }
///       ]
///     }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallPlan {
    /// Checked before anything else. Its absence halts the sequence.
    #[serde(default)]
    pub package_manager: Option<Probe>,

    /// Best-effort steps run once before the first tool, e.g. refreshing package indexes.
    #[serde(default)]
    pub preflight: Vec<Step>,

    #[serde(default)]
    pub tools: Vec<Tool>,
}

impl InstallPlan {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json).map_err(|source| PlanError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }
}
