use crate::error::SequenceError;
use crate::executor::{ExecOptions, Executor};
use crate::install::plan::{Action, InstallPlan, Probe, Step, Tool};
use crate::output::ExecutionResult;

/// Everything a [`Sequencer`] works with, handed over once at construction.
#[derive(Debug, Clone, Default)]
pub struct SequencerConfig {
    pub plan: InstallPlan,
    pub exec_options: ExecOptions,
}

impl SequencerConfig {
    pub fn new(plan: InstallPlan) -> Self {
        Self {
            plan,
            exec_options: ExecOptions::default(),
        }
    }

    pub fn exec_options(mut self, exec_options: ExecOptions) -> Self {
        self.exec_options = exec_options;
        self
    }
}

/// What happened to a single tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The probe found the tool, nothing was installed.
    AlreadySatisfied,

    /// The tool was installed by running `steps` install steps.
    Installed { steps: usize },

    /// The probe did not find the tool. Only reported by [`Sequencer::check`].
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReport {
    pub tool: String,
    pub outcome: ToolOutcome,
}

/// Per-tool outcomes, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub tools: Vec<ToolReport>,
}

impl InstallReport {
    /// Total number of install steps launched.
    pub fn steps_run(&self) -> usize {
        self.tools
            .iter()
            .map(|report| match report.outcome {
                ToolOutcome::Installed { steps } => steps,
                ToolOutcome::AlreadySatisfied | ToolOutcome::Missing => 0,
            })
            .sum()
    }

    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.tools
            .iter()
            .filter(|report| report.outcome == ToolOutcome::Missing)
            .map(|report| report.tool.as_str())
    }

    pub fn outcome_of(&self, tool: &str) -> Option<ToolOutcome> {
        self.tools
            .iter()
            .find(|report| report.tool == tool)
            .map(|report| report.outcome)
    }
}

/// Probes each tool of a plan and installs the ones that are missing, strictly in order.
///
/// Tools that are already present are skipped, so running a sequencer a second time launches
/// no install step at all. The first failing checked step halts the sequence, as later tools
/// may rely on earlier ones.
#[derive(Debug, Clone)]
pub struct Sequencer {
    plan: InstallPlan,
    executor: Executor,
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> Self {
        Self {
            plan: config.plan,
            executor: Executor::with_options(config.exec_options),
        }
    }

    pub fn plan(&self) -> &InstallPlan {
        &self.plan
    }

    /// Probes every tool without installing anything.
    pub async fn check(&self) -> InstallReport {
        let mut report = InstallReport::default();
        for tool in &self.plan.tools {
            let outcome = match self.probe(&tool.probe).await {
                true => ToolOutcome::AlreadySatisfied,
                false => ToolOutcome::Missing,
            };
            report.tools.push(ToolReport {
                tool: tool.name.clone(),
                outcome,
            });
        }
        report
    }

    /// Installs every missing tool of the plan.
    pub async fn run(&self) -> Result<InstallReport, SequenceError> {
        if let Some(package_manager) = &self.plan.package_manager {
            if !self.probe(package_manager).await {
                return Err(SequenceError::PackageManagerMissing {
                    probe: package_manager.command.program().to_owned(),
                });
            }
        }

        let mut report = InstallReport::default();
        let mut preflight_done = false;
        for tool in &self.plan.tools {
            if self.probe(&tool.probe).await {
                tracing::info!(tool = %tool.name, "Already installed");
                report.tools.push(ToolReport {
                    tool: tool.name.clone(),
                    outcome: ToolOutcome::AlreadySatisfied,
                });
                continue;
            }

            if !preflight_done {
                self.preflight().await;
                preflight_done = true;
            }

            let steps = self.install(tool).await?;
            report.tools.push(ToolReport {
                tool: tool.name.clone(),
                outcome: ToolOutcome::Installed { steps },
            });
        }
        Ok(report)
    }

    async fn probe(&self, probe: &Probe) -> bool {
        let result = self.executor.execute(&probe.command).await;
        let satisfied = probe.is_satisfied_by(&result);
        tracing::debug!(
            probe = %probe.command,
            exit_code = result.exit_code,
            satisfied,
            "Probed"
        );
        satisfied
    }

    async fn preflight(&self) {
        for step in &self.plan.preflight {
            let result = self.run_step(step).await;
            if !result.success() {
                tracing::warn!(
                    step = %step.display_name(),
                    exit_code = result.exit_code,
                    stderr = %result.stderr,
                    "Preflight step failed, continuing"
                );
            }
        }
    }

    async fn install(&self, tool: &Tool) -> Result<usize, SequenceError> {
        tracing::info!(tool = %tool.name, "Installing");

        for step in &tool.install {
            let result = self.run_step(step).await;
            if result.success() {
                continue;
            }
            if step.checked {
                tracing::error!(
                    tool = %tool.name,
                    step = %step.display_name(),
                    exit_code = result.exit_code,
                    "Install failed"
                );
                return Err(SequenceError::InstallFailed {
                    tool: tool.name.clone(),
                    step: step.display_name().into_owned(),
                    exit_code: result.exit_code,
                    stderr: result.stderr,
                });
            }
            tracing::warn!(
                tool = %tool.name,
                step = %step.display_name(),
                exit_code = result.exit_code,
                stderr = %result.stderr,
                "Unchecked install step failed, continuing"
            );
        }

        if !self.probe(&tool.probe).await {
            return Err(SequenceError::StillMissing {
                tool: tool.name.clone(),
            });
        }

        tracing::info!(tool = %tool.name, steps = tool.install.len(), "Installed");
        Ok(tool.install.len())
    }

    async fn run_step(&self, step: &Step) -> ExecutionResult {
        match &step.action {
            Action::Run(command) => self.executor.execute(command).await,
            Action::Pipe(pipeline) => self.executor.execute_pipeline(pipeline).await,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::command::{CommandSpec, PipelineSpec};
    use assertr::prelude::*;
    use std::path::Path;
    use tracing_test::traced_test;

    fn sh(script: String) -> CommandSpec {
        CommandSpec::new("sh", ["-c".to_owned(), script])
    }

    fn file_exists(path: &Path) -> Probe {
        Probe::exit_code_zero(CommandSpec::new(
            "test",
            ["-f".to_owned(), path.display().to_string()],
        ))
    }

    /// A tool "installed" by creating `marker`, counting install runs in `counter`.
    fn marker_tool(name: &str, marker: &Path, counter: &Path) -> Tool {
        Tool::new(
            name,
            file_exists(marker),
            [Step::run(sh(format!(
                "echo run >> '{}' && touch '{}'",
                counter.display(),
                marker.display()
            )))],
        )
    }

    fn sequencer(plan: InstallPlan) -> Sequencer {
        Sequencer::new(SequencerConfig::new(plan))
    }

    #[tokio::test]
    async fn second_run_installs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("kubectl");
        let counter = dir.path().join("installs");
        let plan = InstallPlan {
            tools: vec![marker_tool("kubectl", &marker, &counter)],
            ..Default::default()
        };
        let sequencer = sequencer(plan);

        let first = sequencer.run().await.unwrap();
        assert_that(first.outcome_of("kubectl"))
            .is_some()
            .is_equal_to(ToolOutcome::Installed { steps: 1 });

        let second = sequencer.run().await.unwrap();
        assert_that(second.outcome_of("kubectl"))
            .is_some()
            .is_equal_to(ToolOutcome::AlreadySatisfied);
        assert_that(second.steps_run()).is_equal_to(0);

        let installs = std::fs::read_to_string(&counter).unwrap();
        assert_that(installs.lines().count()).is_equal_to(1);
    }

    #[tokio::test]
    #[traced_test]
    async fn failing_install_halts_the_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let later_marker = dir.path().join("helm");
        let counter = dir.path().join("installs");
        let plan = InstallPlan {
            tools: vec![
                Tool::new(
                    "azure-cli",
                    Probe::exit_code_zero(CommandSpec::program_only("false")),
                    [Step::run(sh("echo broken >&2; exit 7".to_owned()))],
                ),
                marker_tool("helm", &later_marker, &counter),
            ],
            ..Default::default()
        };

        let err = sequencer(plan).run().await.unwrap_err();

        assert_that(err.clone()).is_equal_to(SequenceError::InstallFailed {
            tool: "azure-cli".to_owned(),
            step: "sh \"-c\" \"echo broken >&2; exit 7\"".to_owned(),
            exit_code: 7,
            stderr: "broken".to_owned(),
        });
        assert_that(err.tool()).is_some().is_equal_to("azure-cli");
        assert_that(later_marker.exists()).is_false();
        assert!(logs_contain("Install failed"));
    }

    #[tokio::test]
    async fn missing_install_program_halts_the_sequence() {
        let plan = InstallPlan {
            tools: vec![Tool::new(
                "jq",
                Probe::exit_code_zero(CommandSpec::program_only("false")),
                [Step::run(CommandSpec::new("definitely-not-a-real-program-4f1c", ["install"]))],
            )],
            ..Default::default()
        };

        let err = sequencer(plan).run().await.unwrap_err();

        assert_that(matches!(err, SequenceError::InstallFailed { exit_code: 1, .. })).is_true();
    }

    #[tokio::test]
    async fn unchecked_steps_may_fail() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("helm");
        let counter = dir.path().join("installs");
        let mut tool = marker_tool("helm", &marker, &counter);
        tool.install.insert(0, Step::run(CommandSpec::program_only("false")).unchecked());
        let plan = InstallPlan {
            tools: vec![tool],
            ..Default::default()
        };

        let report = sequencer(plan).run().await.unwrap();

        assert_that(report.outcome_of("helm"))
            .is_some()
            .is_equal_to(ToolOutcome::Installed { steps: 2 });
        assert_that(marker.exists()).is_true();
    }

    #[tokio::test]
    async fn pipeline_steps_are_supported() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("az");
        let plan = InstallPlan {
            tools: vec![Tool::new(
                "azure-cli",
                file_exists(&marker),
                [Step::pipe(
                    PipelineSpec::new([
                        CommandSpec::new("echo", [format!("touch '{}'", marker.display())]),
                        CommandSpec::program_only("sh"),
                    ])
                    .unwrap(),
                )],
            )],
            ..Default::default()
        };

        let report = sequencer(plan).run().await.unwrap();

        assert_that(report.steps_run()).is_equal_to(1);
        assert_that(marker.exists()).is_true();
    }

    #[tokio::test]
    async fn tool_still_missing_after_install_is_an_error() {
        let plan = InstallPlan {
            tools: vec![Tool::new(
                "kubectl",
                Probe::exit_code_zero(CommandSpec::program_only("false")),
                [Step::run(CommandSpec::program_only("true"))],
            )],
            ..Default::default()
        };

        let err = sequencer(plan).run().await.unwrap_err();

        assert_that(err).is_equal_to(SequenceError::StillMissing {
            tool: "kubectl".to_owned(),
        });
    }

    #[tokio::test]
    async fn missing_package_manager_halts_before_any_tool() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("jq");
        let counter = dir.path().join("installs");
        let plan = InstallPlan {
            package_manager: Some(Probe::exit_code_zero(CommandSpec::new(
                "definitely-not-a-real-program-4f1c",
                ["--version"],
            ))),
            tools: vec![marker_tool("jq", &marker, &counter)],
            ..Default::default()
        };

        let err = sequencer(plan).run().await.unwrap_err();

        assert_that(err).is_equal_to(SequenceError::PackageManagerMissing {
            probe: "definitely-not-a-real-program-4f1c".to_owned(),
        });
        assert_that(marker.exists()).is_false();
    }

    #[tokio::test]
    async fn preflight_runs_once_and_only_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let preflight_counter = dir.path().join("preflight");
        let counter = dir.path().join("installs");
        let plan = InstallPlan {
            preflight: vec![
                Step::run(sh(format!("echo update >> '{}'", preflight_counter.display())))
                    .unchecked(),
            ],
            tools: vec![
                marker_tool("curl", &dir.path().join("curl"), &counter),
                marker_tool("jq", &dir.path().join("jq"), &counter),
            ],
            ..Default::default()
        };
        let sequencer = sequencer(plan);

        sequencer.run().await.unwrap();
        sequencer.run().await.unwrap();

        let updates = std::fs::read_to_string(&preflight_counter).unwrap();
        assert_that(updates.lines().count()).is_equal_to(1);
    }

    #[tokio::test]
    async fn check_only_probes() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("helm");
        let counter = dir.path().join("installs");
        let plan = InstallPlan {
            tools: vec![
                Tool::new(
                    "sh",
                    Probe::exit_code_zero(CommandSpec::new("sh", ["-c", "exit 0"])),
                    Vec::new(),
                ),
                marker_tool("helm", &marker, &counter),
            ],
            ..Default::default()
        };

        let report = sequencer(plan).check().await;

        assert_that(report.outcome_of("sh"))
            .is_some()
            .is_equal_to(ToolOutcome::AlreadySatisfied);
        assert_that(report.missing().collect::<Vec<_>>()).is_equal_to(vec!["helm"]);
        assert_that(marker.exists()).is_false();
    }
}
