//! Built-in plans for the deployment tooling (curl, jq, Azure CLI, kubectl, helm).

use crate::command::{CommandSpec, PipelineSpec};
use crate::error::SpecError;
use crate::install::plan::{InstallPlan, Probe, Step, Tool};

/// Where `sudo` is expected on Linux hosts.
pub const DEFAULT_SUDO: &str = "/usr/bin/sudo";

/// System packages installed through apt on Linux.
pub const APT_PACKAGES: [&str; 3] = ["curl", "openssl", "jq"];

/// Packages installed through Homebrew on macOS.
pub const BREW_PACKAGES: [&str; 5] = [
    "curl",
    "jq",
    "azure-cli",
    "kubernetes-cli",
    "kubernetes-helm",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Other(String),
}

impl Platform {
    pub fn detect() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "linux" => Platform::Linux,
            "macos" | "darwin" => Platform::MacOs,
            other => Platform::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Other(os) => os,
        }
    }
}

fn sudo(sudo: &str, program: &str, args: &[&str]) -> CommandSpec {
    CommandSpec::new(program, args.iter().copied()).prefixed_with(sudo)
}

fn pipe(stages: [CommandSpec; 2]) -> Result<Step, SpecError> {
    PipelineSpec::new(stages).map(Step::pipe)
}

impl InstallPlan {
    /// The built-in plan for `platform`, if there is one.
    pub fn for_platform(platform: &Platform, sudo_program: &str) -> Option<Self> {
        let plan = match platform {
            Platform::Linux => Self::apt(sudo_program),
            Platform::MacOs => Self::brew(),
            Platform::Other(_) => return None,
        };
        match plan {
            Ok(plan) => Some(plan),
            Err(err) => {
                tracing::error!(
                    platform = platform.as_str(),
                    error = %err,
                    "Built-in plan is malformed"
                );
                None
            }
        }
    }

    /// Debian/Ubuntu: system packages, then the Azure CLI, kubectl and helm.
    pub fn apt(sudo_program: &str) -> Result<Self, SpecError> {
        let mut tools: Vec<Tool> = APT_PACKAGES
            .iter()
            .map(|&package| {
                Tool::new(
                    package,
                    Probe::exit_code_zero(CommandSpec::new("dpkg", ["-s", package])),
                    [Step::run(sudo(sudo_program, "apt", &["install", "-y", package]))],
                )
            })
            .collect();

        tools.push(Tool::new(
            "azure-cli",
            Probe::exit_code_zero(CommandSpec::new("az", ["--version"])),
            [pipe([
                CommandSpec::new("curl", ["-sL", "https://aka.ms/InstallAzureCLIDeb"]),
                CommandSpec::program_only("bash").prefixed_with(sudo_program),
            ])?],
        ));

        tools.push(Tool::new(
            "kubectl",
            Probe::exit_code_zero(CommandSpec::new("kubectl", ["version", "--client"])),
            [
                Step::run(sudo(
                    sudo_program,
                    "apt-get",
                    &["install", "-y", "apt-transport-https", "gnupg2"],
                ))
                .unchecked(),
                pipe([
                    CommandSpec::new(
                        "curl",
                        ["-s", "https://packages.cloud.google.com/apt/doc/apt-key.gpg"],
                    ),
                    sudo(sudo_program, "apt-key", &["add", "-"]),
                ])?
                .unchecked(),
                pipe([
                    CommandSpec::new(
                        "echo",
                        ["deb https://apt.kubernetes.io/ kubernetes-xenial main"],
                    ),
                    sudo(
                        sudo_program,
                        "tee",
                        &["-a", "/etc/apt/sources.list.d/kubernetes.list"],
                    ),
                ])?
                .unchecked(),
                Step::run(sudo(sudo_program, "apt-get", &["update"])).unchecked(),
                Step::run(sudo(sudo_program, "apt-get", &["install", "-y", "kubectl"])),
            ],
        ));

        tools.push(Tool::new(
            "helm",
            Probe::exit_code_zero(CommandSpec::new("helm", ["version", "--short"])),
            [
                pipe([
                    CommandSpec::new(
                        "curl",
                        ["https://helm.baltorepo.com/organization/signing.asc"],
                    ),
                    sudo(sudo_program, "apt-key", &["add", "-"]),
                ])?
                .unchecked(),
                pipe([
                    CommandSpec::new(
                        "echo",
                        ["deb https://baltocdn.com/helm/stable/debian/ all main"],
                    ),
                    sudo(
                        sudo_program,
                        "tee",
                        &["/etc/apt/sources.list.d/helm-stable-debian.list"],
                    ),
                ])?
                .unchecked(),
                Step::run(sudo(sudo_program, "apt-get", &["update"])).unchecked(),
                Step::run(sudo(sudo_program, "apt-get", &["install", "-y", "helm"])),
            ],
        ));

        Ok(Self {
            package_manager: Some(Probe::exit_code_zero(CommandSpec::new("apt", ["--version"]))),
            preflight: vec![Step::run(sudo(sudo_program, "apt", &["update"])).unchecked()],
            tools,
        })
    }

    /// macOS: everything through Homebrew.
    pub fn brew() -> Result<Self, SpecError> {
        let tools = BREW_PACKAGES
            .iter()
            .map(|&package| {
                Tool::new(
                    package,
                    Probe::output_not_empty(CommandSpec::new(
                        "brew",
                        ["ls", "--versions", package],
                    )),
                    [Step::run(CommandSpec::new("brew", ["install", package]))],
                )
            })
            .collect();

        Ok(Self {
            package_manager: Some(Probe::exit_code_zero(CommandSpec::new("brew", ["--version"]))),
            preflight: vec![Step::run(CommandSpec::new("brew", ["update"])).unchecked()],
            tools,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::plan::{Action, Satisfied};
    use assertr::prelude::*;

    #[test]
    fn detects_platform_from_os_name() {
        assert_that(Platform::from_os("linux")).is_equal_to(Platform::Linux);
        assert_that(Platform::from_os("macos")).is_equal_to(Platform::MacOs);
        assert_that(Platform::from_os("windows"))
            .is_equal_to(Platform::Other("windows".to_owned()));
    }

    #[test]
    fn apt_plan_installs_in_dependency_order() {
        let plan = InstallPlan::apt(DEFAULT_SUDO).unwrap();

        assert_that(plan.tool_names())
            .is_equal_to(vec!["curl", "openssl", "jq", "azure-cli", "kubectl", "helm"]);
        assert_that(plan.package_manager.unwrap().command.display_name().as_ref())
            .is_equal_to("apt \"--version\"");
    }

    #[test]
    fn apt_plan_uses_the_configured_sudo() {
        let plan = InstallPlan::apt("/opt/bin/sudo").unwrap();

        let jq = &plan.tools[2];
        let Action::Run(install) = &jq.install[0].action else {
            panic!("expected a single command");
        };
        assert_that(install.program()).is_equal_to("/opt/bin/sudo");

        let az = &plan.tools[3];
        let Action::Pipe(install) = &az.install[0].action else {
            panic!("expected a pipeline");
        };
        assert_that(install.stages()[1].display_name().as_ref())
            .is_equal_to("/opt/bin/sudo \"bash\"");
    }

    #[test]
    fn only_the_final_kubectl_install_is_checked() {
        let plan = InstallPlan::apt(DEFAULT_SUDO).unwrap();

        let kubectl = &plan.tools[4];
        let checked: Vec<bool> = kubectl.install.iter().map(|step| step.checked).collect();
        assert_that(checked).is_equal_to(vec![false, false, false, false, true]);
    }

    #[test]
    fn brew_plan_probes_by_output() {
        let plan = InstallPlan::brew().unwrap();

        assert_that(plan.tools.len()).is_equal_to(BREW_PACKAGES.len());
        for tool in &plan.tools {
            assert_that(tool.probe.satisfied_when).is_equal_to(Satisfied::OutputNotEmpty);
        }
    }

    #[test]
    fn no_built_in_plan_for_other_platforms() {
        let plan = InstallPlan::for_platform(&Platform::Other("freebsd".to_owned()), DEFAULT_SUDO);

        assert_that(plan.is_none()).is_true();
    }
}
