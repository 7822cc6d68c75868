//! Pre-split argument vectors describing what to launch.

use crate::error::SpecError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{Display, Formatter};

/// A program followed by its arguments.
///
/// Tokens are handed to the OS verbatim. No shell is involved, so there is no globbing, quoting
/// or variable expansion.
///
/// # Examples
///
/// ```
/// use tokio_pipeline_tools::CommandSpec;
///
/// let echo = CommandSpec::new("echo", ["hello"]);
/// assert_eq!(echo.program(), "echo");
///
/// let empty = CommandSpec::try_from(Vec::<String>::new());
/// assert!(empty.is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// A command without arguments.
    pub fn program_only(program: impl Into<String>) -> Self {
        Self::new(program, Vec::<String>::new())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Prefixes this command with another program, e.g. `sudo`.
    ///
    /// `apt install jq` prefixed with `/usr/bin/sudo` becomes `/usr/bin/sudo apt install jq`.
    pub fn prefixed_with(self, program: impl Into<String>) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: program.into(),
            args,
        }
    }

    /// Name used in logs and error messages, e.g. `apt "install" "-y" "jq"`.
    pub fn display_name(&self) -> Cow<'static, str> {
        let mut name = self.program.clone();
        for arg in &self.args {
            name.push_str(" \"");
            name.push_str(arg);
            name.push('"');
        }
        Cow::Owned(name)
    }

    pub(crate) fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name())
    }
}

impl TryFrom<Vec<String>> for CommandSpec {
    type Error = SpecError;

    fn try_from(mut tokens: Vec<String>) -> Result<Self, Self::Error> {
        if tokens.is_empty() {
            return Err(SpecError::EmptyCommand);
        }
        let program = tokens.remove(0);
        Ok(Self {
            program,
            args: tokens,
        })
    }
}

impl TryFrom<&[&str]> for CommandSpec {
    type Error = SpecError;

    fn try_from(tokens: &[&str]) -> Result<Self, Self::Error> {
        match tokens.split_first() {
            Some((program, args)) => Ok(Self::new(*program, args.iter().copied())),
            None => Err(SpecError::EmptyCommand),
        }
    }
}

impl<const N: usize> TryFrom<[&str; N]> for CommandSpec {
    type Error = SpecError;

    fn try_from(tokens: [&str; N]) -> Result<Self, Self::Error> {
        Self::try_from(&tokens[..])
    }
}

impl From<CommandSpec> for Vec<String> {
    fn from(spec: CommandSpec) -> Self {
        let mut tokens = Vec::with_capacity(spec.args.len() + 1);
        tokens.push(spec.program);
        tokens.extend(spec.args);
        tokens
    }
}

/// Two or more commands, the `n`-th stage's stdout feeding the `(n+1)`-th stage's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<CommandSpec>", into = "Vec<CommandSpec>")]
pub struct PipelineSpec {
    stages: Vec<CommandSpec>,
}

impl PipelineSpec {
    /// Fails with [`SpecError::InvalidPipeline`] when given fewer than 2 stages.
    pub fn new(stages: impl IntoIterator<Item = CommandSpec>) -> Result<Self, SpecError> {
        let stages: Vec<CommandSpec> = stages.into_iter().collect();
        if stages.len() < 2 {
            return Err(SpecError::InvalidPipeline {
                stages: stages.len(),
            });
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[CommandSpec] {
        &self.stages
    }

    /// Name used in logs and error messages, e.g. `curl "-s" "https://..." | sudo "bash"`.
    pub fn display_name(&self) -> Cow<'static, str> {
        let names: Vec<Cow<'static, str>> =
            self.stages.iter().map(CommandSpec::display_name).collect();
        Cow::Owned(names.join(" | "))
    }
}

impl Display for PipelineSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name())
    }
}

impl TryFrom<Vec<CommandSpec>> for PipelineSpec {
    type Error = SpecError;

    fn try_from(stages: Vec<CommandSpec>) -> Result<Self, Self::Error> {
        Self::new(stages)
    }
}

impl From<PipelineSpec> for Vec<CommandSpec> {
    fn from(spec: PipelineSpec) -> Self {
        spec.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn empty_token_list_is_rejected() {
        assert_that(CommandSpec::try_from(Vec::<String>::new()))
            .is_equal_to(Err(SpecError::EmptyCommand));
        let no_tokens: &[&str] = &[];
        assert_that(CommandSpec::try_from(no_tokens)).is_equal_to(Err(SpecError::EmptyCommand));
    }

    #[test]
    fn first_token_is_the_program() {
        let spec = CommandSpec::try_from(["kubectl", "version", "--client"]).unwrap();

        assert_that(spec.program()).is_equal_to("kubectl");
        assert_that(spec.args().to_vec())
            .is_equal_to(vec!["version".to_owned(), "--client".to_owned()]);
        assert_that(spec.display_name().as_ref())
            .is_equal_to("kubectl \"version\" \"--client\"");
    }

    #[test]
    fn prefixing_keeps_original_tokens_in_order() {
        let spec = CommandSpec::new("apt", ["install", "-y", "jq"]).prefixed_with("/usr/bin/sudo");

        assert_that(Vec::<String>::from(spec)).is_equal_to(vec![
            "/usr/bin/sudo".to_owned(),
            "apt".to_owned(),
            "install".to_owned(),
            "-y".to_owned(),
            "jq".to_owned(),
        ]);
    }

    #[test]
    fn single_stage_pipeline_is_rejected() {
        let result = PipelineSpec::new([CommandSpec::program_only("sort")]);
        assert_that(result).is_equal_to(Err(SpecError::InvalidPipeline { stages: 1 }));

        let result = PipelineSpec::new(Vec::new());
        assert_that(result).is_equal_to(Err(SpecError::InvalidPipeline { stages: 0 }));
    }

    #[test]
    fn pipeline_display_joins_stages_with_pipes() {
        let pipeline = PipelineSpec::new([
            CommandSpec::new("printf", ["b\na"]),
            CommandSpec::program_only("sort"),
        ])
        .unwrap();

        assert_that(pipeline.stages().len()).is_equal_to(2);
        assert_that(pipeline.display_name().as_ref()).is_equal_to("printf \"b\na\" | sort");
    }

    #[test]
    fn deserializes_from_token_arrays() {
        let spec: CommandSpec = serde_json::from_str(r#"["helm", "version", "--short"]"#).unwrap();
        assert_that(spec.program()).is_equal_to("helm");

        let empty = serde_json::from_str::<CommandSpec>("[]");
        assert_that(empty.is_err()).is_true();

        let single = serde_json::from_str::<PipelineSpec>(r#"[["sort"]]"#);
        assert_that(single.is_err()).is_true();
    }
}
