//! Idempotent installation of the tools a deployment machine needs.
//!
//! An [`InstallPlan`] lists tools in dependency order. The [`Sequencer`] probes each one and
//! only runs the install steps of tools that are missing.

mod plan;
mod platform;
mod sequencer;

pub use plan::{Action, InstallPlan, Probe, Satisfied, Step, Tool};
pub use platform::{APT_PACKAGES, BREW_PACKAGES, DEFAULT_SUDO, Platform};
pub use sequencer::{InstallReport, Sequencer, SequencerConfig, ToolOutcome, ToolReport};
