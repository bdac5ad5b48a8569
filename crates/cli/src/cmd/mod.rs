mod bridge;
mod build;
mod convert;
mod embed;
mod info;
mod plan;
mod upload;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing::debug;

use fwstitch_lib::bridge::BridgeStrategy;
use fwstitch_lib::config::{ConfigError, StitchConfig, ToolPaths, find_config_path};
use fwstitch_lib::embed::HostArch;
use fwstitch_lib::pipeline::{Goal, PipelineError};

use crate::output::OutputFormat;

pub use bridge::cmd_bridge;
pub use build::cmd_build;
pub use convert::cmd_convert;
pub use embed::cmd_embed;
pub use info::cmd_info;
pub use plan::cmd_plan;
pub use upload::cmd_upload;

/// Flags shared by every subcommand.
pub struct GlobalOpts {
  pub config: Option<PathBuf>,
  pub strategy: Option<BridgeStrategy>,
  pub output: OutputFormat,
}

impl GlobalOpts {
  /// Locate and load the configuration, applying `--strategy`.
  pub fn load_config(&self) -> Result<StitchConfig> {
    let path = find_config_path(self.config.as_deref()).context("No configuration to run with")?;
    debug!(path = %path.display(), "using config");
    let config =
      StitchConfig::load(&path).with_context(|| format!("Failed to load config: {}", path.display()))?;
    Ok(match self.strategy {
      Some(strategy) => config.with_strategy(strategy),
      None => config,
    })
  }

  /// Tools and host architecture for the single-step commands.
  ///
  /// These run without a configuration file: when none is found the
  /// default tools are used, still honoring the environment overrides.
  /// An explicitly named file that is missing or broken is an error.
  pub fn load_tools(&self) -> Result<(ToolPaths, HostArch)> {
    match find_config_path(self.config.as_deref()) {
      Ok(_) => {
        let config = self.load_config()?;
        Ok((config.tools, config.host.arch))
      }
      Err(ConfigError::NotFound { .. }) if self.config.is_none() => {
        let mut tools = ToolPaths::default();
        tools.apply_env_overrides();
        Ok((tools, HostArch::default()))
      }
      Err(e) => Err(e).context("No configuration to run with"),
    }
  }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BuildSelection {
  Host,
  Child,
  All,
}

impl BuildSelection {
  pub fn goal(self) -> Goal {
    match self {
      BuildSelection::Host => Goal::BuildHost,
      BuildSelection::Child => Goal::BuildChild,
      BuildSelection::All => Goal::BuildAll,
    }
  }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PlanGoal {
  Host,
  Child,
  All,
  Upload,
}

impl PlanGoal {
  pub fn goal(self) -> Goal {
    match self {
      PlanGoal::Host => Goal::BuildHost,
      PlanGoal::Child => Goal::BuildChild,
      PlanGoal::All => Goal::BuildAll,
      PlanGoal::Upload => Goal::Upload,
    }
  }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ArchArg {
  Avr,
  Mcs51,
  None,
}

impl From<ArchArg> for HostArch {
  fn from(arch: ArchArg) -> Self {
    match arch {
      ArchArg::Avr => HostArch::Avr,
      ArchArg::Mcs51 => HostArch::Mcs51,
      ArchArg::None => HostArch::None,
    }
  }
}

/// Attach the failure class to a pipeline error.
fn pipeline_failure(what: &str, err: PipelineError) -> anyhow::Error {
  let kind = err.kind();
  anyhow::Error::new(err).context(format!("{} failed ({} error)", what, kind))
}

fn display_path(path: &Path) -> String {
  path.display().to_string()
}
