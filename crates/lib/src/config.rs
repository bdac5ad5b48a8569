//! Pipeline configuration.
//!
//! A `StitchConfig` is read once from `fwstitch.toml`, has its tool paths
//! overridden from the environment, is validated, and is then passed by
//! reference to every step. Nothing mutates it after `load` returns.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::bridge::BridgeStrategy;
use crate::consts::{BUILD_TOOL_ENV, CONFIG_ENV, CONFIG_FILENAME, OBJCOPY_ENV, XXD_ENV};
use crate::embed::HostArch;
use crate::target::{BuildTarget, TargetRole};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config file not found: {tried}")]
  NotFound { tried: String },

  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid config: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
  /// Build environment name of the host target.
  ///
  /// The generated array source lands in `<build_root>/<env>/xxd_gen/` and
  /// is not handed to the build tool; the environment's own source filter
  /// must include that directory.
  pub env: String,
  /// Architecture deciding how the embedded blob is placed in memory.
  #[serde(default)]
  pub arch: HostArch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChildConfig {
  pub env: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
  #[serde(default)]
  pub strategy: BridgeStrategy,
}

/// Paths (or bare names resolved through `PATH`) of the external tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolPaths {
  #[serde(default = "default_objcopy")]
  pub objcopy: PathBuf,
  #[serde(default = "default_xxd")]
  pub xxd: PathBuf,
  #[serde(default = "default_build_tool")]
  pub build: PathBuf,
}

impl Default for ToolPaths {
  fn default() -> Self {
    Self {
      objcopy: default_objcopy(),
      xxd: default_xxd(),
      build: default_build_tool(),
    }
  }
}

impl ToolPaths {
  /// Replace tool paths with `FWSTITCH_OBJCOPY`, `FWSTITCH_XXD` and
  /// `FWSTITCH_BUILD_TOOL` where set.
  pub fn apply_env_overrides(&mut self) {
    if let Some(path) = std::env::var_os(OBJCOPY_ENV) {
      self.objcopy = PathBuf::from(path);
    }
    if let Some(path) = std::env::var_os(XXD_ENV) {
      self.xxd = PathBuf::from(path);
    }
    if let Some(path) = std::env::var_os(BUILD_TOOL_ENV) {
      self.build = PathBuf::from(path);
    }
  }
}

fn default_objcopy() -> PathBuf {
  PathBuf::from("avr-objcopy")
}

fn default_xxd() -> PathBuf {
  PathBuf::from("xxd")
}

fn default_build_tool() -> PathBuf {
  PathBuf::from("pio")
}

fn default_build_root() -> PathBuf {
  PathBuf::from(".pio").join("build")
}

fn default_program_name() -> String {
  "firmware".to_string()
}

/// The complete, immutable pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StitchConfig {
  /// Outer build root; each environment builds into `<build_root>/<env>`.
  #[serde(default = "default_build_root")]
  pub build_root: PathBuf,

  /// Program name of the firmware images (`<program>.hex`).
  #[serde(default = "default_program_name")]
  pub program_name: String,

  pub host: HostConfig,
  pub child: ChildConfig,

  #[serde(default)]
  pub bridge: BridgeConfig,

  #[serde(default)]
  pub tools: ToolPaths,
}

impl StitchConfig {
  /// Load, resolve and validate a configuration file.
  ///
  /// A relative `build_root` is resolved against the directory holding the
  /// file. Tool paths are then overridden from `FWSTITCH_OBJCOPY`,
  /// `FWSTITCH_XXD` and `FWSTITCH_BUILD_TOOL` when set.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let base_dir = path
      .parent()
      .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
      .unwrap_or(Path::new("."));
    let base_dir = dunce::canonicalize(base_dir).unwrap_or_else(|_| base_dir.to_path_buf());

    let mut config: StitchConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    if config.build_root.is_relative() {
      config.build_root = base_dir.join(&config.build_root);
    }
    config.tools.apply_env_overrides();
    config.validate()?;

    debug!(path = %path.display(), build_root = %config.build_root.display(), "loaded config");
    Ok(config)
  }

  /// Parse a configuration from a string without touching the environment.
  ///
  /// `build_root` is kept exactly as written.
  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let config: StitchConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: PathBuf::from("<inline>"),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  /// Return a copy using a different bridge strategy.
  pub fn with_strategy(mut self, strategy: BridgeStrategy) -> Self {
    self.bridge.strategy = strategy;
    self
  }

  /// Check the invariants every later step relies on.
  pub fn validate(&self) -> Result<(), ConfigError> {
    for (label, env) in [("host.env", &self.host.env), ("child.env", &self.child.env)] {
      if env.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{} must not be empty", label)));
      }
      if env.contains('/') || env.contains('\\') || env == "." || env == ".." {
        return Err(ConfigError::Invalid(format!(
          "{} must be a plain environment name, got {:?}",
          label, env
        )));
      }
    }

    if self.host.env == self.child.env {
      return Err(ConfigError::Invalid(format!(
        "host and child must be different environments (both are {:?})",
        self.host.env
      )));
    }

    if self.program_name.trim().is_empty() {
      return Err(ConfigError::Invalid("program_name must not be empty".to_string()));
    }

    Ok(())
  }

  pub fn host_target(&self) -> BuildTarget {
    BuildTarget::new(TargetRole::Host, &self.host.env, &self.build_root, &self.program_name)
  }

  pub fn child_target(&self) -> BuildTarget {
    BuildTarget::new(TargetRole::Child, &self.child.env, &self.build_root, &self.program_name)
  }

  /// Target for a role.
  pub fn target(&self, role: TargetRole) -> BuildTarget {
    match role {
      TargetRole::Host => self.host_target(),
      TargetRole::Child => self.child_target(),
    }
  }
}

/// Find the configuration file to use.
///
/// Resolution order:
/// 1. An explicit path (must exist)
/// 2. `$FWSTITCH_CONFIG` (must exist)
/// 3. `./fwstitch.toml`
pub fn find_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
  if let Some(path) = explicit {
    if path.exists() {
      return Ok(path.to_path_buf());
    }
    return Err(ConfigError::NotFound {
      tried: path.display().to_string(),
    });
  }

  if let Some(path) = std::env::var_os(CONFIG_ENV) {
    let p = PathBuf::from(path);
    if p.exists() {
      return Ok(p);
    }
    return Err(ConfigError::NotFound {
      tried: format!("{} (from ${})", p.display(), CONFIG_ENV),
    });
  }

  let cwd_config = PathBuf::from(".").join(CONFIG_FILENAME);
  if cwd_config.exists() {
    return Ok(cwd_config);
  }

  Err(ConfigError::NotFound {
    tried: format!("./{} (set --config or ${})", CONFIG_FILENAME, CONFIG_ENV),
  })
}
