//! Upload ordering.
//!
//! ```text
//! Idle → HostBuilding → HostUploading → ChildUploading → Done
//!                 \             \               \
//!                  +-------------+---------------+→ Failed
//! ```
//!
//! The host is flashed first. Only after its upload succeeded does a
//! second, independent invocation of the outer build tool flash the child,
//! with auto-clean disabled so that invocation cannot delete the artifacts
//! that were just bridged into the host tree. A failing child upload after
//! a successful host upload is reported as such and never retried.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::bridge::bridged_path;
use crate::config::StitchConfig;
use crate::consts::DISABLE_AUTO_CLEAN_FLAG;
use crate::embed::EmbeddedBlob;
use crate::tool::{ToolCommand, ToolError, run_inherited};
use crate::util::hash::{ContentHash, hash_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceState {
  Idle,
  HostBuilding,
  HostUploading,
  ChildUploading,
  Done,
  Failed,
}

impl fmt::Display for SequenceState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      SequenceState::Idle => "idle",
      SequenceState::HostBuilding => "host-building",
      SequenceState::HostUploading => "host-uploading",
      SequenceState::ChildUploading => "child-uploading",
      SequenceState::Done => "done",
      SequenceState::Failed => "failed",
    };
    write!(f, "{}", name)
  }
}

#[derive(Debug, Error)]
pub enum SequenceError {
  #[error("cannot {attempted} in state {state}")]
  InvalidTransition {
    state: SequenceState,
    attempted: &'static str,
  },

  #[error("bridged binary not found at {}; build the child target first", .path.display())]
  MissingBinary { path: PathBuf },

  #[error(
    "embedded blob was generated from {}, but the bridged binary is now {}; rebuild the host",
    .embedded.short(), .current.short()
  )]
  StaleEmbed {
    embedded: ContentHash,
    current: ContentHash,
  },

  #[error("host firmware image not found at {}", .path.display())]
  MissingHostImage { path: PathBuf },

  #[error("host upload failed: {0}")]
  HostUpload(#[source] ToolError),

  /// The host is flashed and the child is not.
  #[error(
    "host `{host}` was flashed but uploading child `{child}` failed; \
     the device is in an inconsistent state: {source}"
  )]
  ChildUpload {
    host: String,
    child: String,
    #[source]
    source: ToolError,
  },

  #[error("io error at {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// `<build-tool> run -e <env> [-t <target>] [--disable-auto-clean]`.
pub fn build_tool_command(tool: &Path, env: &str, target: Option<&str>, disable_auto_clean: bool) -> ToolCommand {
  let mut cmd = ToolCommand::new(tool).args(["run", "-e", env]);
  if let Some(target) = target {
    cmd = cmd.args(["-t", target]);
  }
  if disable_auto_clean {
    cmd = cmd.arg(DISABLE_AUTO_CLEAN_FLAG);
  }
  cmd
}

/// Drives one host-then-child upload.
#[derive(Debug)]
pub struct UploadSequencer<'a> {
  config: &'a StitchConfig,
  state: SequenceState,
  transitions: Vec<(SequenceState, SequenceState)>,
}

impl<'a> UploadSequencer<'a> {
  pub fn new(config: &'a StitchConfig) -> Self {
    Self {
      config,
      state: SequenceState::Idle,
      transitions: Vec::new(),
    }
  }

  pub fn state(&self) -> SequenceState {
    self.state
  }

  /// Every state change so far, in order.
  pub fn transitions(&self) -> &[(SequenceState, SequenceState)] {
    &self.transitions
  }

  fn transition(&mut self, to: SequenceState) {
    info!(from = %self.state, to = %to, "upload sequence");
    self.transitions.push((self.state, to));
    self.state = to;
  }

  fn expect_state(&self, expected: SequenceState, attempted: &'static str) -> Result<(), SequenceError> {
    if self.state != expected {
      return Err(SequenceError::InvalidTransition {
        state: self.state,
        attempted,
      });
    }
    Ok(())
  }

  fn fail<T>(&mut self, err: SequenceError) -> Result<T, SequenceError> {
    error!(error = %err, "upload sequence failed");
    self.transition(SequenceState::Failed);
    Err(err)
  }

  /// `Idle → HostBuilding`.
  ///
  /// `embedded` must come from the binary currently bridged into the host
  /// tree; an embed from an older generation is refused.
  pub fn begin_host_build(&mut self, embedded: &EmbeddedBlob) -> Result<(), SequenceError> {
    self.expect_state(SequenceState::Idle, "start the host build")?;

    let bridged = bridged_path(&self.config.host_target().build_dir);
    if !bridged.is_file() {
      return self.fail(SequenceError::MissingBinary { path: bridged });
    }
    let current = match hash_file(&bridged) {
      Ok(hash) => hash,
      Err(source) => return self.fail(SequenceError::Io { path: bridged, source }),
    };
    if current != embedded.source_hash {
      return self.fail(SequenceError::StaleEmbed {
        embedded: embedded.source_hash.clone(),
        current,
      });
    }

    self.transition(SequenceState::HostBuilding);
    Ok(())
  }

  /// `HostBuilding → HostUploading`, then flash the host.
  pub fn upload_host(&mut self) -> Result<(), SequenceError> {
    self.expect_state(SequenceState::HostBuilding, "upload the host")?;

    let host = self.config.host_target();
    let image = host.hex_artifact().path;
    if !image.is_file() {
      return self.fail(SequenceError::MissingHostImage { path: image });
    }
    let bridged = bridged_path(&host.build_dir);
    if !bridged.is_file() {
      return self.fail(SequenceError::MissingBinary { path: bridged });
    }

    self.transition(SequenceState::HostUploading);

    let cmd = build_tool_command(&self.config.tools.build, &host.name, Some("upload"), true);
    if let Err(err) = run_inherited(&cmd) {
      return self.fail(SequenceError::HostUpload(err));
    }
    info!(env = %host.name, "host uploaded");
    Ok(())
  }

  /// `HostUploading → ChildUploading → Done`.
  ///
  /// Runs the nested child upload with auto-clean disabled.
  pub fn upload_child(&mut self) -> Result<(), SequenceError> {
    self.expect_state(SequenceState::HostUploading, "upload the child")?;
    self.transition(SequenceState::ChildUploading);

    let config = self.config;
    let child = &config.child.env;
    let cmd = build_tool_command(&config.tools.build, child, Some("upload"), true);
    if let Err(source) = run_inherited(&cmd) {
      return self.fail(SequenceError::ChildUpload {
        host: config.host.env.clone(),
        child: child.clone(),
        source,
      });
    }

    self.transition(SequenceState::Done);
    Ok(())
  }
}
