//! Blocking invocation of external tools.
//!
//! Every collaborator (converter, dump tool, outer build tool) is run here
//! as a synchronous subprocess with no timeout. A non-zero exit is always
//! an error; nothing is retried.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ToolError {
  /// The tool could not be started at all (missing binary, permissions).
  #[error("failed to run `{cmd}`: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command failed with exit code {code:?}: {cmd}{}", stderr_suffix(.stderr))]
  Failed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  /// The tool succeeded but printed something this crate does not recognise.
  #[error("unexpected output from `{cmd}`: expected {expected:?}; the tool's output format may have changed")]
  UnexpectedOutput { cmd: String, expected: String },

  #[error("output of `{cmd}` is not valid UTF-8")]
  InvalidUtf8 { cmd: String },
}

fn stderr_suffix(stderr: &str) -> String {
  let trimmed = stderr.trim();
  if trimmed.is_empty() {
    String::new()
  } else {
    format!("\n{}", trimmed)
  }
}

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
  program: PathBuf,
  args: Vec<OsString>,
}

impl ToolCommand {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
    }
  }

  pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
    self.args.push(arg.as_ref().to_os_string());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
    self
  }

  pub fn program(&self) -> &Path {
    &self.program
  }

  pub fn arguments(&self) -> &[OsString] {
    &self.args
  }

  fn command(&self) -> Command {
    let mut command = Command::new(&self.program);
    command.args(&self.args);
    command
  }
}

impl fmt::Display for ToolCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program.display())?;
    for arg in &self.args {
      write!(f, " {}", arg.to_string_lossy())?;
    }
    Ok(())
  }
}

/// Run a tool and capture its stdout.
///
/// Stderr is captured too and attached to the error on failure.
pub fn run_captured(tool: &ToolCommand) -> Result<String, ToolError> {
  info!(cmd = %tool, "running tool");

  let output = tool
    .command()
    .stdin(Stdio::null())
    .output()
    .map_err(|source| ToolError::Spawn {
      cmd: tool.to_string(),
      source,
    })?;

  let stderr = String::from_utf8_lossy(&output.stderr);
  if !stderr.is_empty() {
    debug!(stderr = %stderr, "tool stderr");
  }

  if !output.status.success() {
    return Err(ToolError::Failed {
      cmd: tool.to_string(),
      code: output.status.code(),
      stderr: stderr.into_owned(),
    });
  }

  String::from_utf8(output.stdout).map_err(|_| ToolError::InvalidUtf8 { cmd: tool.to_string() })
}

/// Run a tool with stdin, stdout and stderr passed through to this process.
pub fn run_inherited(tool: &ToolCommand) -> Result<(), ToolError> {
  info!(cmd = %tool, "running tool");

  let status = tool.command().status().map_err(|source| ToolError::Spawn {
    cmd: tool.to_string(),
    source,
  })?;

  if !status.success() {
    return Err(ToolError::Failed {
      cmd: tool.to_string(),
      code: status.code(),
      stderr: String::new(),
    });
  }

  debug!(cmd = %tool, "tool finished");
  Ok(())
}
