//! The exposed build actions: `build(child)`, `build(host)` and
//! `upload(host)`, which also flashes the child.
//!
//! A `Pipeline` owns the frozen rule registry and the dependency graph and
//! walks the graph in order for each goal. Every hard error stops the walk
//! immediately; the only soft failure is a missing child artifact while
//! bridging, which lets host-only builds proceed.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::bridge::{BridgeError, BridgedArtifact, bridge_child_artifact, bridged_path, gen_dir};
use crate::config::{ConfigError, StitchConfig};
use crate::convert::ConvertError;
use crate::embed::{EmbedError, EmbeddedBlob, fragment_path};
use crate::graph::{Action, DependencyGraph, GraphError};
use crate::rules::{Expansion, RuleContext, RuleError, RuleRegistry};
use crate::sequence::{SequenceError, SequenceState, UploadSequencer, build_tool_command};
use crate::target::{Artifact, ArtifactState, Representation, TargetRole};
use crate::tool::{ToolError, run_inherited};

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("build failed: {0}")]
  Build(#[from] ToolError),

  #[error(transparent)]
  Convert(#[from] ConvertError),

  #[error(transparent)]
  Embed(#[from] EmbedError),

  #[error(transparent)]
  Bridge(#[from] BridgeError),

  #[error(transparent)]
  Rule(#[from] RuleError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Sequence(#[from] SequenceError),

  #[error("child firmware not available at {}; the child must build before the host can be uploaded", .0.display())]
  ChildUnavailable(PathBuf),

  #[error("hex to binary rule produced no artifact for {}", .0.display())]
  NoConversion(PathBuf),
}

/// Coarse classification of hard failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// An external tool failed or printed something unexpected.
  ToolInvocation,
  /// The host is flashed and the child is not.
  UploadSequence,
  /// A required input does not exist.
  MissingArtifact,
  Configuration,
  /// Rule or graph setup would loop, or a step ran out of order.
  Ordering,
  Filesystem,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      ErrorKind::ToolInvocation => "tool invocation",
      ErrorKind::UploadSequence => "upload sequence",
      ErrorKind::MissingArtifact => "missing artifact",
      ErrorKind::Configuration => "configuration",
      ErrorKind::Ordering => "ordering",
      ErrorKind::Filesystem => "filesystem",
    };
    write!(f, "{}", label)
  }
}

impl PipelineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::Config(_) => ErrorKind::Configuration,
      PipelineError::Build(_) => ErrorKind::ToolInvocation,
      PipelineError::Convert(e) => convert_kind(e),
      PipelineError::Embed(e) => embed_kind(e),
      PipelineError::Bridge(BridgeError::Io { .. }) => ErrorKind::Filesystem,
      PipelineError::Bridge(BridgeError::UnknownStrategy(_)) => ErrorKind::Configuration,
      PipelineError::Rule(RuleError::Convert(e)) => convert_kind(e),
      PipelineError::Rule(RuleError::Embed(e)) => embed_kind(e),
      PipelineError::Rule(_) | PipelineError::Graph(_) => ErrorKind::Ordering,
      PipelineError::Sequence(e) => match e {
        SequenceError::ChildUpload { .. } => ErrorKind::UploadSequence,
        SequenceError::HostUpload(_) => ErrorKind::ToolInvocation,
        SequenceError::InvalidTransition { .. } | SequenceError::StaleEmbed { .. } => ErrorKind::Ordering,
        SequenceError::MissingBinary { .. } | SequenceError::MissingHostImage { .. } => ErrorKind::MissingArtifact,
        SequenceError::Io { .. } => ErrorKind::Filesystem,
      },
      PipelineError::ChildUnavailable(_) | PipelineError::NoConversion(_) => ErrorKind::MissingArtifact,
    }
  }
}

fn convert_kind(err: &ConvertError) -> ErrorKind {
  match err {
    ConvertError::Tool(_) => ErrorKind::ToolInvocation,
    ConvertError::MissingInput(_) | ConvertError::WrongRepresentation { .. } => ErrorKind::MissingArtifact,
    ConvertError::Io { .. } => ErrorKind::Filesystem,
  }
}

fn embed_kind(err: &EmbedError) -> ErrorKind {
  match err {
    EmbedError::Tool(_) | EmbedError::UnexpectedFormat { .. } => ErrorKind::ToolInvocation,
    EmbedError::MissingInput(_) | EmbedError::NoIdentifier(_) => ErrorKind::MissingArtifact,
    EmbedError::BlobTooLarge { .. } => ErrorKind::Configuration,
    EmbedError::Io { .. } => ErrorKind::Filesystem,
  }
}

/// What a pipeline run should achieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
  /// Compile the child and convert its hex image.
  BuildChild,
  /// Bridge, embed and compile the host, using whatever child binary exists.
  BuildHost,
  /// Child then host.
  BuildAll,
  /// Everything, ending with the nested child upload.
  Upload,
}

impl Goal {
  /// The actions this goal runs, in execution order.
  pub fn actions(&self, graph: &DependencyGraph) -> Result<Vec<Action>, GraphError> {
    match self {
      Goal::BuildChild => graph.order_for(Action::ConvertHex(TargetRole::Child)),
      Goal::BuildHost => Ok(
        graph
          .order_for(Action::Build(TargetRole::Host))?
          .into_iter()
          .filter(|a| !matches!(a, Action::Build(TargetRole::Child) | Action::ConvertHex(TargetRole::Child)))
          .collect(),
      ),
      Goal::BuildAll => graph.order_for(Action::Build(TargetRole::Host)),
      Goal::Upload => graph.order_for(Action::Upload(TargetRole::Child)),
    }
  }
}

/// What happened during a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub goal: Goal,
  /// Actions that ran, in order.
  pub completed: Vec<Action>,
  pub child_binary: Option<Artifact>,
  pub bridged: Option<BridgedArtifact>,
  /// Sources handed to the host compile.
  pub generated_sources: Vec<PathBuf>,
  pub blobs: Vec<EmbeddedBlob>,
  /// Final upload state, for `Goal::Upload`.
  pub upload_state: Option<SequenceState>,
  /// Upload state transitions, in order.
  pub transitions: Vec<(SequenceState, SequenceState)>,
}

impl RunReport {
  fn new(goal: Goal) -> Self {
    Self {
      goal,
      completed: Vec::new(),
      child_binary: None,
      bridged: None,
      generated_sources: Vec::new(),
      blobs: Vec::new(),
      upload_state: None,
      transitions: Vec::new(),
    }
  }

  fn embedded(&self) -> Option<&EmbeddedBlob> {
    self.blobs.last()
  }
}

pub struct Pipeline<'a> {
  config: &'a StitchConfig,
  registry: RuleRegistry,
  graph: DependencyGraph,
}

impl<'a> Pipeline<'a> {
  /// Register rules and build the dependency graph. Both are frozen from
  /// here on.
  pub fn new(config: &'a StitchConfig) -> Result<Self, PipelineError> {
    Ok(Self {
      config,
      registry: RuleRegistry::standard()?,
      graph: DependencyGraph::pipeline()?,
    })
  }

  pub fn plan(&self, goal: Goal) -> Result<Vec<Action>, PipelineError> {
    Ok(goal.actions(&self.graph)?)
  }

  pub fn build_child(&self) -> Result<RunReport, PipelineError> {
    self.run(Goal::BuildChild)
  }

  pub fn build_host(&self) -> Result<RunReport, PipelineError> {
    self.run(Goal::BuildHost)
  }

  pub fn build_all(&self) -> Result<RunReport, PipelineError> {
    self.run(Goal::BuildAll)
  }

  /// Build both targets, flash the host, then flash the child.
  pub fn upload(&self) -> Result<RunReport, PipelineError> {
    self.run(Goal::Upload)
  }

  /// Bridge only.
  pub fn bridge(&self) -> Result<BridgedArtifact, PipelineError> {
    Ok(bridge_child_artifact(
      &self.config.host_target(),
      &self.config.child_target(),
      self.config.bridge.strategy,
    )?)
  }

  fn rule_context<'s>(&'s self, dir: &'s Path) -> RuleContext<'s> {
    RuleContext {
      objcopy: &self.config.tools.objcopy,
      xxd: &self.config.tools.xxd,
      arch: self.config.host.arch,
      gen_dir: dir,
    }
  }

  /// Walk the goal's actions in dependency order.
  pub fn run(&self, goal: Goal) -> Result<RunReport, PipelineError> {
    let actions = goal.actions(&self.graph)?;
    let mut report = RunReport::new(goal);
    let mut sequencer = UploadSequencer::new(self.config);

    info!(?goal, steps = actions.len(), "starting pipeline");

    for action in actions {
      info!(%action, "running");
      let result = self.step(action, goal, &mut report, &mut sequencer);
      if goal == Goal::Upload {
        report.upload_state = Some(sequencer.state());
        report.transitions = sequencer.transitions().to_vec();
      }
      result?;
      report.completed.push(action);
    }

    Ok(report)
  }

  fn step(
    &self,
    action: Action,
    goal: Goal,
    report: &mut RunReport,
    sequencer: &mut UploadSequencer<'_>,
  ) -> Result<(), PipelineError> {
    match action {
      Action::Build(role) => {
        if role == TargetRole::Host && goal == Goal::Upload {
          let blob = report
            .embedded()
            .ok_or_else(|| PipelineError::ChildUnavailable(bridged_path(&self.config.host_target().build_dir)))?;
          sequencer.begin_host_build(blob)?;
        }
        let env = &self.config.target(role).name;
        run_inherited(&build_tool_command(&self.config.tools.build, env, None, true))?;
      }
      Action::ConvertHex(role) => {
        let hex = self.config.target(role).hex_artifact();
        let dir = gen_dir(&self.config.host_target().build_dir);
        let ctx = self.rule_context(&dir);
        let rule = self
          .registry
          .resolve(&hex.path)
          .ok_or_else(|| PipelineError::NoConversion(hex.path.clone()))?;
        let applied = self.registry.apply(rule, &hex, &ctx)?;
        report.child_binary = Some(applied.artifact);
      }
      Action::Bridge => {
        report.bridged = Some(self.bridge()?);
      }
      Action::Embed => {
        let available = report.bridged.as_ref().is_some_and(|b| b.outcome.is_available());
        if !available {
          warn!("no child binary bridged, skipping embed");
          return Ok(());
        }
        let expansion = self.embed_bridged()?;
        report.generated_sources = expansion.sources.clone();
        report.blobs = expansion.blobs().cloned().collect();
      }
      Action::Upload(TargetRole::Host) => sequencer.upload_host()?,
      Action::Upload(TargetRole::Child) => sequencer.upload_child()?,
    }
    Ok(())
  }

  /// Expand the bridged binary into C source through the rule registry.
  pub fn embed_bridged(&self) -> Result<Expansion, PipelineError> {
    let host = self.config.host_target();
    let dir = gen_dir(&host.build_dir);
    let ctx = self.rule_context(&dir);
    Ok(
      self
        .registry
        .expand_for_compile(&host.name, &[bridged_path(&host.build_dir)], &ctx)?,
    )
  }

  /// Current state of every artifact the pipeline touches.
  pub fn artifact_status(&self) -> Vec<ArtifactStatus> {
    let child = self.config.child_target();
    let host = self.config.host_target();
    let child_hex = child.hex_artifact();
    let child_bin = child.bin_artifact();
    let bridged = bridged_path(&host.build_dir);
    let fragment = fragment_path(&bridged, &gen_dir(&host.build_dir));

    let mut status = vec![
      ArtifactStatus::new("child hex", child_hex.path.clone(), child_hex.state()),
      ArtifactStatus::new("child binary", child_bin.path.clone(), child_bin.state_against(&child_hex.path)),
    ];

    let bridged_artifact = Artifact::new(&host.name, "firmware", Representation::Binary, bridged);
    status.push(ArtifactStatus::new(
      "bridged binary",
      bridged_artifact.path.clone(),
      bridged_artifact.state_against(&child_bin.path),
    ));

    if let Some(fragment) = fragment {
      let fragment_artifact = Artifact::new(&host.name, "firmware", Representation::Source, fragment);
      status.push(ArtifactStatus::new(
        "generated source",
        fragment_artifact.path.clone(),
        fragment_artifact.state_against(&bridged_artifact.path),
      ));
    }

    let host_hex = host.hex_artifact();
    status.push(ArtifactStatus::new("host hex", host_hex.path.clone(), host_hex.state()));
    status
  }
}

/// One line of `artifact_status`.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStatus {
  pub label: &'static str,
  pub path: PathBuf,
  pub state: ArtifactState,
}

impl ArtifactStatus {
  fn new(label: &'static str, path: PathBuf, state: ArtifactState) -> Self {
    Self { label, path, state }
  }
}
