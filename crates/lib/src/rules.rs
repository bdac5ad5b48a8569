//! Suffix-driven build rules.
//!
//! A rule maps files ending in one suffix to files ending in another through
//! a fixed action. Rules are collected by a `RegistryBuilder` during setup
//! and frozen into a `RuleRegistry`; nothing can be registered once
//! resolution starts.
//!
//! The standard registry knows two rules:
//! - `.hex` → `.bin` through the converter, next to the hex image
//! - `.bin` → `.c` through the embedder, in the generated-sources directory
//!
//! so any binary handed to the compile step is first expanded into C source.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::convert::{ConvertError, convert_hex_to_bin};
use crate::embed::{EmbedError, EmbeddedBlob, HostArch, embed_binary};
use crate::target::{Artifact, Representation};

#[derive(Debug, Error)]
pub enum RuleError {
  #[error("rule {rule}: suffixes must not be empty")]
  EmptySuffix { rule: &'static str },

  #[error("rule {rule}: source and target suffix are both {suffix:?}")]
  SameSuffix { rule: &'static str, suffix: &'static str },

  #[error("rule {rule}: a rule for {suffix:?} is already registered")]
  Duplicate { rule: &'static str, suffix: &'static str },

  #[error("rule {rule}: would form a cycle through {suffix:?}")]
  Cycle { rule: &'static str, suffix: &'static str },

  #[error("{} has no file name", .0.display())]
  NoFileName(PathBuf),

  #[error(transparent)]
  Convert(#[from] ConvertError),

  #[error(transparent)]
  Embed(#[from] EmbedError),
}

/// The conversion a rule performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
  /// Intel HEX → raw binary.
  HexToBin,
  /// Raw binary → C array fragment.
  BinToSource,
}

/// Where a rule's output is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Naming {
  /// Next to the source, with the suffix swapped.
  BesideSource,
  /// In the generated-sources directory, with the suffix swapped.
  GeneratedDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRule {
  pub name: &'static str,
  pub source_suffix: &'static str,
  pub target_suffix: &'static str,
  pub action: RuleAction,
  pub naming: Naming,
}

impl BuildRule {
  pub fn hex_to_bin() -> Self {
    Self {
      name: "hex-to-bin",
      source_suffix: ".hex",
      target_suffix: ".bin",
      action: RuleAction::HexToBin,
      naming: Naming::BesideSource,
    }
  }

  pub fn bin_to_source() -> Self {
    Self {
      name: "bin-to-source",
      source_suffix: ".bin",
      target_suffix: ".c",
      action: RuleAction::BinToSource,
      naming: Naming::GeneratedDir,
    }
  }

  pub fn matches(&self, path: &Path) -> bool {
    path
      .file_name()
      .and_then(|n| n.to_str())
      .is_some_and(|n| n.len() > self.source_suffix.len() && n.ends_with(self.source_suffix))
  }

  /// Output path for `source`.
  pub fn target_path(&self, source: &Path, gen_dir: &Path) -> Result<PathBuf, RuleError> {
    let file_name = source
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| RuleError::NoFileName(source.to_path_buf()))?;
    let stem = file_name.strip_suffix(self.source_suffix).unwrap_or(file_name);
    let name = format!("{}{}", stem, self.target_suffix);

    Ok(match self.naming {
      Naming::BesideSource => source.with_file_name(name),
      Naming::GeneratedDir => gen_dir.join(name),
    })
  }
}

/// Tools and locations a rule needs when it runs.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
  pub objcopy: &'a Path,
  pub xxd: &'a Path,
  pub arch: HostArch,
  pub gen_dir: &'a Path,
}

/// Output of one rule application.
#[derive(Debug, Clone, Serialize)]
pub struct Applied {
  pub rule: &'static str,
  pub artifact: Artifact,
  /// Set when the rule embedded a binary.
  pub blob: Option<EmbeddedBlob>,
}

/// Rules under construction. Consumed by `build`.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
  rules: Vec<BuildRule>,
}

impl RegistryBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a rule, rejecting anything that could make resolution loop.
  pub fn register(mut self, rule: BuildRule) -> Result<Self, RuleError> {
    if rule.source_suffix.is_empty() || rule.target_suffix.is_empty() {
      return Err(RuleError::EmptySuffix { rule: rule.name });
    }
    if rule.source_suffix == rule.target_suffix {
      return Err(RuleError::SameSuffix {
        rule: rule.name,
        suffix: rule.source_suffix,
      });
    }
    if self.rules.iter().any(|r| r.source_suffix == rule.source_suffix) {
      return Err(RuleError::Duplicate {
        rule: rule.name,
        suffix: rule.source_suffix,
      });
    }

    // Follow the chain starting at the new rule's output; reaching its input
    // again means the rules would feed each other forever.
    let mut suffix = rule.target_suffix;
    while let Some(next) = self.rules.iter().find(|r| r.source_suffix == suffix) {
      if next.target_suffix == rule.source_suffix {
        return Err(RuleError::Cycle {
          rule: rule.name,
          suffix: rule.source_suffix,
        });
      }
      suffix = next.target_suffix;
    }

    debug!(rule = rule.name, from = rule.source_suffix, to = rule.target_suffix, "registered rule");
    self.rules.push(rule);
    Ok(self)
  }

  pub fn build(self) -> RuleRegistry {
    RuleRegistry { rules: self.rules }
  }
}

/// A frozen set of rules.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
  rules: Vec<BuildRule>,
}

impl RuleRegistry {
  /// The `.hex → .bin → .c` chain.
  pub fn standard() -> Result<Self, RuleError> {
    Ok(
      RegistryBuilder::new()
        .register(BuildRule::hex_to_bin())?
        .register(BuildRule::bin_to_source())?
        .build(),
    )
  }

  pub fn rules(&self) -> &[BuildRule] {
    &self.rules
  }

  /// The rule whose source suffix matches `path`, if any.
  pub fn resolve(&self, path: &Path) -> Option<&BuildRule> {
    self.rules.iter().find(|r| r.matches(path))
  }

  /// Run one rule on `source`.
  pub fn apply(&self, rule: &BuildRule, source: &Artifact, ctx: &RuleContext<'_>) -> Result<Applied, RuleError> {
    let target = rule.target_path(&source.path, ctx.gen_dir)?;
    match rule.action {
      RuleAction::HexToBin => {
        let artifact = convert_hex_to_bin(ctx.objcopy, source, &target)?;
        Ok(Applied {
          rule: rule.name,
          artifact,
          blob: None,
        })
      }
      RuleAction::BinToSource => {
        let dir = target.parent().unwrap_or(ctx.gen_dir);
        let blob = embed_binary(ctx.xxd, ctx.arch, source, dir)?;
        Ok(Applied {
          rule: rule.name,
          artifact: blob.output.clone(),
          blob: Some(blob),
        })
      }
    }
  }

  /// Expand build inputs into what the compile-to-object step consumes.
  ///
  /// Each input is run through matching rules until none applies. Inputs
  /// no rule matches pass through untouched. Order is preserved.
  pub fn expand_for_compile(
    &self,
    target_name: &str,
    inputs: &[PathBuf],
    ctx: &RuleContext<'_>,
  ) -> Result<Expansion, RuleError> {
    let mut expansion = Expansion::default();

    for input in inputs {
      let representation = Representation::from_path(input).unwrap_or(Representation::Source);
      let mut current = Artifact::new(target_name, &logical_name(input), representation, input.clone());

      while let Some(rule) = self.resolve(&current.path) {
        let applied = self.apply(rule, &current, ctx)?;
        current = applied.artifact.clone();
        expansion.applied.push(applied);
      }

      expansion.sources.push(current.path);
    }

    Ok(expansion)
  }
}

/// Result of `expand_for_compile`.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Expansion {
  /// Compile inputs, in input order.
  pub sources: Vec<PathBuf>,
  /// Every rule application, in execution order.
  pub applied: Vec<Applied>,
}

impl Expansion {
  /// Blobs embedded along the way.
  pub fn blobs(&self) -> impl Iterator<Item = &EmbeddedBlob> {
    self.applied.iter().filter_map(|a| a.blob.as_ref())
  }
}

fn logical_name(path: &Path) -> String {
  path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default()
}
