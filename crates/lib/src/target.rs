//! Build targets and the artifacts they produce.
//!
//! Targets and artifacts belong to the outer build engine. This crate only
//! derives their paths and observes whether the files exist.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Which side of the stitch a target is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetRole {
  /// The primary microcontroller whose firmware embeds the child image.
  Host,
  /// The secondary microcontroller whose firmware becomes a blob.
  Child,
}

impl TargetRole {
  pub fn as_str(&self) -> &'static str {
    match self {
      TargetRole::Host => "host",
      TargetRole::Child => "child",
    }
  }
}

impl fmt::Display for TargetRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// A named build environment with its own build directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTarget {
  pub role: TargetRole,
  /// Environment name understood by the outer build tool.
  pub name: String,
  /// `<build_root>/<name>`.
  pub build_dir: PathBuf,
  pub program_name: String,
}

impl BuildTarget {
  pub fn new(role: TargetRole, name: &str, build_root: &Path, program_name: &str) -> Self {
    Self {
      role,
      name: name.to_string(),
      build_dir: build_root.join(name),
      program_name: program_name.to_string(),
    }
  }

  /// The hex image the toolchain leaves in the build directory.
  pub fn hex_artifact(&self) -> Artifact {
    Artifact::new(
      &self.name,
      &self.program_name,
      Representation::Hex,
      self.build_dir.join(format!("{}.{}", self.program_name, Representation::Hex.extension())),
    )
  }

  /// The raw binary converted from the hex image.
  pub fn bin_artifact(&self) -> Artifact {
    Artifact::new(
      &self.name,
      &self.program_name,
      Representation::Binary,
      self.build_dir.join(format!("{}.{}", self.program_name, Representation::Binary.extension())),
    )
  }
}

/// Encoding of an artifact's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
  Hex,
  Binary,
  Source,
}

impl Representation {
  pub fn extension(&self) -> &'static str {
    match self {
      Representation::Hex => "hex",
      Representation::Binary => "bin",
      Representation::Source => "c",
    }
  }

  /// Guess the representation from a path's extension.
  pub fn from_path(path: &Path) -> Option<Self> {
    match path.extension()?.to_str()? {
      "hex" | "ihex" => Some(Representation::Hex),
      "bin" => Some(Representation::Binary),
      "c" => Some(Representation::Source),
      _ => None,
    }
  }
}

impl fmt::Display for Representation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Representation::Hex => write!(f, "hex"),
      Representation::Binary => write!(f, "binary"),
      Representation::Source => write!(f, "source"),
    }
  }
}

/// Observed existence of an artifact on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactState {
  Present,
  Absent,
  /// Present, but older than the input it was derived from.
  Stale,
}

impl fmt::Display for ArtifactState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ArtifactState::Present => write!(f, "present"),
      ArtifactState::Absent => write!(f, "absent"),
      ArtifactState::Stale => write!(f, "stale"),
    }
  }
}

/// A file identified by the target that produced it, its logical name and
/// its representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
  pub target: String,
  pub name: String,
  pub representation: Representation,
  pub path: PathBuf,
}

impl Artifact {
  pub fn new(target: &str, name: &str, representation: Representation, path: PathBuf) -> Self {
    Self {
      target: target.to_string(),
      name: name.to_string(),
      representation,
      path,
    }
  }

  /// Whether the file currently exists. Follows symlinks, so a dangling
  /// link counts as absent.
  pub fn exists(&self) -> bool {
    self.path.is_file()
  }

  /// Existence state, without a reference input to compare against.
  pub fn state(&self) -> ArtifactState {
    if self.exists() {
      ArtifactState::Present
    } else {
      ArtifactState::Absent
    }
  }

  /// Existence state relative to the artifact it was derived from.
  ///
  /// Stale when both exist and `input` was modified after this artifact.
  pub fn state_against(&self, input: &Path) -> ArtifactState {
    let Ok(own) = std::fs::metadata(&self.path).and_then(|m| m.modified()) else {
      return ArtifactState::Absent;
    };
    match std::fs::metadata(input).and_then(|m| m.modified()) {
      Ok(upstream) if upstream > own => ArtifactState::Stale,
      _ => ArtifactState::Present,
    }
  }
}

impl fmt::Display for Artifact {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{} ({})", self.target, self.name, self.representation)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::{Duration, SystemTime};
  use tempfile::TempDir;

  #[test]
  fn target_paths_follow_layout() {
    let target = BuildTarget::new(TargetRole::Child, "mcs51", Path::new("/b"), "firmware");
    assert_eq!(target.build_dir, PathBuf::from("/b/mcs51"));
    assert_eq!(target.hex_artifact().path, PathBuf::from("/b/mcs51/firmware.hex"));
    assert_eq!(target.bin_artifact().path, PathBuf::from("/b/mcs51/firmware.bin"));
    assert_eq!(target.bin_artifact().representation, Representation::Binary);
  }

  #[test]
  fn representation_from_path() {
    assert_eq!(Representation::from_path(Path::new("a.hex")), Some(Representation::Hex));
    assert_eq!(Representation::from_path(Path::new("a.bin")), Some(Representation::Binary));
    assert_eq!(Representation::from_path(Path::new("a.c")), Some(Representation::Source));
    assert_eq!(Representation::from_path(Path::new("a.elf")), None);
    assert_eq!(Representation::from_path(Path::new("noext")), None);
  }

  #[test]
  fn artifact_state_tracks_file() {
    let temp = TempDir::new().unwrap();
    let artifact = Artifact::new("t", "firmware", Representation::Binary, temp.path().join("f.bin"));
    assert_eq!(artifact.state(), ArtifactState::Absent);

    std::fs::write(&artifact.path, [1u8, 2, 3]).unwrap();
    assert_eq!(artifact.state(), ArtifactState::Present);
  }

  #[test]
  fn artifact_older_than_input_is_stale() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("f.hex");
    let output = temp.path().join("f.bin");
    std::fs::write(&input, ":00000001FF\n").unwrap();
    std::fs::write(&output, [0u8]).unwrap();

    let old = SystemTime::now() - Duration::from_secs(3600);
    std::fs::File::options().write(true).open(&output).unwrap().set_modified(old).unwrap();

    let artifact = Artifact::new("t", "firmware", Representation::Binary, output);
    assert_eq!(artifact.state_against(&input), ArtifactState::Stale);
  }

  #[test]
  fn artifact_newer_than_input_is_present() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("f.hex");
    let output = temp.path().join("f.bin");
    std::fs::write(&input, ":00000001FF\n").unwrap();
    std::fs::write(&output, [0u8]).unwrap();

    let old = SystemTime::now() - Duration::from_secs(3600);
    std::fs::File::options().write(true).open(&input).unwrap().set_modified(old).unwrap();

    let artifact = Artifact::new("t", "firmware", Representation::Binary, output);
    assert_eq!(artifact.state_against(&input), ArtifactState::Present);
  }

  #[test]
  fn artifact_display() {
    let artifact = Artifact::new("mcs51", "firmware", Representation::Hex, PathBuf::from("/x"));
    assert_eq!(artifact.to_string(), "mcs51:firmware (hex)");
  }
}
