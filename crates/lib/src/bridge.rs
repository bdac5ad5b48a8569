//! Making the child's binary visible inside the host build tree.
//!
//! The child binary is the child target's converted image,
//! `<build_root>/<child-env>/<program>.bin` (`firmware.bin` by default), a
//! sibling of the host build directory. It is bridged to
//! `<host-build-dir>/xxd_gen/firmware.bin` either as a private copy or as a
//! symbolic link. The bridged file is never trusted: every bridge re-checks
//! it against the child artifact and replaces it when it differs.
//!
//! A missing child artifact is not an error. The host may be built on its
//! own before the child exists; the bridge then warns, removes any stale
//! bridged file along with the source generated from it, and reports
//! `BridgeOutcome::Absent`.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::{CHILD_BIN_NAME, GEN_DIR};
use crate::embed::fragment_path;
use crate::target::{Artifact, BuildTarget, Representation};
use crate::util::hash::hash_file;

#[derive(Debug, Error)]
pub enum BridgeError {
  #[error("io error at {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("unknown bridge strategy {0:?} (expected \"copy\" or \"link\")")]
  UnknownStrategy(String),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> BridgeError + '_ {
  move |source| BridgeError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// How the child artifact is made visible in the host tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeStrategy {
  /// Private snapshot of the bytes. Survives the child tree being cleaned,
  /// goes stale if the child rebuilds without a new bridge.
  #[default]
  Copy,
  /// Symbolic link to the child artifact. Always current, breaks if the
  /// child tree is cleaned.
  Link,
}

impl BridgeStrategy {
  pub fn as_str(&self) -> &'static str {
    match self {
      BridgeStrategy::Copy => "copy",
      BridgeStrategy::Link => "link",
    }
  }
}

impl fmt::Display for BridgeStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for BridgeStrategy {
  type Err = BridgeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "copy" => Ok(BridgeStrategy::Copy),
      "link" | "symlink" => Ok(BridgeStrategy::Link),
      _ => Err(BridgeError::UnknownStrategy(s.to_string())),
    }
  }
}

/// What a bridge run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum BridgeOutcome {
  /// Bytes were copied (destination was missing or differed).
  Copied,
  /// A link was created or repointed.
  Linked,
  /// The destination already matched the child artifact.
  Fresh,
  /// The child artifact does not exist; nothing was bridged.
  Absent { removed_stale: bool },
}

impl BridgeOutcome {
  pub fn is_available(&self) -> bool {
    !matches!(self, BridgeOutcome::Absent { .. })
  }
}

/// The child artifact as seen from the host build tree.
#[derive(Debug, Clone, Serialize)]
pub struct BridgedArtifact {
  /// The producing (child) artifact.
  pub source: Artifact,
  /// The copy or link inside the host tree.
  pub artifact: Artifact,
  pub strategy: BridgeStrategy,
  pub outcome: BridgeOutcome,
}

/// Generated-sources directory of the host.
pub fn gen_dir(host_build_dir: &Path) -> PathBuf {
  host_build_dir.join(GEN_DIR)
}

/// Where the bridged binary lives inside the host tree.
pub fn bridged_path(host_build_dir: &Path) -> PathBuf {
  gen_dir(host_build_dir).join(CHILD_BIN_NAME)
}

/// Bridge the child's binary into the host build tree.
///
/// The generated-sources directory is created even when the child artifact
/// is absent, so later steps can rely on it.
pub fn bridge_child_artifact(
  host: &BuildTarget,
  child: &BuildTarget,
  strategy: BridgeStrategy,
) -> Result<BridgedArtifact, BridgeError> {
  let source = child.bin_artifact();
  let src = source.path.clone();
  let dst = bridged_path(&host.build_dir);
  let dir = gen_dir(&host.build_dir);

  std::fs::create_dir_all(&dir).map_err(io_err(&dir))?;

  let artifact = Artifact::new(&host.name, "firmware", Representation::Binary, dst.clone());

  let outcome = if !src.is_file() {
    let removed_bin = remove_existing(&dst)?;
    // The fragment was generated from the binary just removed.
    let removed_fragment = match fragment_path(&dst, &dir) {
      Some(fragment) => remove_existing(&fragment)?,
      None => false,
    };
    let removed_stale = removed_bin || removed_fragment;
    warn!(
      path = %src.display(),
      "child firmware not found, {} build may be out of date",
      host.name
    );
    BridgeOutcome::Absent { removed_stale }
  } else {
    match strategy {
      BridgeStrategy::Copy => bridge_copy(&src, &dst)?,
      BridgeStrategy::Link => bridge_link(&src, &dst)?,
    }
  };

  info!(src = %src.display(), dst = %dst.display(), strategy = %strategy, ?outcome, "bridged child artifact");

  Ok(BridgedArtifact {
    source,
    artifact,
    strategy,
    outcome,
  })
}

fn bridge_copy(src: &Path, dst: &Path) -> Result<BridgeOutcome, BridgeError> {
  if let Ok(meta) = std::fs::symlink_metadata(dst)
    && meta.file_type().is_file()
  {
    let src_hash = hash_file(src).map_err(io_err(src))?;
    let dst_hash = hash_file(dst).map_err(io_err(dst))?;
    if src_hash == dst_hash {
      debug!(hash = %src_hash.short(), "bridged copy is current");
      return Ok(BridgeOutcome::Fresh);
    }
  }

  let dir = dst.parent().unwrap_or_else(|| Path::new("."));
  let staging = tempfile::Builder::new()
    .prefix(".fwstitch-")
    .suffix(".bin.part")
    .tempfile_in(dir)
    .map_err(io_err(dir))?;

  std::fs::copy(src, staging.path()).map_err(io_err(src))?;
  if let Ok(modified) = std::fs::metadata(src).and_then(|m| m.modified()) {
    staging.as_file().set_modified(modified).map_err(io_err(staging.path()))?;
  }

  // A link at the destination would make `persist` write through it on
  // some platforms; replace the link itself.
  remove_existing(dst)?;
  staging.persist(dst).map_err(|e| BridgeError::Io {
    path: dst.to_path_buf(),
    source: e.error,
  })?;

  Ok(BridgeOutcome::Copied)
}

fn bridge_link(src: &Path, dst: &Path) -> Result<BridgeOutcome, BridgeError> {
  let target = dunce::canonicalize(src).map_err(io_err(src))?;

  if let Ok(meta) = std::fs::symlink_metadata(dst)
    && meta.file_type().is_symlink()
    && dunce::canonicalize(dst).ok().as_deref() == Some(target.as_path())
  {
    debug!(target = %target.display(), "bridged link is current");
    return Ok(BridgeOutcome::Fresh);
  }

  remove_existing(dst)?;
  create_symlink(&target, dst).map_err(io_err(dst))?;
  Ok(BridgeOutcome::Linked)
}

/// Remove a file or link at `path`. Returns whether anything was removed.
fn remove_existing(path: &Path) -> Result<bool, BridgeError> {
  match std::fs::remove_file(path) {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(BridgeError::Io {
      path: path.to_path_buf(),
      source: e,
    }),
  }
}

fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
  #[cfg(unix)]
  {
    std::os::unix::fs::symlink(target, link)
  }
  #[cfg(windows)]
  {
    std::os::windows::fs::symlink_file(target, link)
  }
}
