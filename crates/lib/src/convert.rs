//! Hex to raw binary conversion.
//!
//! The bit-level work is delegated to an `objcopy`-compatible tool invoked
//! as `-I ihex -O binary <src> <dst>`. This module makes the conversion
//! all-or-nothing: the tool writes into a temporary sibling of the target,
//! which only replaces the target once the tool has exited successfully.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::target::{Artifact, Representation};
use crate::tool::{ToolCommand, ToolError, run_captured};

#[derive(Debug, Error)]
pub enum ConvertError {
  #[error("hex input not found: {}", .0.display())]
  MissingInput(PathBuf),

  #[error("{artifact} is not a hex artifact")]
  WrongRepresentation { artifact: String },

  #[error("converter failed: {0}")]
  Tool(#[from] ToolError),

  #[error("io error at {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// The exact converter invocation for `src` → `dst`.
pub fn converter_command(objcopy: &Path, src: &Path, dst: &Path) -> ToolCommand {
  ToolCommand::new(objcopy)
    .args(["-I", "ihex", "-O", "binary"])
    .arg(src)
    .arg(dst)
}

/// Convert a hex artifact into a raw binary at `target`.
///
/// On failure no file is left at `target`, not even one from an earlier
/// successful run, so a broken conversion can never be mistaken for a
/// current binary.
pub fn convert_hex_to_bin(objcopy: &Path, source: &Artifact, target: &Path) -> Result<Artifact, ConvertError> {
  if source.representation != Representation::Hex {
    return Err(ConvertError::WrongRepresentation {
      artifact: source.to_string(),
    });
  }
  if !source.exists() {
    return Err(ConvertError::MissingInput(source.path.clone()));
  }

  let parent = match target.parent() {
    Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
    _ => PathBuf::from("."),
  };
  std::fs::create_dir_all(&parent).map_err(|source| ConvertError::Io {
    path: parent.clone(),
    source,
  })?;

  let staging = tempfile::Builder::new()
    .prefix(".fwstitch-")
    .suffix(".bin.part")
    .tempfile_in(&parent)
    .map_err(|source| ConvertError::Io {
      path: parent.clone(),
      source,
    })?;

  info!(src = %source.path.display(), dst = %target.display(), "converting hex to binary");

  if let Err(err) = run_captured(&converter_command(objcopy, &source.path, staging.path())) {
    // `staging` is removed on drop; also drop whatever an older run left behind.
    remove_if_exists(target).map_err(|source| ConvertError::Io {
      path: target.to_path_buf(),
      source,
    })?;
    return Err(err.into());
  }

  // Temp files are created owner-only; the binary keeps the mode of the
  // file it replaces, or of its hex source on first conversion.
  let mode_source = if target.exists() { target } else { source.path.as_path() };
  let permissions = std::fs::metadata(mode_source)
    .map_err(|source| ConvertError::Io {
      path: mode_source.to_path_buf(),
      source,
    })?
    .permissions();
  // By path: the tool may have replaced the staging file rather than
  // written into it.
  std::fs::set_permissions(staging.path(), permissions).map_err(|source| ConvertError::Io {
    path: staging.path().to_path_buf(),
    source,
  })?;

  staging.persist(target).map_err(|e| ConvertError::Io {
    path: target.to_path_buf(),
    source: e.error,
  })?;

  debug!(dst = %target.display(), "binary written");

  Ok(Artifact::new(
    &source.target,
    &source.name,
    Representation::Binary,
    target.to_path_buf(),
  ))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
  match std::fs::remove_file(path) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    other => other,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn hex_artifact(path: PathBuf) -> Artifact {
    Artifact::new("mcs51", "firmware", Representation::Hex, path)
  }

  #[test]
  fn command_uses_fixed_format_flags() {
    let cmd = converter_command(Path::new("objcopy"), Path::new("in.hex"), Path::new("out.bin"));
    assert_eq!(cmd.to_string(), "objcopy -I ihex -O binary in.hex out.bin");
  }

  #[test]
  fn rejects_non_hex_source() {
    let temp = TempDir::new().unwrap();
    let source = Artifact::new("t", "firmware", Representation::Binary, temp.path().join("f.bin"));
    let err = convert_hex_to_bin(Path::new("objcopy"), &source, &temp.path().join("out.bin")).unwrap_err();
    assert!(matches!(err, ConvertError::WrongRepresentation { .. }));
  }

  #[test]
  fn missing_source_fails_before_running_tool() {
    let temp = TempDir::new().unwrap();
    let source = hex_artifact(temp.path().join("missing.hex"));
    let err = convert_hex_to_bin(&temp.path().join("no-tool"), &source, &temp.path().join("out.bin")).unwrap_err();
    assert!(matches!(err, ConvertError::MissingInput(_)));
  }

  #[cfg(unix)]
  mod with_tools {
    use super::*;
    use crate::util::testutil::{failing_objcopy, fake_objcopy};

    #[test]
    fn converts_into_target() {
      let temp = TempDir::new().unwrap();
      let objcopy = fake_objcopy(temp.path());
      let hex = temp.path().join("firmware.hex");
      std::fs::write(&hex, [0xDE, 0xAD, 0xBE, 0xEF]).unwrap();

      let out = temp.path().join("build").join("firmware.bin");
      let artifact = convert_hex_to_bin(&objcopy, &hex_artifact(hex), &out).unwrap();

      assert_eq!(artifact.path, out);
      assert_eq!(artifact.representation, Representation::Binary);
      assert_eq!(std::fs::read(&out).unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn conversion_is_idempotent() {
      let temp = TempDir::new().unwrap();
      let objcopy = fake_objcopy(temp.path());
      let hex = temp.path().join("firmware.hex");
      std::fs::write(&hex, b"\x01\x02\x03\x04\x05").unwrap();
      let out = temp.path().join("firmware.bin");

      convert_hex_to_bin(&objcopy, &hex_artifact(hex.clone()), &out).unwrap();
      let first = std::fs::read(&out).unwrap();
      convert_hex_to_bin(&objcopy, &hex_artifact(hex), &out).unwrap();
      let second = std::fs::read(&out).unwrap();

      assert_eq!(first, second);
    }

    #[test]
    fn failed_conversion_leaves_no_binary() {
      let temp = TempDir::new().unwrap();
      let objcopy = failing_objcopy(temp.path());
      let hex = temp.path().join("firmware.hex");
      std::fs::write(&hex, b"garbage").unwrap();
      let out_dir = temp.path().join("out");
      std::fs::create_dir(&out_dir).unwrap();
      let out = out_dir.join("firmware.bin");

      let err = convert_hex_to_bin(&objcopy, &hex_artifact(hex), &out).unwrap_err();

      assert!(matches!(err, ConvertError::Tool(ToolError::Failed { code: Some(1), .. })));
      assert!(!out.exists());
      assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0, "staging file left behind");
    }

    #[test]
    fn failed_conversion_removes_previous_binary() {
      let temp = TempDir::new().unwrap();
      let hex = temp.path().join("firmware.hex");
      std::fs::write(&hex, b"garbage").unwrap();
      let out = temp.path().join("firmware.bin");
      std::fs::write(&out, b"old generation").unwrap();

      let objcopy = failing_objcopy(temp.path());
      convert_hex_to_bin(&objcopy, &hex_artifact(hex), &out).unwrap_err();

      assert!(!out.exists());
    }

    #[test]
    fn binary_takes_mode_of_hex_source() {
      use std::os::unix::fs::PermissionsExt;

      let temp = TempDir::new().unwrap();
      let objcopy = fake_objcopy(temp.path());
      let hex = temp.path().join("firmware.hex");
      std::fs::write(&hex, b"\x01\x02").unwrap();
      std::fs::set_permissions(&hex, std::fs::Permissions::from_mode(0o644)).unwrap();
      let out = temp.path().join("firmware.bin");

      convert_hex_to_bin(&objcopy, &hex_artifact(hex), &out).unwrap();

      assert_eq!(std::fs::metadata(&out).unwrap().permissions().mode() & 0o777, 0o644);
    }

    #[test]
    fn binary_keeps_mode_of_replaced_file() {
      use std::os::unix::fs::PermissionsExt;

      let temp = TempDir::new().unwrap();
      let objcopy = fake_objcopy(temp.path());
      let hex = temp.path().join("firmware.hex");
      std::fs::write(&hex, b"\x01\x02").unwrap();
      std::fs::set_permissions(&hex, std::fs::Permissions::from_mode(0o644)).unwrap();
      let out = temp.path().join("firmware.bin");
      std::fs::write(&out, b"old generation").unwrap();
      std::fs::set_permissions(&out, std::fs::Permissions::from_mode(0o640)).unwrap();

      convert_hex_to_bin(&objcopy, &hex_artifact(hex), &out).unwrap();

      assert_eq!(std::fs::read(&out).unwrap(), vec![0x01, 0x02]);
      assert_eq!(std::fs::metadata(&out).unwrap().permissions().mode() & 0o777, 0o640);
    }
  }
}
