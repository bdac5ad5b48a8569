//! Turning a raw binary into a compilable C fragment.
//!
//! The byte dump itself comes from an `xxd`-compatible tool run as
//! `xxd -i -n <identifier> <binfile>`. Its output is then rewritten with a
//! fixed set of literal substitutions so the array is a fixed-width 8-bit
//! type placed in program memory and the length is a fixed-width 16-bit
//! value. Each literal must be present in the dump; a missing one means the
//! dump tool changed its output format and is reported as an error rather
//! than silently producing RAM-resident or wrongly typed data.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::MAX_BLOB_LEN;
use crate::target::{Artifact, Representation};
use crate::tool::{ToolCommand, ToolError, run_captured};
use crate::util::hash::{ContentHash, hash_file};

const BYTE_TYPE_LITERAL: &str = "unsigned char ";
const ARRAY_INIT_LITERAL: &str = "[] =";
const LEN_TYPE_LITERAL: &str = "unsigned int ";

#[derive(Debug, Error)]
pub enum EmbedError {
  #[error("binary input not found: {}", .0.display())]
  MissingInput(PathBuf),

  #[error("cannot derive an identifier from {}", .0.display())]
  NoIdentifier(PathBuf),

  #[error("{} is {len} bytes, more than the {max} a 16-bit length can describe", .path.display())]
  BlobTooLarge { path: PathBuf, len: usize, max: usize },

  #[error("dump tool failed: {0}")]
  Tool(#[from] ToolError),

  #[error("dump output is missing {expected:?}; the dump tool's output format may have changed")]
  UnexpectedFormat { expected: &'static str },

  #[error("io error at {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Host architecture, which decides where the embedded array lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostArch {
  /// AVR: `PROGMEM` attribute from `<avr/pgmspace.h>`.
  #[default]
  Avr,
  /// 8051 (SDCC): `__code` storage class.
  Mcs51,
  /// No address-space qualification; the array stays in default storage.
  None,
}

impl HostArch {
  /// Extra header to include after `<stdint.h>`.
  pub fn header(&self) -> Option<&'static str> {
    match self {
      HostArch::Avr => Some("avr/pgmspace.h"),
      HostArch::Mcs51 | HostArch::None => None,
    }
  }

  fn byte_type(&self) -> &'static str {
    match self {
      HostArch::Mcs51 => "const uint8_t __code ",
      HostArch::Avr | HostArch::None => "const uint8_t ",
    }
  }

  fn array_init(&self) -> &'static str {
    match self {
      HostArch::Avr => "[] PROGMEM =",
      HostArch::Mcs51 | HostArch::None => ARRAY_INIT_LITERAL,
    }
  }
}

/// Replace every character that cannot appear in a C identifier with `_`.
///
/// A leading digit (or an empty name) gets a `_` prefix.
pub fn sanitize_identifier(name: &str) -> String {
  let mut ident: String = name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
    .collect();
  if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
    ident.insert(0, '_');
  }
  ident
}

/// Identifier for the array embedded from `path`: its sanitized file stem.
pub fn identifier_for(path: &Path) -> Option<String> {
  let stem = path.file_stem()?.to_str()?;
  Some(sanitize_identifier(stem))
}

/// Rewrite raw dump output into the final C fragment, headers included.
pub fn render_fragment(dump: &str, arch: HostArch) -> Result<String, EmbedError> {
  for expected in [BYTE_TYPE_LITERAL, ARRAY_INIT_LITERAL, LEN_TYPE_LITERAL] {
    if !dump.contains(expected) {
      return Err(EmbedError::UnexpectedFormat { expected });
    }
  }

  let body = dump
    .replace(BYTE_TYPE_LITERAL, arch.byte_type())
    .replace(ARRAY_INIT_LITERAL, arch.array_init())
    .replace(LEN_TYPE_LITERAL, "const uint16_t ");

  let mut out = String::from("#include <stdint.h>\n");
  if let Some(header) = arch.header() {
    out.push_str(&format!("#include <{}>\n", header));
  }
  out.push('\n');
  out.push_str(&body);
  Ok(out)
}

/// The dump tool invocation for one binary.
pub fn dump_command(xxd: &Path, identifier: &str, bin: &Path) -> ToolCommand {
  ToolCommand::new(xxd).args(["-i", "-n", identifier]).arg(bin)
}

/// Output path of the fragment generated from `source` inside `gen_dir`.
pub fn fragment_path(source: &Path, gen_dir: &Path) -> Option<PathBuf> {
  let stem = source.file_stem()?;
  let mut name = stem.to_os_string();
  name.push(".");
  name.push(Representation::Source.extension());
  Some(gen_dir.join(name))
}

/// Result of embedding one binary.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddedBlob {
  pub identifier: String,
  pub source: PathBuf,
  pub output: Artifact,
  pub len: usize,
  /// Hash of the binary that was embedded, identifying its generation.
  pub source_hash: ContentHash,
  /// False when the fragment on disk already had this exact content.
  pub rewritten: bool,
}

/// Dump `source` into `<gen_dir>/<stem>.c`, creating `gen_dir` if needed.
///
/// The fragment is only rewritten when its content changes, so an
/// unchanged binary does not trigger a recompile of the host.
pub fn embed_binary(xxd: &Path, arch: HostArch, source: &Artifact, gen_dir: &Path) -> Result<EmbeddedBlob, EmbedError> {
  let path = &source.path;
  let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
    io::ErrorKind::NotFound => EmbedError::MissingInput(path.clone()),
    _ => EmbedError::Io {
      path: path.clone(),
      source: e,
    },
  })?;

  let len = metadata.len() as usize;
  if len > MAX_BLOB_LEN {
    return Err(EmbedError::BlobTooLarge {
      path: path.clone(),
      len,
      max: MAX_BLOB_LEN,
    });
  }

  let identifier = identifier_for(path).ok_or_else(|| EmbedError::NoIdentifier(path.clone()))?;
  let output_path = fragment_path(path, gen_dir).ok_or_else(|| EmbedError::NoIdentifier(path.clone()))?;

  std::fs::create_dir_all(gen_dir).map_err(|source| EmbedError::Io {
    path: gen_dir.to_path_buf(),
    source,
  })?;

  let source_hash = hash_file(path).map_err(|source| EmbedError::Io {
    path: path.clone(),
    source,
  })?;

  info!(src = %path.display(), identifier = %identifier, "embedding binary");
  let dump = run_captured(&dump_command(xxd, &identifier, path))?;
  let fragment = render_fragment(&dump, arch)?;

  let rewritten = match std::fs::read_to_string(&output_path) {
    Ok(existing) if existing == fragment => false,
    _ => {
      std::fs::write(&output_path, &fragment).map_err(|source| EmbedError::Io {
        path: output_path.clone(),
        source,
      })?;
      true
    }
  };

  debug!(out = %output_path.display(), len, rewritten, "fragment ready");

  Ok(EmbeddedBlob {
    identifier,
    source: path.clone(),
    output: Artifact::new(&source.target, &source.name, Representation::Source, output_path),
    len,
    source_hash,
    rewritten,
  })
}
