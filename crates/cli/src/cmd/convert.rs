//! Implementation of the `fwstitch convert` command.

use std::path::Path;

use anyhow::{Context, Result};

use fwstitch_lib::convert::convert_hex_to_bin;
use fwstitch_lib::target::{Artifact, Representation};

use super::{GlobalOpts, display_path};
use crate::output::{format_bytes, print_json, print_stat, print_success, symbols};

pub fn cmd_convert(opts: &GlobalOpts, hex: &Path, bin: &Path) -> Result<()> {
  let (tools, _) = opts.load_tools()?;

  let name = hex.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
  let source = Artifact::new("cli", &name, Representation::Hex, hex.to_path_buf());

  let artifact = convert_hex_to_bin(&tools.objcopy, &source, bin)
    .with_context(|| format!("Failed to convert {}", display_path(hex)))?;

  if opts.output.is_json() {
    print_json(&artifact)?;
  } else {
    print_success(&format!("{} {} {}", hex.display(), symbols::ARROW, artifact.path.display()));
    if let Ok(meta) = std::fs::metadata(&artifact.path) {
      print_stat("Size", &format_bytes(meta.len()));
    }
  }

  Ok(())
}
