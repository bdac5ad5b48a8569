//! Implementation of the `fwstitch embed` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use fwstitch_lib::bridge::gen_dir;
use fwstitch_lib::embed::{HostArch, embed_binary};
use fwstitch_lib::target::{Artifact, Representation};

use super::{ArchArg, GlobalOpts, display_path};
use crate::output::{print_blob, print_json};

pub fn cmd_embed(opts: &GlobalOpts, bin: &Path, out_dir: Option<&Path>, arch: Option<ArchArg>) -> Result<()> {
  let out_dir: PathBuf = match out_dir {
    Some(dir) => dir.to_path_buf(),
    None => {
      let config = opts
        .load_config()
        .context("--out-dir is required without a configuration")?;
      gen_dir(&config.host_target().build_dir)
    }
  };

  let (tools, config_arch) = opts.load_tools()?;
  let arch = arch.map(HostArch::from).unwrap_or(config_arch);

  let name = bin.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
  let source = Artifact::new("cli", &name, Representation::Binary, bin.to_path_buf());

  let blob = embed_binary(&tools.xxd, arch, &source, &out_dir)
    .with_context(|| format!("Failed to embed {}", display_path(bin)))?;

  if opts.output.is_json() {
    print_json(&blob)?;
  } else {
    print_blob(&blob);
  }

  Ok(())
}
