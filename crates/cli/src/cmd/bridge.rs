//! Implementation of the `fwstitch bridge` command.

use anyhow::{Context, Result};

use fwstitch_lib::bridge::bridge_child_artifact;

use super::GlobalOpts;
use crate::output::{print_bridge, print_json};

pub fn cmd_bridge(opts: &GlobalOpts) -> Result<()> {
  let config = opts.load_config()?;
  let bridged = bridge_child_artifact(&config.host_target(), &config.child_target(), config.bridge.strategy)
    .context("Failed to bridge child firmware")?;

  if opts.output.is_json() {
    print_json(&bridged)?;
  } else {
    print_bridge(&bridged);
  }

  Ok(())
}
