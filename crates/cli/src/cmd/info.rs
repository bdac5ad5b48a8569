//! Implementation of the `fwstitch info` command.
//!
//! Shows the resolved configuration and where every artifact stands.

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use fwstitch_lib::bridge::gen_dir;
use fwstitch_lib::config::StitchConfig;
use fwstitch_lib::pipeline::{ArtifactStatus, Pipeline};
use fwstitch_lib::target::ArtifactState;

use super::GlobalOpts;
use crate::output::{print_json, print_stat, symbols};

#[derive(Serialize)]
struct InfoOutput<'a> {
  config: &'a StitchConfig,
  artifacts: Vec<ArtifactStatus>,
}

pub fn cmd_info(opts: &GlobalOpts) -> Result<()> {
  let config = opts.load_config()?;
  let pipeline = Pipeline::new(&config).context("Failed to set up pipeline")?;
  let artifacts = pipeline.artifact_status();

  if opts.output.is_json() {
    return print_json(&InfoOutput {
      config: &config,
      artifacts,
    });
  }

  println!("Configuration:");
  print_stat("Build root", &config.build_root.display().to_string());
  print_stat("Host", &format!("{} ({:?})", config.host.env, config.host.arch));
  print_stat("Child", &config.child.env);
  print_stat("Bridge", config.bridge.strategy.as_str());
  print_stat("objcopy", &config.tools.objcopy.display().to_string());
  print_stat("xxd", &config.tools.xxd.display().to_string());
  print_stat("Build tool", &config.tools.build.display().to_string());
  // Generated sources are not passed to the host build; its own source
  // filter has to pick them up.
  print_stat(
    "Generated sources",
    &format!(
      "{} (include in the {} source filter)",
      gen_dir(&config.host_target().build_dir).display(),
      config.host.env
    ),
  );

  println!();
  println!("Artifacts:");
  for status in &artifacts {
    let marker = match status.state {
      ArtifactState::Present => symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
      ArtifactState::Stale => symbols::WARNING.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
      ArtifactState::Absent => symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    };
    println!("  {} {} [{}] {}", marker, status.label, status.state, status.path.display());
  }

  Ok(())
}
