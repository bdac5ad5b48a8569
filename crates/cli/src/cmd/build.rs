//! Implementation of the `fwstitch build` command.

use std::time::Instant;

use anyhow::{Context, Result};

use fwstitch_lib::pipeline::Pipeline;

use super::{BuildSelection, GlobalOpts, pipeline_failure};
use crate::output::{print_json, print_run_report};

pub fn cmd_build(opts: &GlobalOpts, selection: BuildSelection) -> Result<()> {
  let config = opts.load_config()?;
  let pipeline = Pipeline::new(&config).context("Failed to set up build pipeline")?;

  let start = Instant::now();
  let report = pipeline
    .run(selection.goal())
    .map_err(|e| pipeline_failure("Build", e))?;

  if opts.output.is_json() {
    print_json(&report)?;
  } else {
    print_run_report(&report, start.elapsed());
  }

  Ok(())
}
