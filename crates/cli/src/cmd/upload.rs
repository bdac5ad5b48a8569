//! Implementation of the `fwstitch upload` command.
//!
//! Builds both targets, flashes the host and then the child. A child
//! upload failing after the host was flashed leaves the device half
//! updated, which is reported separately from ordinary failures.

use std::time::Instant;

use anyhow::{Context, Result};

use fwstitch_lib::pipeline::{ErrorKind, Pipeline};

use super::{GlobalOpts, pipeline_failure};
use crate::output::{print_error, print_json, print_run_report};

pub fn cmd_upload(opts: &GlobalOpts) -> Result<()> {
  let config = opts.load_config()?;
  let pipeline = Pipeline::new(&config).context("Failed to set up upload pipeline")?;

  let start = Instant::now();
  let report = match pipeline.upload() {
    Ok(report) => report,
    Err(e) => {
      if e.kind() == ErrorKind::UploadSequence {
        print_error(&format!(
          "{} is flashed but {} is not; re-run `fwstitch upload` before using the device",
          config.host.env, config.child.env
        ));
      }
      return Err(pipeline_failure("Upload", e));
    }
  };

  if opts.output.is_json() {
    print_json(&report)?;
  } else {
    print_run_report(&report, start.elapsed());
  }

  Ok(())
}
