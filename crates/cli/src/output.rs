//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, human-readable byte/duration formatting, and Unicode symbols.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use fwstitch_lib::bridge::{BridgeOutcome, BridgedArtifact};
use fwstitch_lib::embed::EmbeddedBlob;
use fwstitch_lib::pipeline::RunReport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

pub fn format_bytes(bytes: u64) -> String {
  const KB: u64 = 1024;
  const MB: u64 = KB * 1024;

  if bytes >= MB {
    format!("{:.1} MB", bytes as f64 / MB as f64)
  } else if bytes >= KB {
    format!("{:.1} KB", bytes as f64 / KB as f64)
  } else {
    format!("{} B", bytes)
  }
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// One line describing a bridge run.
pub fn describe_bridge(bridged: &BridgedArtifact) -> String {
  let dst = bridged.artifact.path.display();
  match bridged.outcome {
    BridgeOutcome::Copied => format!("Copied child firmware {} {}", symbols::ARROW, dst),
    BridgeOutcome::Linked => format!("Linked child firmware {} {}", symbols::ARROW, dst),
    BridgeOutcome::Fresh => format!("Child firmware already current at {}", dst),
    BridgeOutcome::Absent { removed_stale: true } => {
      format!("Child firmware not found at {}; removed stale copy", bridged.source.path.display())
    }
    BridgeOutcome::Absent { removed_stale: false } => {
      format!("Child firmware not found at {}", bridged.source.path.display())
    }
  }
}

pub fn print_bridge(bridged: &BridgedArtifact) {
  if bridged.outcome.is_available() {
    print_success(&describe_bridge(bridged));
  } else {
    print_warning(&describe_bridge(bridged));
  }
}

pub fn print_blob(blob: &EmbeddedBlob) {
  let verb = if blob.rewritten { "Embedded" } else { "Unchanged" };
  print_success(&format!(
    "{} {} {} {}",
    verb,
    blob.source.display(),
    symbols::ARROW,
    blob.output.path.display()
  ));
  print_stat("Identifier", &blob.identifier);
  print_stat("Size", &format_bytes(blob.len as u64));
  print_stat("Hash", blob.source_hash.short());
}

/// Text rendering of a pipeline run.
pub fn print_run_report(report: &RunReport, elapsed: Duration) {
  for action in &report.completed {
    print_success(&action.to_string());
  }

  if let Some(bin) = &report.child_binary {
    print_stat("Child binary", &bin.path.display().to_string());
  }
  if let Some(bridged) = &report.bridged {
    print_bridge(bridged);
  }
  for blob in &report.blobs {
    print_blob(blob);
  }
  if let Some(state) = report.upload_state {
    print_stat("Upload", &state.to_string());
  }

  println!();
  print_info(&format!("Finished in {}", format_duration(elapsed)));
}
