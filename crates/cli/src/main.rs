mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fwstitch_lib::bridge::BridgeStrategy;

use crate::cmd::{ArchArg, BuildSelection, GlobalOpts, PlanGoal};
use crate::output::OutputFormat;

/// fwstitch - embed a child microcontroller's firmware into its host's build
#[derive(Parser)]
#[command(name = "fwstitch")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Configuration file (default: $FWSTITCH_CONFIG, then ./fwstitch.toml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Override the bridge strategy from the config (copy or link)
  #[arg(long, global = true)]
  strategy: Option<BridgeStrategy>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the host, the child, or both (child first)
  Build {
    #[arg(value_enum, default_value_t = BuildSelection::All)]
    target: BuildSelection,
  },

  /// Build both targets, upload the host, then upload the child
  Upload,

  /// Show the order in which actions run
  Plan {
    #[arg(value_enum, default_value_t = PlanGoal::Upload)]
    goal: PlanGoal,
  },

  /// Bring the child binary into the host build tree
  Bridge,

  /// Convert an Intel HEX image into a raw binary
  Convert {
    /// Hex image to read
    hex: PathBuf,
    /// Binary to write
    bin: PathBuf,
  },

  /// Dump a raw binary as a C array source file
  Embed {
    /// Binary to embed
    bin: PathBuf,

    /// Directory for the generated source (default: the host's generated-sources directory)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Host architecture (default: from the config, else avr)
    #[arg(long, value_enum)]
    arch: Option<ArchArg>,
  },

  /// Show resolved configuration and artifact states
  Info,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "info" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let opts = GlobalOpts {
    config: cli.config,
    strategy: cli.strategy,
    output: cli.output,
  };

  match cli.command {
    Commands::Build { target } => cmd::cmd_build(&opts, target),
    Commands::Upload => cmd::cmd_upload(&opts),
    Commands::Plan { goal } => cmd::cmd_plan(&opts, goal),
    Commands::Bridge => cmd::cmd_bridge(&opts),
    Commands::Convert { hex, bin } => cmd::cmd_convert(&opts, &hex, &bin),
    Commands::Embed { bin, out_dir, arch } => cmd::cmd_embed(&opts, &bin, out_dir.as_deref(), arch),
    Commands::Info => cmd::cmd_info(&opts),
  }
}
