mod cmd;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::BuildInputs;
use output::{OutputFormat, print_error};

/// Build and package autotools-style native libraries against located dependencies
#[derive(Parser)]
#[command(name = "nativepack", author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging (overridden by RUST_LOG)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Fetch, configure, compile, install and package a library
  Build {
    #[command(flatten)]
    inputs: BuildInputs,

    /// Parallel make jobs (defaults to the number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Show the configure flags and environment a build would use
  Plan {
    #[command(flatten)]
    inputs: BuildInputs,

    /// Print the plan as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show the host platform, store and work directories
  Info {
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "nativepack_lib=info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Build { inputs, jobs, output } => cmd::cmd_build(&inputs, jobs, output),
    Commands::Plan { inputs, json } => cmd::cmd_plan(&inputs, json),
    Commands::Info { output } => cmd::cmd_info(output),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::FAILURE
    }
  }
}
