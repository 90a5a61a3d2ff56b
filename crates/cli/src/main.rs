mod cmd;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{cmd_build, cmd_verify};
use output::print_error;

/// luz - incremental builds for jailbreak packages
#[derive(Parser)]
#[command(name = "luz")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the project, packing it when it declares a control
  Build {
    /// Project directory
    #[arg(short, long, default_value = ".")]
    path: PathBuf,

    /// Remove the scratch directory before building
    #[arg(short, long)]
    clean: bool,

    /// Override a meta value (key=value), may be repeated
    #[arg(short, long = "meta", value_name = "KEY=VALUE")]
    meta: Vec<String>,
  },

  /// Check the project declaration without building
  Verify {
    /// Project directory
    #[arg(short, long, default_value = ".")]
    path: PathBuf,
  },
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Build { path, clean, meta } => cmd_build(&path, clean, &meta),
    Commands::Verify { path } => cmd_verify(&path),
  };

  if let Err(err) = result {
    print_error(&format!("{:#}", err));
    std::process::exit(1);
  }
}
