use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::level_filters::LevelFilter;

/// Run a Universal Machine program image.
#[derive(Parser, Debug)]
#[command(name = "um", version)]
pub struct Cli {
  /// Program image: big-endian 32-bit words
  pub program: PathBuf,

  /// Log more to stderr (-v info, -vv debug, -vvv every instruction)
  #[arg(short, long, action = ArgAction::Count)]
  pub verbose: u8,

  /// Print the decoded program instead of running it
  #[arg(long)]
  pub disassemble: bool,
}

impl Cli {
  pub fn log_level(&self) -> LevelFilter {
    match self.verbose {
      0 => LevelFilter::WARN,
      1 => LevelFilter::INFO,
      2 => LevelFilter::DEBUG,
      _ => LevelFilter::TRACE,
    }
  }
}
