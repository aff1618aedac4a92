use std::io::{self, BufWriter};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use universal::cli::Cli;
use universal::device::Console;
use universal::opcode::disassemble;
use universal::region::{Image, Region};
use universal::vm::Vm;

fn setup_tracing(cli: &Cli) {
  // stdout belongs to the machine
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_max_level(cli.log_level())
    .with_target(false)
    .init();
}

fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  setup_tracing(&cli);

  let image = Image::open(&cli.program).with_context(|| format!("cannot load {}", cli.program.display()))?;

  info!(path = %cli.program.display(), words = image.len(), "read program image");

  if cli.disassemble {
    let stdout = BufWriter::new(io::stdout().lock());
    return disassemble(image.words(), stdout).context("failed to write listing");
  }

  let mut vm = Vm::boot(&image);
  let mut console = Console::stdio();
  if let Err(e) = vm.run(&mut console) {
    error!(pc = %vm.pc(), steps = vm.steps(), "machine faulted");
    return Err(e.into());
  }
  Ok(())
}
