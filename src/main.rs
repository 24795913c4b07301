#![allow(clippy::too_many_arguments)]

use std::process::ExitCode;

use clap::Parser;
use maskfe::{cli, logger};

fn main() -> ExitCode {
    // Initialize session log (overwrites previous session log)
    logger::init();

    let args = cli::CliArgs::parse();
    cli::run(args)
}
