// dcmscrub/src/main.rs
//! `dcmscrub` entry point: parses the command line, sets up logging and runs
//! the chosen pass.

use clap::Parser;
use std::process::ExitCode;

use dcmscrub::cli::Cli;
use dcmscrub::ui::output::error_msg;
use dcmscrub::{commands, logger};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init_logger(logger::level_for_flags(cli.quiet, cli.debug, cli.disable_debug));

    match commands::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error_msg(format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
