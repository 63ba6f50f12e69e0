// dcmscrub/src/commands/mod.rs
//! One module per subcommand. Each `run_*` function is a thin wrapper over a
//! `dcmscrub-core` operation that prints a summary when it is done.

pub mod prepare_script;
pub mod purge;
pub mod rename_leaks;
pub mod scrub;
pub mod sort_slices;
pub mod strip_tags;

use anyhow::Result;

use crate::cli::{Cli, Commands};

/// Dispatches the parsed command line.
pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::PrepareScript(cmd) => prepare_script::run_prepare_script(cmd),
        Commands::Scrub(cmd) => scrub::run_scrub(cmd, cli.format),
        Commands::Purge(cmd) => purge::run_purge(cmd, cli.format),
        Commands::SortSlices(cmd) => sort_slices::run_sort_slices(cmd, cli.format),
        Commands::RenameLeaks(cmd) => rename_leaks::run_rename_leaks(cmd, cli.format),
        Commands::StripTags(cmd) => strip_tags::run_strip_tags(cmd, cli.format),
    }
}
