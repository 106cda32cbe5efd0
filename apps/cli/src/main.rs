//! HonestRoles CLI: clean, filter, label, rate, and rank job listings.
//!
//! Runs the configured pipeline against a job file, inspects plugin
//! manifests, and gates datasets on data-quality findings.

mod builtin;
mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
