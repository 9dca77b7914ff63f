mod audit;
mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod runner;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub kitchen: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        kitchen: cli.kitchen,
    };

    match cli.command {
        Command::Cook(args) => commands::fleet::run(&ctx, args),
        Command::Lock { node, reason } => commands::lock::lock(&ctx, &node, &reason),
        Command::Unlock { node } => commands::lock::unlock(&ctx, &node),
        Command::Show { node } => commands::nodes::show(&ctx, &node),
        Command::List => commands::nodes::list(&ctx),
        Command::DeployAgent { node, version } => {
            commands::agent::deploy(&ctx, &node, version.as_deref())
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "sous", &mut io::stdout());
            Ok(())
        }
    }
}
