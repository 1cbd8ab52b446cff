mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod resource;
mod signal;
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
    /// Explicit settings file
    pub config: Option<PathBuf>,
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
        config: cli.config,
    };

    let outcome = match cli.command {
        Command::Run(args) => {
            signal::install();
            commands::run::run(&ctx, args)?
        }
        Command::Apply(args) => commands::apply::run(&ctx, args)?,
        Command::Enable => return commands::lock::enable(&ctx),
        Command::Disable => return commands::lock::disable(&ctx),
        Command::Status => return commands::status::run(&ctx),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "steward", &mut io::stdout());
            return Ok(());
        }
    };

    if outcome.restart_requested {
        return restart();
    }
    if outcome.report.as_ref().is_some_and(|r| !r.is_success()) {
        std::process::exit(2);
    }
    Ok(())
}

/// Replace this process with a fresh copy of itself.
#[cfg(unix)]
fn restart() -> Result<()> {
    use anyhow::Context as _;
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().context("Could not locate the steward binary")?;
    log::info!("Restarting {}", exe.display());
    let err = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .exec();
    Err(err).with_context(|| format!("Could not restart {}", exe.display()))
}

#[cfg(not(unix))]
fn restart() -> Result<()> {
    log::warn!("Restart requested, but re-exec is not supported on this platform");
    Ok(())
}
