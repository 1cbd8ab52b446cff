//! `steward run` - one agent cycle against the catalog compiler

use agent::RunOutcome;
use anyhow::Result;

use crate::Context;
use crate::cli::RunArgs;
use crate::commands::{Setup, client};
use crate::progress::RunProgress;
use crate::{signal, ui};

pub fn run(ctx: &Context, args: RunArgs) -> Result<RunOutcome> {
    let mut setup = Setup::load(ctx)?;
    if let Some(server) = args.server {
        setup.settings.server = server;
    }
    if args.ignore_cache {
        setup.config.ignore_cache = true;
    }
    if args.no_splay {
        setup.config.splay = false;
    }

    let options = args.flags.to_options();
    if !ctx.quiet {
        ui::header(&format!("Catalog run for {}", setup.config.node_name));
        ui::kv("Server", &setup.settings.server);
        ui::kv("Environment", &setup.config.environment);
        if options.noop {
            ui::kv("Mode", "noop");
        }
        if !options.tags.is_empty() {
            ui::kv("Tags", &options.tags.join(", "));
        }
    }

    let backend = setup.http_backend();
    let mut client = client(setup.config, backend)?;
    let mut progress = RunProgress::new(ctx.quiet);
    let mut outcome = client.run(&options, &mut progress)?;
    if signal::take_hangup() {
        log::info!("Caught SIGHUP; restarting after this run");
        outcome.restart_requested = true;
    }

    report(ctx, &outcome);
    Ok(outcome)
}

/// Print what a run did
pub fn report(ctx: &Context, outcome: &RunOutcome) {
    if outcome.skipped {
        ui::warn("Run skipped: another run holds the lock or runs are disabled");
        return;
    }
    let Some(report) = &outcome.report else {
        ui::error("No catalog was applied");
        return;
    };
    if outcome.from_cache {
        ui::warn("Applied the cached catalog");
    }
    if !ctx.quiet || !report.is_success() {
        ui::print_report(report, ctx.verbose > 0);
    }
}
