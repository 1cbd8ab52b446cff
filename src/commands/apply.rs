//! `steward apply` - converge to a catalog document on disk

use agent::{AgentConfig, RunOutcome};
use agent::backend::local::LocalBackend;
use anyhow::{Context as _, Result};
use std::sync::Arc;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::commands::run::report;
use crate::commands::{Setup, client};
use crate::progress::RunProgress;
use crate::ui;

/// Agent configuration for applying a local catalog.
///
/// Cache and state live in files of their own, so the agent's cached catalog
/// and compile time are left alone.
fn local_config(mut config: AgentConfig) -> AgentConfig {
    config.cachefile = config
        .cachefile
        .with_file_name(format!("{}.apply.json", config.node_name));
    config.statefile = config
        .statefile
        .with_file_name(format!("{}.apply.toml", config.node_name));
    config.use_cache_on_failure = false;
    config.splay = false;
    config.plugin_sync = false;
    config.fact_sync = false;
    config
}

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<RunOutcome> {
    let path = std::fs::canonicalize(&args.catalog)
        .with_context(|| format!("Could not find catalog {}", args.catalog.display()))?;

    let config = local_config(Setup::load(ctx)?.config);

    let options = args.flags.to_options();
    if !ctx.quiet {
        ui::header(&format!("Applying {}", path.display()));
        if options.noop {
            ui::kv("Mode", "noop");
        }
    }

    let mut client = client(config, Arc::new(LocalBackend::new(&path)))?;
    let mut progress = RunProgress::new(ctx.quiet);
    let outcome = client.run(&options, &mut progress)?;

    report(ctx, &outcome);
    if !outcome.skipped && outcome.report.is_none() {
        anyhow::bail!("Could not load a catalog from {}", path.display());
    }
    Ok(outcome)
}
