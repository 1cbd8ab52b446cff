use agent::{CatalogCache, Error, LockOwner, Pidlock, Storage};
use anyhow::{Context as _, Result};
use chrono::{Local, TimeZone};
use colored::Colorize;

use crate::Context;
use crate::commands::Setup;
use crate::{paths, ui};

pub fn run(ctx: &Context) -> Result<()> {
    let setup = Setup::load(ctx)?;
    let settings_path = match &ctx.config {
        Some(path) => path.clone(),
        None => paths::settings_file()?,
    };

    ui::header("Agent Status");
    ui::kv("Node", &setup.config.node_name);
    ui::kv("Environment", &setup.config.environment);
    ui::kv("Server", &setup.settings.server);
    ui::kv(
        "Settings",
        &format!(
            "{}{}",
            settings_path.display(),
            if settings_path.exists() { "" } else { " (defaults)" }
        ),
    );

    let config = &setup.config;

    ui::section("Lock");
    let lock = Pidlock::new(&config.lockfile);
    let state = match lock.owner() {
        Some(LockOwner::Anonymous) => "disabled".yellow().to_string(),
        Some(LockOwner::Pid(pid)) if lock.is_locked() => {
            format!("running (pid {pid})").cyan().to_string()
        }
        Some(LockOwner::Pid(pid)) => format!("stale lock (pid {pid})").yellow().to_string(),
        None => "idle".green().to_string(),
    };
    ui::kv("State", &state);
    ui::kv("Lock file", &config.lockfile.display().to_string());

    ui::section("Last run");
    let run_state = match Storage::peek(&config.statefile) {
        Ok(state) => state,
        Err(err @ Error::StateCorruption { .. }) => {
            ui::kv("State", &"corrupt".red().to_string());
            ui::dim(&err.to_string());
            Default::default()
        }
        Err(err) => return Err(err).context("Could not read agent state"),
    };
    ui::kv(
        "Finished",
        &run_state
            .last_run
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".dimmed().to_string()),
    );
    ui::kv(
        "Compiled",
        &run_state
            .compile_time
            .and_then(|secs| Local.timestamp_opt(secs, 0).single())
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".dimmed().to_string()),
    );
    if let Some(splay) = run_state.splay_time {
        ui::kv("Splay", &format!("{splay}s"));
    }
    if let Some(facts) = &run_state.facts {
        ui::kv("Facts", &facts.len().to_string());
    }

    ui::section("Cache");
    let cache = CatalogCache::new(&config.cachefile);
    ui::kv(
        "Catalog",
        &format!(
            "{} {}",
            config.cachefile.display(),
            if cache.exists() { "✓".green() } else { "missing".yellow() }
        ),
    );
    ui::kv("State file", &config.statefile.display().to_string());
    println!();
    Ok(())
}
