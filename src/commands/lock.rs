use agent::{LockOwner, Pidlock};
use anyhow::Result;

use crate::Context;
use crate::commands::{Setup, client};
use crate::ui;

/// Allow agent runs again
pub fn enable(ctx: &Context) -> Result<()> {
    let setup = Setup::load(ctx)?;
    let backend = setup.http_backend();
    let client = client(setup.config, backend)?;

    if client.enable()? {
        ui::success("Agent runs enabled");
    } else if client.running() {
        ui::info("Runs are not disabled; an agent run is in progress");
    } else {
        ui::info("Agent runs were already enabled");
    }
    Ok(())
}

/// Prevent agent runs until enabled
pub fn disable(ctx: &Context) -> Result<()> {
    let setup = Setup::load(ctx)?;
    let backend = setup.http_backend();
    let client = client(setup.config, backend)?;

    if client.disable()? {
        ui::success("Agent runs disabled");
        ui::dim("Run `steward enable` to allow runs again");
        return Ok(());
    }

    let lockfile = &client.config().lockfile;
    match Pidlock::new(lockfile).owner() {
        Some(LockOwner::Anonymous) => {
            ui::info("Agent runs were already disabled");
            Ok(())
        }
        Some(LockOwner::Pid(pid)) => anyhow::bail!(
            "Could not disable runs: {} is held by pid {pid}",
            lockfile.display()
        ),
        None => anyhow::bail!("Could not disable runs: {} is busy", lockfile.display()),
    }
}
