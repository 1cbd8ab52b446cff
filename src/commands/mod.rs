//! Command implementations
//!
//! Each command builds its own [`CatalogClient`] from the settings file and
//! the command-line overrides. `status` only reads the lock, cache and state
//! files.

pub mod apply;
pub mod lock;
pub mod run;
pub mod status;

use agent::backend::http::HttpBackend;
use agent::{AgentConfig, CatalogClient, CompilerBackend, SystemFacts};
use anyhow::{Context as _, Result};
use std::sync::Arc;

use crate::Context;
use crate::config::Settings;
use crate::{paths, resource};

/// Settings plus the agent configuration derived from them
pub struct Setup {
    pub settings: Settings,
    pub config: AgentConfig,
}

impl Setup {
    /// Load settings and resolve every path.
    pub fn load(ctx: &Context) -> Result<Self> {
        let settings = Settings::load(ctx.config.as_deref())?;
        let state_dir = paths::state_dir()?;
        let config = settings.to_agent_config(&state_dir);
        log::debug!(
            "Node {} in {} (state in {})",
            config.node_name,
            config.environment,
            state_dir.display()
        );
        Ok(Self { settings, config })
    }

    /// HTTP backend for the configured compiler.
    pub fn http_backend(&self) -> Arc<dyn CompilerBackend> {
        Arc::new(HttpBackend::new(&self.settings.server, self.config.timeout()))
    }
}

/// Build a client with the built-in resource types and system facts.
pub fn client(config: AgentConfig, backend: Arc<dyn CompilerBackend>) -> Result<CatalogClient> {
    let registry = resource::registry().context("Could not register resource types")?;
    let facts = SystemFacts::new(vec![config.fact_dest.clone()]);
    CatalogClient::new(config, backend, Box::new(facts), registry)
        .context("Could not load agent state")
}
