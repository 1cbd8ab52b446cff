//! # Agent
//!
//! Catalog acquisition for one node.
//!
//! A [`CatalogClient`] gathers facts, asks a [`CompilerBackend`] for a
//! catalog (or reuses the cached one while it is still fresh), applies it
//! with the `declarative` engine, and remembers what it needs for the next
//! run. Runs on one node are serialized by a [`Pidlock`]; a per-node splay
//! delay spreads a fleet's runs over time.
//!
//! ## Example
//!
//! ```ignore
//! use agent::{AgentConfig, CatalogClient, backend::http::HttpBackend, facts::SystemFacts};
//! use declarative::{ApplyOptions, NoProgress};
//! use std::sync::Arc;
//!
//! let config = AgentConfig::new("web01", state_dir);
//! let backend = Arc::new(HttpBackend::new("https://compiler:8140", config.timeout()));
//! let facts = Box::new(SystemFacts::new(vec![config.fact_dest.clone()]));
//! let mut client = CatalogClient::new(config, backend, facts, registry)?;
//! let outcome = client.run(&ApplyOptions::default(), &mut NoProgress)?;
//! ```

pub mod backend;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod facts;
pub mod lock;
pub mod plugins;
pub mod splay;
pub mod storage;

pub use backend::CompilerBackend;
pub use cache::CatalogCache;
pub use client::{CatalogClient, FetchGate, RestartHandle, RunOutcome};
pub use config::AgentConfig;
pub use error::{Error, ErrorCategory, Result};
pub use facts::{FactSource, Facts, StaticFacts, SystemFacts};
pub use lock::{LockOwner, Pidlock};
pub use splay::{Sleeper, ThreadSleeper};
pub use storage::{RunState, Storage};
