//! Agent configuration
//!
//! Everything the client needs is passed in explicitly through
//! [`AgentConfig`]; nothing is looked up from ambient global state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fact names that change constantly and never force a recompile.
pub const DEFAULT_DYNAMIC_FACTS: &[&str] = &["memorysize", "memoryfree", "swapsize", "swapfree"];

/// Default bound on a catalog fetch, in seconds.
pub const DEFAULT_CONFIG_TIMEOUT: u64 = 120;

/// Default splay limit, in seconds.
pub const DEFAULT_SPLAY_LIMIT: u64 = 1800;

/// Configuration for one [`CatalogClient`](crate::CatalogClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Node name the catalog is compiled for.
    pub node_name: String,
    /// Environment reported as a fact when the fact source has none.
    pub environment: String,

    /// Sleep a per-node random delay before each run.
    pub splay: bool,
    /// Upper bound (exclusive) of the splay delay, in seconds.
    pub splay_limit: u64,
    /// Bound on one catalog fetch, in seconds.
    pub config_timeout: u64,

    /// Never consider the cached catalog fresh.
    pub ignore_cache: bool,
    /// Use the cached catalog when fetching fails.
    pub use_cache_on_failure: bool,
    /// Facts stripped before comparing fact snapshots.
    pub dynamic_facts: Vec<String>,
    /// Lowercase every fact value.
    pub downcase_facts: bool,
    /// A cached catalog is fresh when the compiler's timestamp is less than
    /// this many seconds newer than the local compile time.
    pub freshness_tolerance: i64,

    /// Download plugins before gathering facts.
    pub plugin_sync: bool,
    pub plugin_source: Option<PathBuf>,
    pub plugin_dest: PathBuf,
    /// File name patterns never synced.
    pub plugin_ignore: Vec<String>,

    /// Download fact files before gathering facts.
    pub fact_sync: bool,
    pub fact_source: Option<PathBuf>,
    pub fact_dest: PathBuf,

    /// Run lock.
    pub lockfile: PathBuf,
    /// Persisted run state.
    pub statefile: PathBuf,
    /// Last known good catalog.
    pub cachefile: PathBuf,
    /// Newline-delimited list of applied classes.
    pub classfile: PathBuf,
}

impl AgentConfig {
    /// Configuration with every path under one state directory.
    pub fn new(node_name: impl Into<String>, state_dir: &Path) -> Self {
        let node_name = node_name.into();
        Self {
            cachefile: state_dir.join("catalog").join(format!("{node_name}.json")),
            node_name,
            environment: "production".to_string(),
            splay: false,
            splay_limit: DEFAULT_SPLAY_LIMIT,
            config_timeout: DEFAULT_CONFIG_TIMEOUT,
            ignore_cache: false,
            use_cache_on_failure: true,
            dynamic_facts: DEFAULT_DYNAMIC_FACTS.iter().map(|s| (*s).to_string()).collect(),
            downcase_facts: false,
            freshness_tolerance: 1,
            plugin_sync: false,
            plugin_source: None,
            plugin_dest: state_dir.join("lib"),
            plugin_ignore: vec![".git".to_string(), "*.swp".to_string()],
            fact_sync: false,
            fact_source: None,
            fact_dest: state_dir.join("facts.d"),
            lockfile: state_dir.join("agent.lock"),
            statefile: state_dir.join("state.toml"),
            classfile: state_dir.join("classes.txt"),
        }
    }

    /// Fetch bound as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.config_timeout)
    }

    /// Normalized dynamic fact names.
    pub fn dynamic_fact_names(&self) -> Vec<String> {
        self.dynamic_facts
            .iter()
            .flat_map(|entry| entry.split(','))
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new("localhost", Path::new("/var/lib/steward"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_follow_state_dir() {
        let config = AgentConfig::new("web01", Path::new("/tmp/steward"));
        assert_eq!(config.cachefile, PathBuf::from("/tmp/steward/catalog/web01.json"));
        assert_eq!(config.lockfile, PathBuf::from("/tmp/steward/agent.lock"));
        assert_eq!(config.freshness_tolerance, 1);
    }

    #[test]
    fn test_dynamic_fact_names() {
        let mut config = AgentConfig::default();
        config.dynamic_facts = vec!["MemorySize, swapfree".into(), "uptime".into()];
        assert_eq!(
            config.dynamic_fact_names(),
            vec!["memorysize", "swapfree", "uptime"]
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AgentConfig = toml::from_str("node_name = \"db01\"\nsplay = true\n").unwrap();
        assert_eq!(config.node_name, "db01");
        assert!(config.splay);
        assert_eq!(config.config_timeout, DEFAULT_CONFIG_TIMEOUT);
        assert_eq!(config.dynamic_facts.len(), 4);
    }
}
