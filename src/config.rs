//! Agent settings
//!
//! Settings live in `steward.toml` inside the config directory. Every field
//! is optional; a missing file means "all defaults". Path fields default to
//! files under the state directory and may use `~` or `$VAR`.

use agent::AgentConfig;
use agent::config::{DEFAULT_CONFIG_TIMEOUT, DEFAULT_DYNAMIC_FACTS, DEFAULT_SPLAY_LIMIT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Default catalog compiler
pub const DEFAULT_SERVER: &str = "http://localhost:8140";

/// Contents of `steward.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the catalog compiler
    pub server: String,
    /// Node name; defaults to the host name
    pub node_name: Option<String>,
    pub environment: String,

    pub splay: bool,
    pub splay_limit: u64,
    /// Seconds allowed for one catalog fetch
    pub config_timeout: u64,

    pub ignore_cache: bool,
    pub use_cache_on_failure: bool,
    pub dynamic_facts: Vec<String>,
    pub downcase_facts: bool,
    pub freshness_tolerance: i64,

    pub plugin_sync: bool,
    pub plugin_source: Option<String>,
    pub plugin_dest: Option<String>,

    pub fact_sync: bool,
    pub fact_source: Option<String>,
    pub fact_dest: Option<String>,

    pub lockfile: Option<String>,
    pub statefile: Option<String>,
    pub cachefile: Option<String>,
    pub classfile: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            node_name: None,
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
            plugin_dest: None,
            fact_sync: false,
            fact_source: None,
            fact_dest: None,
            lockfile: None,
            statefile: None,
            cachefile: None,
            classfile: None,
        }
    }
}

impl Settings {
    /// Load settings from an explicit file, or from the config directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = paths::settings_file()?;
                if !path.exists() {
                    log::debug!("No settings at {}; using defaults", path.display());
                    return Ok(Self::default());
                }
                Self::load_from(&path)
            }
        }
    }

    /// Load settings from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read settings file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }

    /// Node name, falling back to the host name.
    pub fn node_name(&self) -> String {
        self.node_name.clone().unwrap_or_else(hostname)
    }

    /// Build the agent configuration, placing unset paths under `state_dir`.
    pub fn to_agent_config(&self, state_dir: &Path) -> AgentConfig {
        let mut config = AgentConfig::new(self.node_name(), state_dir);
        config.environment = self.environment.clone();
        config.splay = self.splay;
        config.splay_limit = self.splay_limit;
        config.config_timeout = self.config_timeout;
        config.ignore_cache = self.ignore_cache;
        config.use_cache_on_failure = self.use_cache_on_failure;
        config.dynamic_facts = self.dynamic_facts.clone();
        config.downcase_facts = self.downcase_facts;
        config.freshness_tolerance = self.freshness_tolerance;

        config.plugin_sync = self.plugin_sync;
        config.plugin_source = self.plugin_source.as_deref().map(paths::expand);
        override_path(&mut config.plugin_dest, self.plugin_dest.as_deref());

        config.fact_sync = self.fact_sync;
        config.fact_source = self.fact_source.as_deref().map(paths::expand);
        override_path(&mut config.fact_dest, self.fact_dest.as_deref());

        override_path(&mut config.lockfile, self.lockfile.as_deref());
        override_path(&mut config.statefile, self.statefile.as_deref());
        override_path(&mut config.cachefile, self.cachefile.as_deref());
        override_path(&mut config.classfile, self.classfile.as_deref());
        config
    }
}

fn override_path(target: &mut PathBuf, value: Option<&str>) {
    if let Some(value) = value {
        *target = paths::expand(value);
    }
}

/// Short host name of this machine.
pub fn hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return short_name(&name);
        }
    }
    fs::read_to_string("/etc/hostname")
        .ok()
        .map(|name| short_name(&name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn short_name(name: &str) -> String {
    name.trim().split('.').next().unwrap_or_default().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server, "http://localhost:8140");
        assert!(settings.use_cache_on_failure);
        assert_eq!(settings.freshness_tolerance, 1);
        assert_eq!(settings.dynamic_facts.len(), 4);
    }

    #[test]
    fn test_parse_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("steward.toml");
        fs::write(
            &path,
            r#"
server = "https://compiler.example.com:8140"
node_name = "web01"
splay = true
splay_limit = 60
dynamic_facts = ["uptime"]
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.server, "https://compiler.example.com:8140");
        assert_eq!(settings.node_name(), "web01");
        assert!(settings.splay);
        assert_eq!(settings.splay_limit, 60);
        assert_eq!(settings.dynamic_facts, vec!["uptime"]);
        assert_eq!(settings.config_timeout, DEFAULT_CONFIG_TIMEOUT);
    }

    #[test]
    fn test_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("steward.toml");
        fs::write(&path, "splay = \"sometimes").unwrap();
        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(Settings::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_agent_config_paths() {
        let settings = Settings {
            node_name: Some("db01".to_string()),
            cachefile: Some("/srv/cache/db01.json".to_string()),
            ignore_cache: true,
            ..Settings::default()
        };
        let config = settings.to_agent_config(Path::new("/tmp/steward-state"));

        assert_eq!(config.node_name, "db01");
        assert!(config.ignore_cache);
        assert_eq!(config.cachefile, PathBuf::from("/srv/cache/db01.json"));
        assert_eq!(config.lockfile, PathBuf::from("/tmp/steward-state/agent.lock"));
        assert_eq!(config.plugin_source, None);
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("Web01.Example.COM\n"), "web01");
        assert_eq!(short_name("db"), "db");
    }
}
