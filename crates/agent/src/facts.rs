//! Fact gathering
//!
//! Facts are a flat mapping of name to string describing the node. The
//! compiler uses them to build the catalog and the client compares snapshots
//! of them to decide whether a cached catalog is still fresh.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Flat, ordered fact mapping.
pub type Facts = BTreeMap<String, String>;

/// Version reported as the `clientversion` fact.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Source of facts for one node.
pub trait FactSource: Send {
    /// Gather the current facts.
    fn gather(&mut self) -> Result<Facts>;

    /// Forget anything cached so newly synced fact files are picked up.
    fn reload(&mut self) {}
}

/// Fixed facts, for tests and one-off applies.
#[derive(Debug, Clone, Default)]
pub struct StaticFacts(pub Facts);

impl StaticFacts {
    pub fn new<I, K, V>(facts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(facts.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl FactSource for StaticFacts {
    fn gather(&mut self) -> Result<Facts> {
        Ok(self.0.clone())
    }
}

/// Facts about the running system plus `name=value` fact files.
#[derive(Debug, Clone)]
pub struct SystemFacts {
    fact_dirs: Vec<PathBuf>,
    proc_root: PathBuf,
}

impl SystemFacts {
    /// Read fact files from the given directories.
    pub fn new(fact_dirs: Vec<PathBuf>) -> Self {
        Self {
            fact_dirs,
            proc_root: PathBuf::from("/proc"),
        }
    }

    fn builtin(&self) -> Facts {
        let mut facts = Facts::new();
        let hostname = read_trimmed(&self.proc_root.join("sys/kernel/hostname"))
            .or_else(|| read_trimmed(Path::new("/etc/hostname")))
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "localhost".to_string());
        let (short, domain) = match hostname.split_once('.') {
            Some((short, domain)) => (short.to_string(), Some(domain.to_string())),
            None => (hostname.clone(), None),
        };
        facts.insert("hostname".into(), short);
        if let Some(domain) = domain {
            facts.insert("domain".into(), domain);
        }
        facts.insert("fqdn".into(), hostname);
        facts.insert("kernel".into(), std::env::consts::OS.to_string());
        facts.insert("architecture".into(), std::env::consts::ARCH.to_string());
        facts.insert("operatingsystem".into(), operating_system());
        if let Ok(n) = std::thread::available_parallelism() {
            facts.insert("processorcount".into(), n.to_string());
        }
        if let Some(release) = read_trimmed(&self.proc_root.join("sys/kernel/osrelease")) {
            facts.insert("kernelrelease".into(), release);
        }
        if let Ok(meminfo) = fs::read_to_string(self.proc_root.join("meminfo")) {
            facts.extend(memory_facts(&meminfo));
        }
        facts
    }

    fn fact_files(&self) -> Facts {
        let mut facts = Facts::new();
        for dir in &self.fact_dirs {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
            paths.sort();
            for path in paths.into_iter().filter(|p| p.is_file()) {
                match fs::read_to_string(&path) {
                    Ok(content) => facts.extend(parse_fact_file(&content)),
                    Err(err) => log::warn!("Could not load fact file {}: {err}", path.display()),
                }
            }
        }
        facts
    }
}

impl FactSource for SystemFacts {
    fn gather(&mut self) -> Result<Facts> {
        let mut facts = self.builtin();
        facts.extend(self.fact_files());
        Ok(facts)
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn operating_system() -> String {
    let os_release = fs::read_to_string("/etc/os-release").unwrap_or_default();
    os_release
        .lines()
        .find_map(|line| line.strip_prefix("ID="))
        .map(|id| id.trim_matches('"').to_string())
        .unwrap_or_else(|| std::env::consts::OS.to_string())
}

/// Turn `/proc/meminfo` into the memory and swap facts.
fn memory_facts(meminfo: &str) -> Facts {
    let mut facts = Facts::new();
    for line in meminfo.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let fact = match key {
            "MemTotal" => "memorysize",
            "MemFree" => "memoryfree",
            "SwapTotal" => "swapsize",
            "SwapFree" => "swapfree",
            _ => continue,
        };
        let kib: u64 = rest
            .split_whitespace()
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        facts.insert(fact.into(), format!("{:.2} MB", kib as f64 / 1024.0));
    }
    facts
}

/// Parse `name=value` lines; blank lines and `#` comments are ignored.
pub fn parse_fact_file(content: &str) -> Facts {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Add the facts every catalog request carries.
///
/// `clientversion` is always overwritten; `environment` is only added when
/// the source did not provide one.
pub fn finalize(mut facts: Facts, environment: &str, downcase: bool) -> Facts {
    if downcase {
        for value in facts.values_mut() {
            *value = value.to_lowercase();
        }
    }
    facts.insert("clientversion".into(), CLIENT_VERSION.to_string());
    facts
        .entry("environment".into())
        .or_insert_with(|| environment.to_string());
    facts
}

/// Remove dynamic facts before comparing snapshots.
pub fn strip_dynamic(facts: &Facts, dynamic: &[String]) -> Facts {
    facts
        .iter()
        .filter(|(name, _)| !dynamic.iter().any(|d| d.eq_ignore_ascii_case(name)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Gather facts and fail when nothing came back.
pub fn gather(source: &mut dyn FactSource, environment: &str, downcase: bool) -> Result<Facts> {
    let facts = source.gather()?;
    if facts.is_empty() {
        return Err(Error::NoFacts);
    }
    Ok(finalize(facts, environment, downcase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_finalize_adds_version_and_environment() {
        let facts = finalize(StaticFacts::new([("role", "Web")]).0, "staging", true);
        assert_eq!(facts["clientversion"], CLIENT_VERSION);
        assert_eq!(facts["environment"], "staging");
        assert_eq!(facts["role"], "web");

        let facts = finalize(
            StaticFacts::new([("environment", "dev"), ("clientversion", "0.0.1")]).0,
            "production",
            false,
        );
        assert_eq!(facts["environment"], "dev");
        assert_eq!(facts["clientversion"], CLIENT_VERSION);
    }

    #[test]
    fn test_strip_dynamic() {
        let facts = StaticFacts::new([("role", "web"), ("MemorySize", "512")]).0;
        let stripped = strip_dynamic(&facts, &["memorysize".to_string()]);
        assert_eq!(stripped.len(), 1);
        assert!(stripped.contains_key("role"));
    }

    #[test]
    fn test_no_facts_is_a_protocol_error() {
        let mut empty = StaticFacts::default();
        let err = gather(&mut empty, "production", false).unwrap_err();
        assert!(matches!(err, Error::NoFacts));
        assert!(err.allows_cache_fallback());
    }

    #[test]
    fn test_memory_facts() {
        let facts = memory_facts("MemTotal:  2048 kB\nMemFree: 1024 kB\nBuffers: 12 kB\n");
        assert_eq!(facts["memorysize"], "2.00 MB");
        assert_eq!(facts["memoryfree"], "1.00 MB");
        assert!(!facts.contains_key("swapsize"));
    }

    #[test]
    fn test_fact_files_override_builtin() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("site.txt"), "# site facts\nrole = db\ndatacenter=ams\n").unwrap();

        let mut source = SystemFacts::new(vec![dir.path().to_path_buf()]);
        let facts = source.gather().unwrap();
        assert_eq!(facts["role"], "db");
        assert_eq!(facts["datacenter"], "ams");
        assert!(facts.contains_key("kernel"));
    }
}
