//! HTTP compiler backend.
//!
//! Talks to a remote compiler over two endpoints:
//!
//! - `GET {server}/catalog/{node}?facts={encoded}` returns the escaped catalog
//! - `GET {server}/freshness/{node}` returns a Unix timestamp as plain text

use crate::backend::CompilerBackend;
use crate::error::{Error, Result};
use std::time::Duration;

/// Maximum catalog size accepted from the compiler.
const MAX_BODY_SIZE: u64 = 64 * 1024 * 1024;

/// Remote compiler reachable over HTTP.
pub struct HttpBackend {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// Base URL of the compiler.
    server: String,
}

impl HttpBackend {
    /// Create a backend whose requests are bounded by `timeout`.
    #[must_use]
    pub fn new(server: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            server: server.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the compiler base URL.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    fn catalog_url(&self, node: &str, facts: &str) -> String {
        format!(
            "{}/catalog/{}?facts={facts}",
            self.server,
            urlencoding::encode(node)
        )
    }

    fn freshness_url(&self, node: &str) -> String {
        format!("{}/freshness/{}", self.server, urlencoding::encode(node))
    }

    fn get_text(&self, url: &str) -> Result<String> {
        log::debug!("GET {url}");
        let text = self
            .agent
            .get(url)
            .header("User-Agent", concat!("steward/", env!("CARGO_PKG_VERSION")))
            .call()?
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .read_to_string()?;
        Ok(text)
    }
}

impl CompilerBackend for HttpBackend {
    fn freshness(&self, node: &str) -> Result<i64> {
        let text = self.get_text(&self.freshness_url(node))?;
        text.trim()
            .parse()
            .map_err(|_| Error::Protocol(format!("invalid freshness response: {}", text.trim())))
    }

    fn compile(&self, node: &str, facts: &str) -> Result<String> {
        let text = self.get_text(&self.catalog_url(node, facts))?;
        if text.is_empty() {
            return Err(Error::Protocol("compiler returned an empty catalog".into()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let backend = HttpBackend::new("https://compiler.example.com/", Duration::from_secs(5));
        assert_eq!(backend.server(), "https://compiler.example.com");
        assert_eq!(
            backend.freshness_url("web 01"),
            "https://compiler.example.com/freshness/web%2001"
        );
        assert_eq!(
            backend.catalog_url("web01", "%7B%7D"),
            "https://compiler.example.com/catalog/web01?facts=%7B%7D"
        );
    }
}
