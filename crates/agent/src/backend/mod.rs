//! Compiler backends.
//!
//! A [`CompilerBackend`] turns a node name and its facts into a serialized
//! catalog, and reports when the node's catalog last changed. Facts travel as
//! a percent-encoded JSON object; catalogs come back percent-encoded too.
//!
//! # Testing
//!
//! Use [`MockBackend`] for testing without network access:
//!
//! ```
//! use agent::backend::{CompilerBackend, MockBackend};
//!
//! let mock = MockBackend::new();
//! mock.set_freshness(1_700_000_000);
//! mock.set_catalog(r#"{"name":"web01"}"#);
//!
//! assert_eq!(mock.freshness("web01").unwrap(), 1_700_000_000);
//! assert_eq!(mock.compile_count(), 0);
//! ```

pub mod http;
pub mod local;

use crate::error::{Error, Result};
use crate::facts::Facts;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source of compiled catalogs.
pub trait CompilerBackend: Send + Sync {
    /// Unix time at which the node's catalog last changed on the compiler.
    fn freshness(&self, node: &str) -> Result<i64>;

    /// Compile a catalog. `facts` is already percent-encoded; the returned
    /// text is percent-encoded as well.
    fn compile(&self, node: &str, facts: &str) -> Result<String>;

    /// Whether the compiler runs in this process (no class file is written).
    fn is_local(&self) -> bool {
        false
    }
}

/// Serialize facts for transport.
pub fn encode_facts(facts: &Facts) -> Result<String> {
    let json = serde_json::to_string(facts)?;
    Ok(urlencoding::encode(&json).into_owned())
}

/// Inverse of [`encode_facts`].
pub fn decode_facts(encoded: &str) -> Result<Facts> {
    let json = unescape(encoded)?;
    Ok(serde_json::from_str(&json)?)
}

/// Percent-encode a catalog document for transport.
pub fn escape(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}

/// Undo transport encoding of a compiler response.
pub fn unescape(text: &str) -> Result<String> {
    urlencoding::decode(text)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| Error::Protocol(format!("could not unescape compiler response: {e}")))
}

/// Mock backend for testing without network access.
///
/// Clones share state, so a test can keep a handle while the client owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    freshness: Arc<Mutex<i64>>,
    catalog: Arc<Mutex<Option<String>>>,
    failure: Arc<Mutex<Option<String>>>,
    delay: Arc<Mutex<Duration>>,
    compiles: Arc<AtomicUsize>,
    last_facts: Arc<Mutex<Option<Facts>>>,
}

impl MockBackend {
    /// Create a new mock backend with no catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_freshness(&self, time: i64) {
        *lock(&self.freshness) = time;
    }

    /// Catalog document returned (escaped) by `compile`.
    pub fn set_catalog(&self, document: &str) {
        *lock(&self.catalog) = Some(document.to_string());
    }

    /// Make `compile` fail with this message.
    pub fn fail_with(&self, message: &str) {
        *lock(&self.failure) = Some(message.to_string());
    }

    /// Make `compile` block for a while first.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = delay;
    }

    /// Number of `compile` calls so far.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    /// Facts received by the last `compile`.
    pub fn last_facts(&self) -> Option<Facts> {
        lock(&self.last_facts).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl CompilerBackend for MockBackend {
    fn freshness(&self, _node: &str) -> Result<i64> {
        Ok(*lock(&self.freshness))
    }

    fn compile(&self, _node: &str, facts: &str) -> Result<String> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_facts) = Some(decode_facts(facts)?);
        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(message) = lock(&self.failure).clone() {
            return Err(Error::http(message, Some(500)));
        }
        lock(&self.catalog)
            .as_deref()
            .map(escape)
            .ok_or_else(|| Error::Protocol("no catalog configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_encoding_round_trip() {
        let facts = Facts::from([
            ("role".to_string(), "web & db".to_string()),
            ("path".to_string(), "/usr/bin:/bin".to_string()),
        ]);
        let encoded = encode_facts(&facts).unwrap();
        assert!(!encoded.contains(' '));
        assert!(!encoded.contains('&'));
        assert_eq!(decode_facts(&encoded).unwrap(), facts);
    }

    #[test]
    fn test_mock_backend() {
        let mock = MockBackend::new();
        let encoded = encode_facts(&Facts::from([("a".to_string(), "b".to_string())])).unwrap();
        assert!(mock.compile("n", &encoded).is_err());

        mock.set_catalog("{\"name\":\"n\"}");
        let text = mock.compile("n", &encoded).unwrap();
        assert_eq!(unescape(&text).unwrap(), "{\"name\":\"n\"}");
        assert_eq!(mock.compile_count(), 2);
        assert_eq!(mock.last_facts().unwrap()["a"], "b");

        mock.fail_with("compiler exploded");
        assert!(mock.compile("n", &encoded).is_err());
    }
}
