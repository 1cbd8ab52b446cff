//! Apply context and provider traits
//!
//! These traits allow the engine to be used without depending on concrete
//! OS backends or a particular UI.

use crate::reference::ResourceRef;
use crate::types::{ApplyResult, ExecuteSummary};
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;

/// Backend that performs the actual reads and writes for one resource.
///
/// A provider is created per resource instance by its type's factory and is
/// exclusively owned by that resource.
pub trait Provider: Send + fmt::Debug {
    /// Read the current value of an attribute (or other aspect) of the entity.
    fn retrieve(&mut self, attribute: &str, params: &Parameters) -> anyhow::Result<Value>;

    /// Write a desired value.
    fn write(&mut self, attribute: &str, value: &Value, params: &Parameters) -> anyhow::Result<()>;

    /// React to a refresh event caused by an upstream change.
    ///
    /// Returns a message describing what happened, if anything did.
    fn refresh(&mut self, _params: &Parameters) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    /// Forget any observations cached during the current pass.
    fn flush(&mut self) {}
}

/// Provider for types that manage nothing themselves (containers).
#[derive(Debug, Default)]
pub struct NullProvider;

impl Provider for NullProvider {
    fn retrieve(&mut self, _attribute: &str, _params: &Parameters) -> anyhow::Result<Value> {
        Ok(Value::absent())
    }

    fn write(&mut self, attribute: &str, _value: &Value, _params: &Parameters) -> anyhow::Result<()> {
        anyhow::bail!("no provider can manage {attribute}")
    }
}

/// Parameter and metaparameter values of a resource, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters(IndexMap<String, Vec<Value>>);

impl Parameters {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value but keeping its position.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.0.insert(name.into(), values);
    }

    /// All values of a parameter.
    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// First value of a parameter.
    pub fn first(&self, name: &str) -> Option<&Value> {
        self.0.get(name).and_then(|v| v.first())
    }

    /// First value of a parameter as a string slice.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.first(name).and_then(Value::as_str)
    }

    /// Interpret a parameter as a boolean (`true`/`yes`).
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.str(name), Some("true" | "yes"))
    }

    /// Check if a parameter is set.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterate over parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of parameters set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no parameters are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Context handed to property kinds while they inspect or change an entity.
pub struct PropertyContext<'a> {
    /// Resource being evaluated.
    pub resource: &'a ResourceRef,
    /// Its parameters (namevar, provider, plain parameters, metaparameters).
    pub params: &'a Parameters,
    /// Its provider.
    pub provider: &'a mut dyn Provider,
}

/// Progress callback for transactions
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback: Send {
    /// Called once the evaluation order is known
    fn on_transaction_start(&mut self, count: usize);

    /// Called when starting to evaluate a single resource
    fn on_resource_start(&mut self, id: &str);

    /// Called when a resource evaluation completes
    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult);

    /// Called when every resource has been visited
    fn on_transaction_complete(&mut self, summary: &ExecuteSummary);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_transaction_start(&mut self, _count: usize) {}
    fn on_resource_start(&mut self, _id: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _result: &ApplyResult) {}
    fn on_transaction_complete(&mut self, _summary: &ExecuteSummary) {}
}
