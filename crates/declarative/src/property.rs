//! Property state machine
//!
//! A [`Property`] holds one convergent attribute of a resource: the desired
//! values (`should`, munged once at assignment) and the last observed value
//! (`is`, only available after [`Property::retrieve`]). Behavior that differs
//! between attributes lives in a shared [`PropertyKind`].

use crate::context::PropertyContext;
use crate::error::{Error, Result};
use crate::value::{Value, ValueFormat, render_all};
use std::fmt;
use std::sync::Arc;

/// Per-attribute behavior shared by every property of one kind.
///
/// Every method has a default that defers to the resource's provider, so a
/// plain property only needs `impl PropertyKind for Plain {}`.
pub trait PropertyKind: Send + Sync + fmt::Debug {
    /// Normalize a raw desired value. Errors become validation failures.
    fn munge(&self, raw: Value) -> std::result::Result<Value, String> {
        Ok(raw)
    }

    /// Read the current value through the provider.
    fn retrieve(&self, name: &str, cx: &mut PropertyContext<'_>) -> anyhow::Result<Value> {
        cx.provider.retrieve(name, cx.params)
    }

    /// Adjust desired values once current state is known.
    ///
    /// Called after `retrieve` and at most once per assignment. Returning
    /// `None` keeps `should` unchanged.
    fn adjust_should(
        &self,
        _should: &[Value],
        _cx: &mut PropertyContext<'_>,
    ) -> anyhow::Result<Option<Vec<Value>>> {
        Ok(None)
    }

    /// Whether the current value satisfies the desired values.
    fn insync(&self, current: &Value, should: &[Value], _cx: &mut PropertyContext<'_>) -> bool {
        should.iter().any(|s| s == current)
    }

    /// Write the desired value and name the resulting event.
    ///
    /// `None` means nothing was actually changed.
    fn sync(
        &self,
        name: &str,
        should: &Value,
        cx: &mut PropertyContext<'_>,
    ) -> anyhow::Result<Option<String>> {
        cx.provider.write(name, should, cx.params)?;
        Ok(Some(self.event(name)))
    }

    /// Event name reported after a successful sync.
    fn event(&self, name: &str) -> String {
        format!("{name}_changed")
    }

    /// How integer values of this property are rendered.
    fn format(&self) -> ValueFormat {
        ValueFormat::Decimal
    }
}

/// Property kind with no special behavior.
#[derive(Debug, Default)]
pub struct Plain;

impl PropertyKind for Plain {}

/// One convergent attribute of a resource.
pub struct Property {
    name: String,
    kind: Arc<dyn PropertyKind>,
    should: Vec<Value>,
    is: Option<Value>,
    adjusted: bool,
}

impl Property {
    /// Create a property with no desired value yet.
    pub fn new(name: impl Into<String>, kind: Arc<dyn PropertyKind>) -> Self {
        Self {
            name: name.into(),
            kind,
            should: Vec::new(),
            is: None,
            adjusted: false,
        }
    }

    /// Attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assign desired values, munging each one.
    pub fn set_should(&mut self, raw: Vec<Value>) -> Result<()> {
        let mut munged = Vec::with_capacity(raw.len());
        for value in raw {
            let value = self
                .kind
                .munge(value)
                .map_err(|message| Error::validation(&self.name, message))?;
            munged.push(value);
        }
        self.should = munged;
        self.adjusted = false;
        Ok(())
    }

    /// Desired values (acceptable alternatives, in order).
    pub fn should(&self) -> &[Value] {
        &self.should
    }

    /// Make a previously observed value the only desired value.
    ///
    /// The value is already normalized, so neither munging nor the
    /// preparation step applies to it.
    pub fn restore(&mut self, previous: Value) {
        self.should = vec![previous];
        self.adjusted = true;
    }

    /// Desired values in the form they are written to catalog documents.
    ///
    /// Octal integers are written as their digit strings so that munging
    /// the document again yields the same values.
    pub fn document_values(&self) -> Vec<Value> {
        match self.kind.format() {
            ValueFormat::Octal => self
                .should
                .iter()
                .map(|v| match v {
                    Value::Integer(_) => Value::text(v.render(ValueFormat::Octal)),
                    other => other.clone(),
                })
                .collect(),
            ValueFormat::Decimal => self.should.clone(),
        }
    }

    /// Shared behavior for this property.
    pub fn kind(&self) -> &dyn PropertyKind {
        self.kind.as_ref()
    }

    /// Last retrieved value; `None` until `retrieve` has run in this pass.
    pub fn is(&self) -> Option<&Value> {
        self.is.as_ref()
    }

    /// Query the provider for the current value.
    pub fn retrieve(&mut self, cx: &mut PropertyContext<'_>) -> anyhow::Result<&Value> {
        let current = self.kind.retrieve(&self.name, cx)?;
        Ok(self.is.insert(current))
    }

    /// Let the kind adjust `should` now that current state is known.
    pub fn prepare(&mut self, cx: &mut PropertyContext<'_>) -> anyhow::Result<()> {
        if self.adjusted {
            return Ok(());
        }
        if let Some(adjusted) = self.kind.adjust_should(&self.should, cx)? {
            log::debug!("{}: adjusted {} to {}", cx.resource, self.name, render_all(&adjusted, self.kind.format()));
            self.should = adjusted;
        }
        self.adjusted = true;
        Ok(())
    }

    /// Compare the retrieved value against `should`.
    ///
    /// A property that has not been retrieved yet is never in sync.
    pub fn insync(&self, cx: &mut PropertyContext<'_>) -> bool {
        match &self.is {
            Some(current) => self.kind.insync(current, &self.should, cx),
            None => false,
        }
    }

    /// Write the first desired value.
    pub fn sync(&mut self, cx: &mut PropertyContext<'_>) -> anyhow::Result<Option<String>> {
        let Some(target) = self.should.first() else {
            return Ok(None);
        };
        self.kind.sync(&self.name, target, cx)
    }

    /// Render the current value for humans.
    pub fn is_to_s(&self) -> String {
        match &self.is {
            Some(v) => v.render(self.kind.format()),
            None => "unknown".to_string(),
        }
    }

    /// Render the desired values for humans.
    pub fn should_to_s(&self) -> String {
        render_all(&self.should, self.kind.format())
    }

    /// Forget the retrieved value ahead of a new pass.
    pub fn reset(&mut self) {
        self.is = None;
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("should", &self.should)
            .field("is", &self.is)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Parameters, Provider};
    use crate::reference::ResourceRef;

    #[derive(Debug, Default)]
    struct Memory {
        value: Option<Value>,
        writes: usize,
    }

    impl Provider for Memory {
        fn retrieve(&mut self, _attribute: &str, _params: &Parameters) -> anyhow::Result<Value> {
            Ok(self.value.clone().unwrap_or_else(Value::absent))
        }

        fn write(&mut self, _attribute: &str, value: &Value, _params: &Parameters) -> anyhow::Result<()> {
            self.writes += 1;
            self.value = Some(value.clone());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Upper;

    impl PropertyKind for Upper {
        fn munge(&self, raw: Value) -> std::result::Result<Value, String> {
            match raw.as_str() {
                Some(s) if !s.is_empty() => Ok(Value::text(s.to_uppercase())),
                _ => Err("expected a non-empty string".into()),
            }
        }
    }

    #[test]
    fn test_munge_on_assignment() {
        let mut prop = Property::new("shout", Arc::new(Upper));
        prop.set_should(vec![Value::text("hi")]).unwrap();
        assert_eq!(prop.should(), &[Value::text("HI")]);

        let err = prop.set_should(vec![Value::Integer(3)]).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_retrieve_then_sync() {
        let reference = ResourceRef::new("test", "one");
        let params = Parameters::new();
        let mut provider = Memory::default();
        let mut prop = Property::new("value", Arc::new(Plain));
        prop.set_should(vec![Value::text("b"), Value::text("c")]).unwrap();

        assert!(prop.is().is_none());

        let mut cx = PropertyContext {
            resource: &reference,
            params: &params,
            provider: &mut provider,
        };
        assert!(!prop.insync(&mut cx));
        prop.retrieve(&mut cx).unwrap();
        assert!(prop.is().unwrap().is_absent());
        assert!(!prop.insync(&mut cx));

        let event = prop.sync(&mut cx).unwrap();
        assert_eq!(event.as_deref(), Some("value_changed"));

        prop.retrieve(&mut cx).unwrap();
        assert!(prop.insync(&mut cx));
        assert_eq!(provider.writes, 1);
    }
}
