//! Managed resources
//!
//! A [`Resource`] is one managed entity: an identity (`Type[title]`), its
//! parameters and metaparameters, its properties, and the provider that reads
//! and writes the real thing. Resources never point back at their catalog;
//! relationships are expressed as [`ResourceRef`]s and resolved by the caller.

use crate::context::{Parameters, PropertyContext, Provider};
use crate::error::{Error, Result};
use crate::graph::Edge;
use crate::property::Property;
use crate::reference::ResourceRef;
use crate::registry::{AttributeKind, PROVIDER_PARAM, RELATIONSHIP_METAPARAMS, TypeDescriptor};
use crate::types::Event;
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// What one convergence pass over a resource did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Convergence {
    /// Events in property order.
    pub events: Vec<Event>,
    /// At least one property was synced.
    pub changed: bool,
    /// At least one property was out of sync but left alone (no-op).
    pub noop: bool,
    /// At least one property failed.
    pub failed: bool,
}

/// A change that can be reverted by writing the previous value back.
#[derive(Debug, Clone)]
struct Change {
    property: String,
    previous: Value,
}

/// One managed entity within a catalog.
pub struct Resource {
    reference: ResourceRef,
    descriptor: Arc<TypeDescriptor>,
    params: Parameters,
    properties: IndexMap<String, Property>,
    provider: Option<Box<dyn Provider>>,
    exported: bool,
    is_virtual: bool,
    changes: Vec<Change>,
}

impl Resource {
    /// Create a resource with only its name variable set (to the title).
    pub fn new(descriptor: Arc<TypeDescriptor>, title: &str) -> Self {
        let reference = ResourceRef::new(descriptor.name(), title);
        let mut params = Parameters::new();
        params.insert(descriptor.namevar(), vec![Value::text(reference.title())]);
        Self {
            reference,
            descriptor,
            params,
            properties: IndexMap::new(),
            provider: None,
            exported: false,
            is_virtual: false,
            changes: Vec::new(),
        }
    }

    /// Create a resource and assign attributes in evaluation order, then
    /// fill in declared defaults.
    pub fn with_attributes(
        descriptor: Arc<TypeDescriptor>,
        title: &str,
        mut attributes: IndexMap<String, Vec<Value>>,
    ) -> Result<Self> {
        if let Some(unknown) = attributes
            .keys()
            .find(|name| descriptor.attribute_kind(name).is_none())
        {
            return Err(Error::UnknownAttribute {
                type_name: descriptor.name().to_string(),
                attribute: unknown.clone(),
            });
        }

        let order: Vec<String> = descriptor
            .attribute_order()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut resource = Self::new(descriptor, title);
        for name in order {
            if let Some(values) = attributes.shift_remove(&name) {
                resource.set(&name, values)?;
            }
        }
        resource.set_defaults()?;
        Ok(resource)
    }

    /// Canonical identity.
    pub fn reference(&self) -> &ResourceRef {
        &self.reference
    }

    /// Title part of the identity.
    pub fn title(&self) -> &str {
        self.reference.title()
    }

    /// Descriptor of this resource's type.
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Parameters and metaparameters.
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Assign an attribute. Setting the same attribute twice replaces its
    /// value in place.
    pub fn set(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        let kind = self
            .descriptor
            .attribute_kind(name)
            .ok_or_else(|| Error::UnknownAttribute {
                type_name: self.descriptor.name().to_string(),
                attribute: name.to_string(),
            })?;

        match kind {
            AttributeKind::Property => {
                let spec = self.descriptor.property(name).ok_or_else(|| {
                    Error::validation(name, "property is not declared by its type")
                })?;
                self.properties
                    .entry(name.to_string())
                    .or_insert_with(|| Property::new(name, spec.kind()))
                    .set_should(values)?;
            }
            AttributeKind::Parameter if name == PROVIDER_PARAM => {
                let selected = single(name, &values)?;
                if !self.descriptor.provider_names().contains(&selected.as_str()) {
                    return Err(Error::validation(
                        name,
                        format!("{} has no provider named {selected}", self.descriptor.name()),
                    ));
                }
                self.provider = None;
                self.params.insert(name, vec![Value::token(selected)]);
            }
            AttributeKind::Parameter => {
                let munged = match self.descriptor.parameter(name) {
                    Some(spec) => values
                        .into_iter()
                        .map(|v| spec.munge(v))
                        .collect::<Result<Vec<_>>>()?,
                    None => values,
                };
                self.params.insert(name, munged);
            }
            AttributeKind::Namevar => {
                single(name, &values)?;
                self.params.insert(name, values);
            }
            AttributeKind::Metaparameter => {
                if RELATIONSHIP_METAPARAMS.contains(&name) {
                    for value in &values {
                        parse_reference(name, value)?;
                    }
                }
                self.params.insert(name, values);
            }
        }
        Ok(())
    }

    /// Fill in declared parameter defaults for parameters not yet set.
    pub fn set_defaults(&mut self) -> Result<()> {
        let descriptor = Arc::clone(&self.descriptor);
        for spec in descriptor.properties() {
            if self.properties.contains_key(spec.name()) {
                continue;
            }
            if let Some(default) = spec.default() {
                self.set(spec.name(), vec![default.clone()])?;
            }
        }
        for spec in descriptor.parameters() {
            if self.params.contains(spec.name()) {
                continue;
            }
            if let Some(default) = spec.default() {
                self.set(spec.name(), vec![default.clone()])?;
            }
        }
        Ok(())
    }

    /// Desired values of an attribute, whether property or parameter.
    pub fn get(&self, name: &str) -> Option<&[Value]> {
        match self.properties.get(name) {
            Some(prop) => Some(prop.should()),
            None => self.params.get(name),
        }
    }

    /// Look up one property.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Properties in declaration order, regardless of assignment order.
    pub fn properties(&self) -> Vec<&Property> {
        self.descriptor
            .properties()
            .iter()
            .filter_map(|spec| self.properties.get(spec.name()))
            .collect()
    }

    /// Names of assigned attributes in evaluation order.
    pub fn attribute_order(&self) -> Vec<&str> {
        self.descriptor
            .attribute_order()
            .into_iter()
            .filter(|name| self.properties.contains_key(*name) || self.params.contains(name))
            .collect()
    }

    /// Whether this resource was exported from its node.
    pub fn exported(&self) -> bool {
        self.exported
    }

    /// Whether this resource is virtual (declared but not realized).
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Mark the resource as exported; exporting also makes it virtual.
    pub fn set_exported(&mut self, exported: bool) {
        self.exported = exported;
        if exported {
            self.is_virtual = true;
        }
    }

    /// Change the virtual flag. An exported resource stays virtual.
    pub fn set_virtual(&mut self, is_virtual: bool) -> Result<()> {
        if !is_virtual && self.exported {
            return Err(Error::validation(
                "virtual",
                format!("{} is exported and must stay virtual", self.reference),
            ));
        }
        self.is_virtual = is_virtual;
        Ok(())
    }

    /// Tags: the type name, the title, and any `tag` values.
    pub fn tags(&self) -> Vec<String> {
        let mut tags = vec![self.reference.type_key(), self.title().to_lowercase()];
        if let Some(extra) = self.params.get("tag") {
            for tag in extra.iter().filter_map(Value::as_str) {
                let tag = tag.to_lowercase();
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        tags
    }

    /// Check if the resource carries any of the given tags.
    pub fn tagged(&self, wanted: &[String]) -> bool {
        let tags = self.tags();
        wanted
            .iter()
            .any(|w| tags.iter().any(|t| t.eq_ignore_ascii_case(w)))
    }

    /// Whether this resource is always evaluated in no-op mode.
    pub fn noop(&self) -> bool {
        self.params.flag("noop")
    }

    /// Edges declared through relationship metaparameters.
    pub fn relationships(&self) -> Result<Vec<Edge>> {
        let mut edges = Vec::new();
        for &meta in RELATIONSHIP_METAPARAMS {
            let Some(values) = self.params.get(meta) else {
                continue;
            };
            let refresh = matches!(meta, "notify" | "subscribe");
            for value in values {
                let other = parse_reference(meta, value)?;
                let edge = match meta {
                    "require" | "subscribe" => Edge::new(other, self.reference.clone(), refresh),
                    _ => Edge::new(self.reference.clone(), other, refresh),
                };
                edges.push(edge);
            }
        }
        Ok(edges)
    }

    /// Implicit prerequisites from the type's autorequire hook.
    pub fn autorequires(&self) -> Vec<ResourceRef> {
        self.descriptor.autorequires(self)
    }

    /// Retrieve, compare and (unless `noop`) sync every property once.
    ///
    /// Property failures do not stop later properties.
    pub fn converge(&mut self, noop: bool) -> Convergence {
        let noop = noop || self.noop();
        let mut outcome = Convergence::default();
        let names: Vec<String> = self
            .descriptor
            .properties()
            .iter()
            .map(|spec| spec.name().to_string())
            .filter(|name| self.properties.contains_key(name))
            .collect();

        let mut provider = match self.take_provider() {
            Ok(provider) => provider,
            Err(err) => {
                log::error!("{}: {err}", self.reference);
                outcome.failed = true;
                outcome.events.push(Event::Failed {
                    resource: self.reference.to_string(),
                    property: None,
                    message: err.to_string(),
                });
                return outcome;
            }
        };
        provider.flush();

        for name in names {
            let Some(prop) = self.properties.get_mut(&name) else {
                continue;
            };
            if prop.should().is_empty() {
                continue;
            }
            let mut cx = PropertyContext {
                resource: &self.reference,
                params: &self.params,
                provider: provider.as_mut(),
            };
            let step = evaluate_property(prop, &mut cx, noop);
            match step {
                Step::InSync => {}
                Step::Noop { from, to } => {
                    log::info!("{}/{name}: is {from}, should be {to} (noop)", self.reference);
                    outcome.noop = true;
                    outcome.events.push(Event::Noop {
                        resource: self.reference.to_string(),
                        property: name,
                        from,
                        to,
                    });
                }
                Step::Synced {
                    event,
                    from,
                    to,
                    previous,
                } => {
                    log::info!("{}/{name}: {event}: {from} => {to}", self.reference);
                    outcome.changed = true;
                    self.changes.push(Change {
                        property: name.clone(),
                        previous,
                    });
                    outcome.events.push(Event::Changed {
                        resource: self.reference.to_string(),
                        property: name,
                        name: event,
                        from,
                        to,
                    });
                }
                Step::Unchanged => {}
                Step::Failed(source) => {
                    let err = Error::Apply {
                        resource: self.reference.to_string(),
                        property: name.clone(),
                        source,
                    };
                    log::error!("{err}");
                    outcome.failed = true;
                    outcome.events.push(Event::Failed {
                        resource: self.reference.to_string(),
                        property: Some(name),
                        message: err.to_string(),
                    });
                }
            }
        }
        self.provider = Some(provider);
        outcome
    }

    /// React to an upstream change through the provider.
    pub fn refresh(&mut self) -> Event {
        let resource = self.reference.to_string();
        let result = match self.take_provider() {
            Ok(mut provider) => {
                let result = provider.refresh(&self.params);
                self.provider = Some(provider);
                result
            }
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(message) => {
                log::info!(
                    "{resource}: refreshed{}",
                    message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default()
                );
                Event::Refreshed { resource, message }
            }
            Err(err) => {
                log::error!("{resource}: refresh failed: {err:#}");
                Event::Failed {
                    resource,
                    property: None,
                    message: format!("refresh failed: {err:#}"),
                }
            }
        }
    }

    /// Whether any property was synced since the last `clear`.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Write the values observed before each change back, newest first.
    pub fn rollback(&mut self) -> Vec<Event> {
        let changes: Vec<Change> = self.changes.drain(..).rev().collect();
        let mut events = Vec::new();
        let mut provider = match self.take_provider() {
            Ok(provider) => provider,
            Err(err) => {
                events.push(Event::Failed {
                    resource: self.reference.to_string(),
                    property: None,
                    message: err.to_string(),
                });
                return events;
            }
        };
        provider.flush();

        for change in changes {
            let Some(prop) = self.properties.get_mut(&change.property) else {
                continue;
            };
            prop.restore(change.previous);
            let mut cx = PropertyContext {
                resource: &self.reference,
                params: &self.params,
                provider: provider.as_mut(),
            };
            match evaluate_property(prop, &mut cx, false) {
                Step::Synced { from, to, .. } => {
                    log::info!("{}/{}: rolled back {from} => {to}", self.reference, change.property);
                    events.push(Event::RolledBack {
                        resource: self.reference.to_string(),
                        property: change.property,
                        from,
                        to,
                    });
                }
                Step::Failed(err) => {
                    log::error!("{}/{}: rollback failed: {err:#}", self.reference, change.property);
                    events.push(Event::Failed {
                        resource: self.reference.to_string(),
                        property: Some(change.property),
                        message: format!("rollback failed: {err:#}"),
                    });
                }
                Step::InSync | Step::Unchanged | Step::Noop { .. } => {}
            }
        }
        self.provider = Some(provider);
        events
    }

    /// Drop observed state, recorded changes and the provider.
    pub fn clear(&mut self) {
        for prop in self.properties.values_mut() {
            prop.reset();
        }
        self.changes.clear();
        self.provider = None;
    }

    /// Take the provider out for the duration of a pass, building it on
    /// first use. Callers put it back when done.
    fn take_provider(&mut self) -> Result<Box<dyn Provider>> {
        match self.provider.take() {
            Some(provider) => Ok(provider),
            None => self.descriptor.make_provider(&self.params),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("reference", &self.reference)
            .field("params", &self.params)
            .field("properties", &self.properties)
            .field("exported", &self.exported)
            .field("virtual", &self.is_virtual)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.reference.fmt(f)
    }
}

enum Step {
    InSync,
    Noop {
        from: String,
        to: String,
    },
    Synced {
        event: String,
        from: String,
        to: String,
        previous: Value,
    },
    Unchanged,
    Failed(anyhow::Error),
}

fn evaluate_property(prop: &mut Property, cx: &mut PropertyContext<'_>, noop: bool) -> Step {
    prop.reset();
    let previous = match prop.retrieve(cx) {
        Ok(current) => current.clone(),
        Err(err) => return Step::Failed(err.context("could not retrieve current value")),
    };
    if let Err(err) = prop.prepare(cx) {
        return Step::Failed(err);
    }
    if prop.insync(cx) {
        return Step::InSync;
    }

    let from = prop.is_to_s();
    let to = prop.should_to_s();
    if noop {
        return Step::Noop { from, to };
    }
    match prop.sync(cx) {
        Ok(Some(event)) => Step::Synced {
            event,
            from,
            to,
            previous,
        },
        Ok(None) => Step::Unchanged,
        Err(err) => Step::Failed(err),
    }
}

fn single(name: &str, values: &[Value]) -> Result<String> {
    match values {
        [value] => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::validation(name, format!("expected a string, got {value}"))),
        _ => Err(Error::validation(name, "expected exactly one value")),
    }
}

fn parse_reference(meta: &str, value: &Value) -> Result<ResourceRef> {
    let text = value
        .as_str()
        .ok_or_else(|| Error::validation(meta, format!("{value} is not a resource reference")))?;
    ResourceRef::parse(text)
}
