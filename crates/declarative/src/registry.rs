//! Type registry
//!
//! Resource types are described once, at startup, by a [`TypeDescriptor`] and
//! registered by name. The descriptor owns attribute ordering, property kinds,
//! provider factories and the autorequire hook.

use crate::context::{NullProvider, Parameters, Provider};
use crate::error::{Error, Result};
use crate::property::PropertyKind;
use crate::reference::{CLASS_TYPE, ResourceRef};
use crate::resource::Resource;
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Name of the parameter selecting a provider.
pub const PROVIDER_PARAM: &str = "provider";

/// Metaparameters accepted by every type, in evaluation order.
pub const METAPARAMS: &[&str] = &["require", "before", "notify", "subscribe", "tag", "noop"];

/// Metaparameters whose values are resource references.
pub const RELATIONSHIP_METAPARAMS: &[&str] = &["require", "before", "notify", "subscribe"];

/// Builds a provider for one resource.
pub type ProviderFactory = Arc<dyn Fn(&Parameters) -> Box<dyn Provider> + Send + Sync>;

/// Derives implicit prerequisites from a resource's parameters.
pub type AutorequireFn = Arc<dyn Fn(&Resource) -> Vec<ResourceRef> + Send + Sync>;

/// Kind of attribute, as resolved by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// The name variable (identity) parameter.
    Namevar,
    /// A plain parameter.
    Parameter,
    /// A convergent property.
    Property,
    /// A metaparameter shared by every type.
    Metaparameter,
}

/// Declaration of a plain parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    name: String,
    default: Option<Value>,
    allowed: Vec<String>,
}

impl ParamSpec {
    /// Declare a parameter accepting any value.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            allowed: Vec::new(),
        }
    }

    /// Restrict values to a set of tokens.
    pub fn values(mut self, allowed: &[&str]) -> Self {
        self.allowed = allowed.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Value used by `Resource::set_defaults` when nothing was assigned.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared default, if any.
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Validate and normalize one value.
    pub(crate) fn munge(&self, value: Value) -> Result<Value> {
        if self.allowed.is_empty() {
            return Ok(value);
        }
        match value.as_str() {
            Some(s) if self.allowed.iter().any(|a| a == s) => Ok(Value::token(s)),
            _ => Err(Error::validation(
                &self.name,
                format!("{value} is not one of: {}", self.allowed.join(", ")),
            )),
        }
    }
}

/// Declaration of a property.
#[derive(Clone)]
pub struct PropertySpec {
    name: String,
    kind: Arc<dyn PropertyKind>,
    default: Option<Value>,
}

impl PropertySpec {
    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared behavior for this property.
    pub fn kind(&self) -> Arc<dyn PropertyKind> {
        Arc::clone(&self.kind)
    }

    /// Desired value used when the catalog assigns none.
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

impl fmt::Debug for PropertySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .finish()
    }
}

/// Everything the engine knows about one resource type.
pub struct TypeDescriptor {
    name: String,
    namevar: String,
    parameters: Vec<ParamSpec>,
    properties: Vec<PropertySpec>,
    providers: IndexMap<String, ProviderFactory>,
    autorequire: Option<AutorequireFn>,
}

impl TypeDescriptor {
    /// Start describing a type. The name is stored lowercase.
    pub fn builder(name: &str) -> TypeBuilder {
        TypeBuilder {
            descriptor: TypeDescriptor {
                name: name.to_lowercase(),
                namevar: "name".to_string(),
                parameters: Vec::new(),
                properties: Vec::new(),
                providers: IndexMap::new(),
                autorequire: None,
            },
        }
    }

    /// Registry key (lowercase).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the identity parameter.
    pub fn namevar(&self) -> &str {
        &self.namevar
    }

    /// Declared properties in declaration order.
    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    /// Declared plain parameters in declaration order.
    pub fn parameters(&self) -> &[ParamSpec] {
        &self.parameters
    }

    /// Look up a property declaration.
    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up a parameter declaration.
    pub fn parameter(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Whether the type has a `provider` parameter.
    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Classify an attribute name.
    pub fn attribute_kind(&self, name: &str) -> Option<AttributeKind> {
        if name == self.namevar {
            Some(AttributeKind::Namevar)
        } else if name == PROVIDER_PARAM && self.has_providers() {
            Some(AttributeKind::Parameter)
        } else if self.property(name).is_some() {
            Some(AttributeKind::Property)
        } else if self.parameter(name).is_some() {
            Some(AttributeKind::Parameter)
        } else if METAPARAMS.contains(&name) {
            Some(AttributeKind::Metaparameter)
        } else {
            None
        }
    }

    /// Attribute evaluation order.
    ///
    /// The namevar comes first, then the provider parameter (when the type has
    /// providers), then properties in declaration order, then the remaining
    /// parameters in declaration order, then metaparameters.
    pub fn attribute_order(&self) -> Vec<&str> {
        let mut order = vec![self.namevar.as_str()];
        if self.has_providers() {
            order.push(PROVIDER_PARAM);
        }
        order.extend(self.properties.iter().map(|p| p.name.as_str()));
        order.extend(
            self.parameters
                .iter()
                .map(|p| p.name.as_str())
                .filter(|n| *n != self.namevar && *n != PROVIDER_PARAM),
        );
        order.extend(METAPARAMS.iter().copied());
        order
    }

    /// Build the provider selected by the parameters (or the first declared).
    pub fn make_provider(&self, params: &Parameters) -> Result<Box<dyn Provider>> {
        if self.providers.is_empty() {
            return Ok(Box::new(NullProvider));
        }
        let factory = match params.str(PROVIDER_PARAM) {
            Some(name) => self.providers.get(name).ok_or_else(|| {
                Error::validation(PROVIDER_PARAM, format!("{} has no provider named {name}", self.name))
            })?,
            None => match self.providers.first() {
                Some((_, factory)) => factory,
                None => return Ok(Box::new(NullProvider)),
            },
        };
        Ok(factory(params))
    }

    /// Names of the declared providers.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Implicit prerequisites of a resource of this type.
    pub fn autorequires(&self, resource: &Resource) -> Vec<ResourceRef> {
        self.autorequire
            .as_ref()
            .map(|f| f(resource))
            .unwrap_or_default()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("namevar", &self.namevar)
            .field("parameters", &self.parameters)
            .field("properties", &self.properties)
            .field("providers", &self.provider_names())
            .finish_non_exhaustive()
    }
}

/// Builder for [`TypeDescriptor`].
pub struct TypeBuilder {
    descriptor: TypeDescriptor,
}

impl TypeBuilder {
    /// Name the identity parameter (defaults to `name`).
    pub fn namevar(mut self, name: &str) -> Self {
        self.descriptor.namevar = name.to_string();
        self
    }

    /// Declare a plain parameter.
    pub fn parameter(mut self, spec: ParamSpec) -> Self {
        self.descriptor.parameters.push(spec);
        self
    }

    /// Declare a property.
    pub fn property(mut self, name: &str, kind: impl PropertyKind + 'static) -> Self {
        self.descriptor.properties.push(PropertySpec {
            name: name.to_string(),
            kind: Arc::new(kind),
            default: None,
        });
        self
    }

    /// Declare a property that is always managed, with a default desired value.
    pub fn property_with_default(
        mut self,
        name: &str,
        kind: impl PropertyKind + 'static,
        default: impl Into<Value>,
    ) -> Self {
        self.descriptor.properties.push(PropertySpec {
            name: name.to_string(),
            kind: Arc::new(kind),
            default: Some(default.into()),
        });
        self
    }

    /// Declare a provider. The first one declared is the default.
    pub fn provider<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&Parameters) -> Box<dyn Provider> + Send + Sync + 'static,
    {
        self.descriptor
            .providers
            .insert(name.to_string(), Arc::new(factory));
        self
    }

    /// Derive implicit prerequisites.
    pub fn autorequire<F>(mut self, f: F) -> Self
    where
        F: Fn(&Resource) -> Vec<ResourceRef> + Send + Sync + 'static,
    {
        self.descriptor.autorequire = Some(Arc::new(f));
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

/// Registry of resource types, keyed by lowercase type name.
#[derive(Debug)]
pub struct TypeRegistry {
    types: IndexMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    /// Create a registry holding only the built-in container type.
    pub fn new() -> Self {
        let mut types = IndexMap::new();
        let class = TypeDescriptor::builder(CLASS_TYPE).build();
        types.insert(class.name.clone(), Arc::new(class));
        Self { types }
    }

    /// Register a type. Each name may be registered once.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<()> {
        if self.types.contains_key(&descriptor.name) {
            return Err(Error::DuplicateType(descriptor.name));
        }
        log::debug!("Registered resource type {}", descriptor.name);
        self.types
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }

    /// Look up a type by (any-case) name.
    pub fn get(&self, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(&type_name.to_lowercase()).cloned()
    }

    /// Check if a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(&type_name.to_lowercase())
    }

    /// Registered type names in registration order.
    pub fn type_names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// Instantiate a resource and assign its attributes in evaluation order.
    pub fn create(
        &self,
        type_name: &str,
        title: &str,
        attributes: IndexMap<String, Vec<Value>>,
    ) -> Result<Resource> {
        let reference = ResourceRef::new(type_name, title);
        let descriptor = self
            .get(&reference.type_key())
            .ok_or_else(|| Error::UnknownType(reference.type_name().to_string()))?;
        Resource::with_attributes(descriptor, reference.title(), attributes)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Plain;

    fn faketype() -> TypeDescriptor {
        TypeDescriptor::builder("faketype")
            .parameter(ParamSpec::new("one"))
            .property("two", Plain)
            .provider("testing", |_| Box::new(NullProvider))
            .build()
    }

    #[test]
    fn test_attribute_order() {
        let desc = faketype();
        let order = desc.attribute_order();
        assert_eq!(&order[..4], &["name", "provider", "two", "one"]);
        assert_eq!(&order[4..], METAPARAMS);
    }

    #[test]
    fn test_attribute_kind() {
        let desc = faketype();
        assert_eq!(desc.attribute_kind("name"), Some(AttributeKind::Namevar));
        assert_eq!(desc.attribute_kind("two"), Some(AttributeKind::Property));
        assert_eq!(desc.attribute_kind("one"), Some(AttributeKind::Parameter));
        assert_eq!(desc.attribute_kind("provider"), Some(AttributeKind::Parameter));
        assert_eq!(desc.attribute_kind("subscribe"), Some(AttributeKind::Metaparameter));
        assert_eq!(desc.attribute_kind("nosuchattr"), None);
    }

    #[test]
    fn test_register_once() {
        let mut registry = TypeRegistry::new();
        registry.register(faketype()).unwrap();
        assert!(registry.contains("FakeType"));
        assert!(matches!(
            registry.register(faketype()),
            Err(Error::DuplicateType(_))
        ));
        assert_eq!(registry.type_names(), vec!["class", "faketype"]);
    }

    #[test]
    fn test_param_values_become_tokens() {
        let spec = ParamSpec::new("links").values(&["follow", "manage"]);
        assert_eq!(spec.munge(Value::text("follow")).unwrap(), Value::token("follow"));
        assert!(spec.munge(Value::text("ignore")).is_err());
    }

    #[test]
    fn test_unknown_provider() {
        let desc = faketype();
        let mut params = Parameters::new();
        params.insert(PROVIDER_PARAM, vec![Value::token("nope")]);
        assert!(desc.make_provider(&params).is_err());
    }
}
