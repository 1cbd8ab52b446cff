//! Catalogs
//!
//! A [`Catalog`] is the compiled desired state of one node: its resources in
//! declaration order plus explicit edges between them.

use crate::context::ProgressCallback;
use crate::document::{AttributeValue, CatalogDocument, ResourceDocument};
use crate::error::{Error, Result};
use crate::graph::{Edge, RelationshipGraph};
use crate::reference::ResourceRef;
use crate::registry::TypeRegistry;
use crate::resource::Resource;
use crate::transaction::{Transaction, TransactionReport};
use crate::types::ApplyOptions;
use indexmap::IndexMap;
use std::time::Duration;

/// Graph of resources for one node.
#[derive(Debug, Default)]
pub struct Catalog {
    name: String,
    version: Option<i64>,
    classes: Vec<String>,
    resources: IndexMap<ResourceRef, Resource>,
    edges: Vec<Edge>,
    /// Loaded from the local cache rather than fetched.
    pub from_cache: bool,
    /// Describes the host's own configuration (as opposed to a one-off apply).
    pub host_config: bool,
    /// How long acquiring the catalog took.
    pub retrieval_duration: Option<Duration>,
}

impl Catalog {
    /// Create an empty catalog for a node.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host_config: true,
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn set_version(&mut self, version: Option<i64>) {
        self.version = version;
    }

    /// Classes applied to the node.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn add_class(&mut self, class: impl Into<String>) {
        let class = class.into();
        if !self.classes.contains(&class) {
            self.classes.push(class);
        }
    }

    /// Add a resource. Identities must be unique.
    pub fn add_resource(&mut self, resource: Resource) -> Result<()> {
        let reference = resource.reference().clone();
        if self.resources.contains_key(&reference) {
            return Err(Error::DuplicateResource(reference.to_string()));
        }
        self.resources.insert(reference, resource);
        Ok(())
    }

    /// Add an explicit edge.
    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn resource(&self, reference: &ResourceRef) -> Option<&Resource> {
        self.resources.get(reference)
    }

    pub fn resource_mut(&mut self, reference: &ResourceRef) -> Option<&mut Resource> {
        self.resources.get_mut(reference)
    }

    /// Resources in declaration order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Explicit edges (not including metaparameter relationships).
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Build and validate the full dependency graph.
    pub fn relationship_graph(&self) -> Result<RelationshipGraph> {
        RelationshipGraph::build(self)
    }

    /// Converge every resource in dependency order.
    pub fn apply(
        &mut self,
        options: &ApplyOptions,
        progress: &mut dyn ProgressCallback,
    ) -> Result<TransactionReport> {
        let mut transaction = Transaction::new(self, options.clone());
        transaction.evaluate(progress)?;
        Ok(transaction.into_report())
    }

    /// Drop every resource and edge.
    pub fn clear(&mut self) {
        for resource in self.resources.values_mut() {
            resource.clear();
        }
        self.resources.clear();
        self.edges.clear();
        self.classes.clear();
    }

    /// Instantiate a catalog from its document form.
    ///
    /// Virtual and exported resources are declarations only and are left out.
    pub fn from_document(document: CatalogDocument, registry: &TypeRegistry) -> Result<Self> {
        let mut catalog = Self::new(document.name);
        catalog.version = document.version;
        for class in document.classes {
            catalog.add_class(class);
        }
        for resource in document.resources {
            if resource.exported || resource.is_virtual {
                log::debug!("Skipping virtual resource {}[{}]", resource.type_name, resource.title);
                continue;
            }
            let attributes = resource.attributes();
            catalog.add_resource(registry.create(&resource.type_name, &resource.title, attributes)?)?;
        }
        for edge in document.edges {
            catalog.add_edge(edge);
        }
        Ok(catalog)
    }

    /// Serialize back to document form.
    pub fn to_document(&self) -> CatalogDocument {
        let resources = self
            .resources
            .values()
            .map(|resource| {
                let mut parameters = IndexMap::new();
                for name in resource.attribute_order() {
                    let values = match resource.property(name) {
                        Some(prop) => prop.document_values(),
                        None => match resource.parameters().get(name) {
                            Some(values) => values.to_vec(),
                            None => continue,
                        },
                    };
                    if name == resource.descriptor().namevar()
                        && values.first().and_then(|v| v.as_str()) == Some(resource.title())
                    {
                        continue;
                    }
                    parameters.insert(name.to_string(), AttributeValue::from(values));
                }
                ResourceDocument {
                    type_name: resource.descriptor().name().to_string(),
                    title: resource.title().to_string(),
                    exported: resource.exported(),
                    is_virtual: resource.is_virtual(),
                    parameters,
                }
            })
            .collect();

        CatalogDocument {
            name: self.name.clone(),
            version: self.version,
            classes: self.classes.clone(),
            resources,
            edges: self.edges.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Plain;
    use crate::registry::{ParamSpec, TypeDescriptor};
    use crate::value::Value;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                TypeDescriptor::builder("thing")
                    .property("value", Plain)
                    .parameter(ParamSpec::new("size"))
                    .build(),
            )
            .unwrap();
        registry
    }

    fn document() -> CatalogDocument {
        serde_json::from_str(
            r#"{
                "name": "web01",
                "version": 42,
                "classes": ["base"],
                "resources": [
                    {"type": "thing", "title": "a", "parameters": {"value": "x", "size": 3}},
                    {"type": "thing", "title": "b", "parameters": {"value": ["y", "z"], "require": "Thing[a]"}},
                    {"type": "thing", "title": "ghost", "exported": true}
                ],
                "edges": []
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_virtual_resources_are_skipped() {
        let catalog = Catalog::from_document(document(), &registry()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.resource(&ResourceRef::new("thing", "ghost")).is_none());
        assert_eq!(catalog.version(), Some(42));
    }

    #[test]
    fn test_document_round_trip() {
        let registry = registry();
        let catalog = Catalog::from_document(document(), &registry).unwrap();
        let json = serde_json::to_string(&catalog.to_document()).unwrap();

        let reparsed: CatalogDocument = serde_json::from_str(&json).unwrap();
        let mut again = Catalog::from_document(reparsed, &registry).unwrap();
        again.from_cache = true;

        let b = again.resource(&ResourceRef::new("thing", "b")).unwrap();
        assert_eq!(b.get("value"), Some(&[Value::text("y"), Value::text("z")][..]));
        assert_eq!(b.get("require"), Some(&[Value::text("Thing[a]")][..]));
        let a = again.resource(&ResourceRef::new("thing", "a")).unwrap();
        assert_eq!(a.get("size"), Some(&[Value::Integer(3)][..]));
        assert_eq!(again.classes(), &["base".to_string()]);
        assert!(again.from_cache);
    }

    #[test]
    fn test_duplicate_resource() {
        let registry = registry();
        let mut catalog = Catalog::new("n");
        catalog
            .add_resource(registry.create("thing", "a", IndexMap::new()).unwrap())
            .unwrap();
        let err = catalog
            .add_resource(registry.create("Thing", "a", IndexMap::new()).unwrap())
            .unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_unknown_type() {
        let mut doc = document();
        doc.resources[0].type_name = "nope".into();
        assert!(matches!(
            Catalog::from_document(doc, &registry()),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn test_clear() {
        let mut catalog = Catalog::from_document(document(), &registry()).unwrap();
        catalog.clear();
        assert!(catalog.is_empty());
        assert!(catalog.classes().is_empty());
    }
}
