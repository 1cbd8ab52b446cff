//! Relationship graph
//!
//! Collects explicit edges, metaparameter relationships and autorequires of a
//! catalog into one directed graph, validates it, and produces the evaluation
//! order.

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::reference::ResourceRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A dependency between two resources: `source` is evaluated before
/// `target`. Refresh edges also trigger a refresh of `target` when
/// `source` changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: ResourceRef,
    pub target: ResourceRef,
    #[serde(default)]
    pub refresh: bool,
}

impl Edge {
    pub fn new(source: ResourceRef, target: ResourceRef, refresh: bool) -> Self {
        Self {
            source,
            target,
            refresh,
        }
    }
}

/// Validated dependency graph over a catalog's resources.
#[derive(Debug, Clone)]
pub struct RelationshipGraph {
    nodes: Vec<ResourceRef>,
    index: HashMap<ResourceRef, usize>,
    /// Outgoing edges per node: (target, refresh)
    outgoing: Vec<Vec<(usize, bool)>>,
    /// Incoming edges per node: (source, refresh)
    incoming: Vec<Vec<(usize, bool)>>,
}

impl RelationshipGraph {
    /// Build the graph for a catalog.
    ///
    /// Declared edges must resolve on both ends. Autorequires are only added
    /// when the required resource is present.
    pub fn build(catalog: &Catalog) -> Result<Self> {
        let nodes: Vec<ResourceRef> = catalog.resources().map(|r| r.reference().clone()).collect();
        let index: HashMap<ResourceRef, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, r)| (r.clone(), i))
            .collect();
        let mut graph = Self {
            outgoing: vec![Vec::new(); nodes.len()],
            incoming: vec![Vec::new(); nodes.len()],
            nodes,
            index,
        };

        for edge in catalog.edges() {
            graph.add_declared(edge, &edge.source)?;
        }
        for resource in catalog.resources() {
            for edge in resource.relationships()? {
                graph.add_declared(&edge, resource.reference())?;
            }
        }
        for resource in catalog.resources() {
            for required in resource.autorequires() {
                if &required == resource.reference() {
                    continue;
                }
                if let (Some(&from), Some(&to)) =
                    (graph.index.get(&required), graph.index.get(resource.reference()))
                {
                    log::debug!("Autorequiring {required} for {}", resource.reference());
                    graph.connect(from, to, false);
                }
            }
        }
        Ok(graph)
    }

    fn add_declared(&mut self, edge: &Edge, declared_by: &ResourceRef) -> Result<()> {
        let lookup = |r: &ResourceRef| {
            self.index.get(r).copied().ok_or_else(|| Error::DanglingReference {
                source_ref: declared_by.to_string(),
                target: r.to_string(),
            })
        };
        let from = lookup(&edge.source)?;
        let to = lookup(&edge.target)?;
        self.connect(from, to, edge.refresh);
        Ok(())
    }

    /// Add an edge, merging the refresh flag into an existing one.
    fn connect(&mut self, from: usize, to: usize, refresh: bool) {
        if let Some(existing) = self.outgoing[from].iter_mut().find(|(t, _)| *t == to) {
            existing.1 |= refresh;
            if let Some(back) = self.incoming[to].iter_mut().find(|(s, _)| *s == from) {
                back.1 |= refresh;
            }
            return;
        }
        self.outgoing[from].push((to, refresh));
        self.incoming[to].push((from, refresh));
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no resources.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All edges, grouped by source in declaration order.
    pub fn edges(&self) -> Vec<Edge> {
        self.outgoing
            .iter()
            .enumerate()
            .flat_map(|(from, targets)| {
                targets.iter().map(move |&(to, refresh)| {
                    Edge::new(self.nodes[from].clone(), self.nodes[to].clone(), refresh)
                })
            })
            .collect()
    }

    /// Resources this one depends on, with the refresh flag of each edge.
    pub fn dependencies(&self, reference: &ResourceRef) -> Vec<(&ResourceRef, bool)> {
        self.index
            .get(reference)
            .map(|&i| {
                self.incoming[i]
                    .iter()
                    .map(|&(s, refresh)| (&self.nodes[s], refresh))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resources depending on this one, with the refresh flag of each edge.
    pub fn dependents(&self, reference: &ResourceRef) -> Vec<(&ResourceRef, bool)> {
        self.index
            .get(reference)
            .map(|&i| {
                self.outgoing[i]
                    .iter()
                    .map(|&(t, refresh)| (&self.nodes[t], refresh))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Topological order; ties are broken by declaration order.
    pub fn topological_order(&self) -> Result<Vec<ResourceRef>> {
        let mut in_degree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(next) = ready.pop_first() {
            order.push(self.nodes[next].clone());
            for &(to, _) in &self.outgoing[next] {
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    ready.insert(to);
                }
            }
        }

        if order.len() < self.nodes.len() {
            return Err(Error::Cycle {
                path: self.find_cycle(&in_degree),
            });
        }
        Ok(order)
    }

    /// Walk backwards through unsorted nodes until one repeats.
    fn find_cycle(&self, in_degree: &[usize]) -> Vec<String> {
        let Some(start) = in_degree.iter().position(|d| *d > 0) else {
            return Vec::new();
        };
        let mut seen: HashMap<usize, usize> = HashMap::new();
        let mut walk = Vec::new();
        let mut current = start;
        while !seen.contains_key(&current) {
            seen.insert(current, walk.len());
            walk.push(current);
            match self.incoming[current]
                .iter()
                .find(|(s, _)| in_degree[*s] > 0)
            {
                Some(&(prev, _)) => current = prev,
                None => break,
            }
        }
        let from = seen.get(&current).copied().unwrap_or(0);
        let mut cycle: Vec<String> = walk[from..]
            .iter()
            .rev()
            .map(|&i| self.nodes[i].to_string())
            .collect();
        if let Some(first) = cycle.first().cloned() {
            cycle.push(first);
        }
        cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{TypeDescriptor, TypeRegistry};
    use crate::value::Value;
    use indexmap::IndexMap;

    fn catalog(resources: &[(&str, &[(&str, &str)])]) -> Catalog {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                TypeDescriptor::builder("node")
                    .autorequire(|r| {
                        r.parameters()
                            .str("parent")
                            .map(|p| vec![ResourceRef::new("node", p)])
                            .unwrap_or_default()
                    })
                    .parameter(crate::registry::ParamSpec::new("parent"))
                    .build(),
            )
            .unwrap();
        let mut catalog = Catalog::new("test");
        for (title, attrs) in resources {
            let attrs: IndexMap<String, Vec<Value>> = attrs
                .iter()
                .map(|(k, v)| ((*k).to_string(), vec![Value::text(*v)]))
                .collect();
            catalog
                .add_resource(registry.create("node", title, attrs).unwrap())
                .unwrap();
        }
        catalog
    }

    fn order(catalog: &Catalog) -> Vec<String> {
        RelationshipGraph::build(catalog)
            .unwrap()
            .topological_order()
            .unwrap()
            .iter()
            .map(|r| r.title().to_string())
            .collect()
    }

    #[test]
    fn test_declaration_order_without_edges() {
        let c = catalog(&[("c", &[]), ("a", &[]), ("b", &[])]);
        assert_eq!(order(&c), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_require_and_before() {
        let c = catalog(&[
            ("app", &[("require", "Node[db]")]),
            ("db", &[]),
            ("first", &[("before", "Node[app]")]),
        ]);
        assert_eq!(order(&c), vec!["db", "first", "app"]);
    }

    #[test]
    fn test_autorequire_only_when_present() {
        let c = catalog(&[
            ("/etc/app/conf", &[("parent", "/etc/app")]),
            ("/etc/app", &[("parent", "/etc")]),
        ]);
        assert_eq!(order(&c), vec!["/etc/app", "/etc/app/conf"]);
    }

    #[test]
    fn test_dangling_reference() {
        let c = catalog(&[("app", &[("require", "Node[missing]")])]);
        let err = RelationshipGraph::build(&c).unwrap_err();
        assert!(matches!(err, Error::DanglingReference { .. }));
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let c = catalog(&[
            ("a", &[("require", "Node[b]")]),
            ("b", &[("require", "Node[a]")]),
            ("c", &[]),
        ]);
        let graph = RelationshipGraph::build(&c).unwrap();
        match graph.topological_order().unwrap_err() {
            Error::Cycle { path } => {
                assert_eq!(path.len(), 3);
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"Node[a]".to_string()));
                assert!(path.contains(&"Node[b]".to_string()));
            }
            other => panic!("expected a cycle, got {other}"),
        }
    }

    #[test]
    fn test_refresh_flag_merges() {
        let c = catalog(&[
            ("svc", &[("require", "Node[conf]"), ("subscribe", "Node[conf]")]),
            ("conf", &[]),
        ]);
        let graph = RelationshipGraph::build(&c).unwrap();
        let edges = graph.edges();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].refresh);
    }
}
