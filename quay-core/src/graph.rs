//! Graph - Dependency analysis for a set of resources
//!
//! Nodes are resource bindings, edges are "depends on" relations collected from
//! attribute references and explicit dependencies. The apply order is a
//! topological sort of this graph; the destroy order is its exact reverse.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use thiserror::Error;

use crate::resource::Resource;

/// Dependency between resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Target resource binding name
    pub target: String,
    /// Referenced attribute (None for an explicit dependency)
    pub attribute: Option<String>,
    /// Where this reference is used (e.g., "vpc_id")
    pub used_in: Option<String>,
}

/// Structural problem found in a resource graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Duplicate binding '{0}'")]
    DuplicateBinding(String),

    #[error("{}", describe_dangling(.from, .target, .attribute))]
    DanglingReference {
        from: String,
        target: String,
        attribute: Option<String>,
    },

    #[error("Dependency cycle between: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

fn describe_dangling(from: &str, target: &str, attribute: &Option<String>) -> String {
    match attribute {
        Some(attr) => format!(
            "'{}' references '{}.{}', but '{}' is not declared",
            from, target, attr, target
        ),
        None => format!(
            "'{}' depends on '{}', but '{}' is not declared",
            from, target, target
        ),
    }
}

/// Dependency graph for the resources of one declaration
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Every declared binding
    pub nodes: BTreeSet<String>,
    /// Resource binding name -> list of dependencies
    pub edges: BTreeMap<String, Vec<Dependency>>,
    /// Reverse edges: target -> list of resources that depend on it
    pub reverse_edges: BTreeMap<String, Vec<String>>,
    duplicates: Vec<String>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a set of resources
    pub fn build(resources: &[Resource]) -> Self {
        let mut graph = Self::new();

        for resource in resources {
            let binding = resource.binding().to_string();
            if !graph.nodes.insert(binding.clone()) {
                graph.duplicates.push(binding);
            }
        }

        for resource in resources {
            let from = resource.binding();
            let mut keys: Vec<&String> = resource.attributes.keys().collect();
            keys.sort();
            for key in keys {
                resource.attributes[key].for_each_ref(&mut |target, attribute| {
                    graph.add_edge(
                        from.to_string(),
                        Dependency {
                            target: target.to_string(),
                            attribute: Some(attribute.to_string()),
                            used_in: Some(key.clone()),
                        },
                    );
                });
            }
            for target in &resource.depends_on {
                graph.add_edge(
                    from.to_string(),
                    Dependency {
                        target: target.clone(),
                        attribute: None,
                        used_in: None,
                    },
                );
            }
        }

        graph
    }

    /// Add a dependency edge
    pub fn add_edge(&mut self, from: String, dependency: Dependency) {
        let target = dependency.target.clone();
        self.edges.entry(from.clone()).or_default().push(dependency);
        let dependents = self.reverse_edges.entry(target).or_default();
        if !dependents.contains(&from) {
            dependents.push(from);
        }
    }

    /// Get direct dependencies of a resource
    pub fn dependencies_of(&self, resource: &str) -> &[Dependency] {
        self.edges.get(resource).map_or(&[], |v| v.as_slice())
    }

    /// Get distinct bindings a resource depends on
    pub fn dependency_targets(&self, resource: &str) -> BTreeSet<&str> {
        self.dependencies_of(resource)
            .iter()
            .map(|d| d.target.as_str())
            .collect()
    }

    /// Get resources that depend on this resource
    pub fn dependents_of(&self, resource: &str) -> &[String] {
        self.reverse_edges
            .get(resource)
            .map_or(&[], |v| v.as_slice())
    }

    /// Check every structural invariant of the graph
    ///
    /// Returns all problems found rather than stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<GraphError>> {
        let mut errors: Vec<GraphError> = self
            .duplicates
            .iter()
            .map(|b| GraphError::DuplicateBinding(b.clone()))
            .collect();

        for (from, deps) in &self.edges {
            for dep in deps {
                if !self.nodes.contains(&dep.target) {
                    errors.push(GraphError::DanglingReference {
                        from: from.clone(),
                        target: dep.target.clone(),
                        attribute: dep.attribute.clone(),
                    });
                }
            }
        }

        if let Err(cycle) = self.topological_order() {
            errors.push(cycle);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Order bindings so every resource comes after everything it depends on
    ///
    /// Ties are broken by binding name, so the same graph always produces the
    /// same order. Edges to undeclared bindings are ignored here; `validate`
    /// reports them.
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.as_str(), 0)).collect();

        for node in &self.nodes {
            let declared = self
                .dependency_targets(node)
                .into_iter()
                .filter(|t| self.nodes.contains(*t))
                .count();
            in_degree.insert(node.as_str(), declared);
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut emitted: HashSet<&str> = HashSet::new();

        while let Some(node) = ready.pop_first() {
            order.push(node.to_string());
            emitted.insert(node);

            for dependent in self.dependents_of(node) {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            let stuck = self
                .nodes
                .iter()
                .filter(|n| !emitted.contains(n.as_str()))
                .cloned()
                .collect();
            Err(GraphError::Cycle(stuck))
        }
    }

    /// Order bindings so every resource is removed before what it depends on
    pub fn destroy_order(&self) -> Result<Vec<String>, GraphError> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }
}

/// Sort resources into apply order
pub fn sort_resources(resources: &[Resource]) -> Result<Vec<Resource>, GraphError> {
    let graph = DependencyGraph::build(resources);
    let order = graph.topological_order()?;
    let by_binding: HashMap<&str, &Resource> =
        resources.iter().map(|r| (r.binding(), r)).collect();

    Ok(order
        .iter()
        .filter_map(|b| by_binding.get(b.as_str()).map(|r| (*r).clone()))
        .collect())
}
