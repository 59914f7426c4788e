//! Declaration - A named, self-contained desired-state graph
//!
//! A declaration is valid when every resource passes its schema, every
//! reference (from resources and outputs) names a declared binding, and the
//! dependency graph is acyclic. Validation happens before any provider call.

use std::collections::HashMap;

use thiserror::Error;

use crate::graph::{DependencyGraph, GraphError};
use crate::resource::{Resource, ResourceId, Value};
use crate::schema::{ResourceSchema, TypeError};

/// Named value exposed after apply (e.g., the public URL)
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub name: String,
    pub value: Value,
    pub description: Option<String>,
}

impl Output {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Reasons a declaration is rejected before anything is applied
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("Invalid configuration for '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    #[error("Invalid resource graph:\n  {}", format_graph_errors(.0))]
    Graph(Vec<GraphError>),

    #[error("Unknown resource type for {0}")]
    UnknownResourceType(ResourceId),

    #[error("{resource}: {}", format_type_errors(.errors))]
    Schema {
        resource: ResourceId,
        errors: Vec<TypeError>,
    },

    #[error("Output '{output}' references '{target}', which is not declared")]
    DanglingOutput { output: String, target: String },
}

impl DeclarationError {
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn format_graph_errors(errors: &[GraphError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n  ")
}

fn format_type_errors(errors: &[TypeError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Desired state of a whole stack
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declaration {
    /// Identity of the declaration (used for state and locking)
    pub name: String,
    pub resources: Vec<Resource>,
    pub outputs: Vec<Output>,
}

impl Declaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    pub fn output(&mut self, output: Output) {
        self.outputs.push(output);
    }

    pub fn find(&self, binding: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.binding() == binding)
    }

    /// Resources of a given type, in declaration order
    pub fn of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Resource> {
        self.resources
            .iter()
            .filter(move |r| r.id.resource_type == resource_type)
    }

    pub fn graph(&self) -> DependencyGraph {
        DependencyGraph::build(&self.resources)
    }

    /// Check structure only (bindings, references, cycles)
    pub fn validate_graph(&self) -> Result<DependencyGraph, DeclarationError> {
        let graph = self.graph();
        graph.validate().map_err(DeclarationError::Graph)?;

        for output in &self.outputs {
            let mut missing = None;
            output.value.for_each_ref(&mut |binding, _| {
                if missing.is_none() && !graph.nodes.contains(binding) {
                    missing = Some(binding.to_string());
                }
            });
            if let Some(target) = missing {
                return Err(DeclarationError::DanglingOutput {
                    output: output.name.clone(),
                    target,
                });
            }
        }

        Ok(graph)
    }

    /// Check structure and every resource against its schema
    pub fn validate(
        &self,
        schemas: &HashMap<String, ResourceSchema>,
    ) -> Result<DependencyGraph, DeclarationError> {
        let graph = self.validate_graph()?;

        for resource in &self.resources {
            let schema = schemas
                .get(&resource.id.resource_type)
                .ok_or_else(|| DeclarationError::UnknownResourceType(resource.id.clone()))?;
            schema
                .validate(&resource.attributes)
                .map_err(|errors| DeclarationError::Schema {
                    resource: resource.id.clone(),
                    errors,
                })?;
        }

        Ok(graph)
    }

    /// Resources in apply order
    pub fn sorted_resources(&self) -> Result<Vec<Resource>, DeclarationError> {
        crate::graph::sort_resources(&self.resources)
            .map_err(|e| DeclarationError::Graph(vec![e]))
    }
}
