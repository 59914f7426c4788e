//! Effect - A single side effect to be performed against a provider
//!
//! Effects are plain values. Nothing happens until an Interpreter runs them.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create a resource that does not exist yet
    Create(Resource),
    /// Update a resource in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Delete the existing resource and create it again
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Delete a resource
    Delete { id: ResourceId, from: State },
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Replace { id, .. } | Effect::Delete { id, .. } => {
                id
            }
        }
    }

    /// Returns true if the resource's computed attributes are unknown until applied
    pub fn produces_new_identity(&self) -> bool {
        matches!(self, Effect::Create(_) | Effect::Replace { .. })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Effect::Create(_) => "+",
            Effect::Update { .. } => "~",
            Effect::Replace { .. } => "-/+",
            Effect::Delete { .. } => "-",
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Effect::Create(_) => "Create",
            Effect::Update { .. } => "Update",
            Effect::Replace { .. } => "Replace",
            Effect::Delete { .. } => "Delete",
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.verb(), self.resource_id())
    }
}
