//! State file structures for persisting infrastructure state

use std::collections::{BTreeMap, HashMap};

use quay_core::resource::{ResourceId, State, Value};
use serde::{Deserialize, Serialize};

/// The state file persisted by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Identity of this state's history; a mismatch means a different stack
    pub lineage: String,
    /// Version of quay that last wrote this state
    pub quay_version: String,
    /// Managed resources in the order they were applied
    pub resources: Vec<ResourceState>,
    /// Stack outputs as of the last apply
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            quay_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Increment serial and update the writer version
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.quay_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Add or update a resource, keeping its position when it already exists
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.name == resource.name)
        {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove_resource(&mut self, resource_type: &str, name: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(pos))
    }

    /// Recorded resources as states, in recorded order
    pub fn states(&self) -> Vec<State> {
        self.resources.iter().map(ResourceState::to_state).collect()
    }

    /// Recorded dependencies of each binding
    pub fn dependencies(&self) -> HashMap<String, Vec<String>> {
        self.resources
            .iter()
            .map(|r| (r.name.clone(), r.dependencies.clone()))
            .collect()
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "ec2.vpc", "docker.image_push")
    pub resource_type: String,
    /// Binding of the resource in the declaration
    pub name: String,
    /// Provider that manages the resource (e.g., "awscc", "docker")
    pub provider: String,
    /// Provider-side physical identifier
    #[serde(default)]
    pub identifier: Option<String>,
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Bindings this resource depended on when it was applied
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: None,
            attributes: BTreeMap::new(),
            dependencies: Vec::new(),
        }
    }

    /// Record `state`, applied by `provider` after `dependencies`
    pub fn from_state(state: &State, provider: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.into(),
            identifier: state.identifier.clone(),
            attributes: state
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
            dependencies,
        }
    }

    pub fn to_state(&self) -> State {
        let id = ResourceId::new(&self.resource_type, &self.name);
        let attributes = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), json_to_value(v)))
            .collect();
        let state = State::existing(id, attributes);
        match &self.identifier {
            Some(identifier) => state.with_identifier(identifier),
            None => state,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Recorded values are resolved; a leftover reference is kept as `${binding.attr}`
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Int(n) => serde_json::Value::Number((*n).into()),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => {
            let obj: serde_json::Map<_, _> = map
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect();
            serde_json::Value::Object(obj)
        }
        Value::ResourceRef(binding, attr) => {
            serde_json::Value::String(format!("${{{}.{}}}", binding, attr))
        }
        Value::Concat(parts) => {
            let joined: String = parts
                .iter()
                .map(|p| match value_to_json(p) {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect();
            serde_json::Value::String(joined)
        }
    }
}

pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Number(n) => Value::Int(n.as_i64().unwrap_or_default()),
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect(),
        ),
        serde_json::Value::Null => Value::String(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vpc_state() -> State {
        State::existing(
            ResourceId::new("ec2.vpc", "vpc"),
            HashMap::from([
                ("cidr_block".to_string(), Value::string("10.0.0.0/16")),
                ("enable_dns_support".to_string(), Value::Bool(true)),
                (
                    "tags".to_string(),
                    Value::map([("Name", Value::string("web-vpc"))]),
                ),
                ("vpc_id".to_string(), Value::string("vpc-0abc")),
            ]),
        )
        .with_identifier("vpc-0abc")
    }

    #[test]
    fn new_state_is_empty_with_fresh_lineage() {
        let state = StateFile::new();
        assert_eq!(state.version, StateFile::CURRENT_VERSION);
        assert_eq!(state.serial, 0);
        assert!(state.resources.is_empty());
        assert_ne!(state.lineage, StateFile::new().lineage);
    }

    #[test]
    fn upsert_keeps_recorded_order() {
        let mut state = StateFile::new();
        state.upsert_resource(ResourceState::new("ec2.vpc", "vpc", "awscc"));
        state.upsert_resource(ResourceState::new("ec2.subnet", "public_subnet_1", "awscc"));
        state.upsert_resource(
            ResourceState::new("ec2.vpc", "vpc", "awscc")
                .with_attribute("vpc_id", serde_json::json!("vpc-1")),
        );

        let names: Vec<&str> = state.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["vpc", "public_subnet_1"]);
        assert_eq!(
            state.find_resource("ec2.vpc", "vpc").unwrap().attributes["vpc_id"],
            serde_json::json!("vpc-1")
        );

        assert!(state.remove_resource("ec2.vpc", "vpc").is_some());
        assert!(state.remove_resource("ec2.vpc", "vpc").is_none());
    }

    #[test]
    fn recorded_state_converts_back() {
        let original = vpc_state();
        let recorded = ResourceState::from_state(&original, "awscc", vec![]);
        assert_eq!(recorded.identifier.as_deref(), Some("vpc-0abc"));
        assert_eq!(recorded.to_state(), original);
    }

    #[test]
    fn state_file_survives_serialization() {
        let mut state = StateFile::new();
        state.increment_serial();
        state.upsert_resource(ResourceState::from_state(
            &vpc_state(),
            "awscc",
            vec!["internet_gateway".to_string()],
        ));
        state
            .outputs
            .insert("url".to_string(), serde_json::json!("http://web.example"));

        let json = serde_json::to_string_pretty(&state).unwrap();
        let parsed: StateFile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
        assert_eq!(parsed.states(), vec![vpc_state()]);
        assert_eq!(parsed.dependencies()["vpc"], vec!["internet_gateway"]);
    }
}
