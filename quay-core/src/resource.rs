//! Resource - Representing resources and their state

use std::collections::HashMap;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// Resource type (e.g., "ec2.vpc", "ecs.service")
    pub resource_type: String,
    /// Binding name, unique within a declaration (e.g., "public_subnet_1")
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Reference to another resource's attribute (binding_name, attribute_name)
    ResourceRef(String, String),
    /// String built from several parts, some of which may be references
    Concat(Vec<Value>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn reference(binding: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::ResourceRef(binding.into(), attribute.into())
    }

    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    /// Build a map value from key/value pairs
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns true if no reference remains anywhere inside this value
    pub fn is_resolved(&self) -> bool {
        match self {
            Value::ResourceRef(_, _) => false,
            Value::List(items) | Value::Concat(items) => items.iter().all(Value::is_resolved),
            Value::Map(map) => map.values().all(Value::is_resolved),
            _ => true,
        }
    }

    /// Visit every reference inside this value as (binding, attribute)
    pub fn for_each_ref<'a>(&'a self, f: &mut impl FnMut(&'a str, &'a str)) {
        match self {
            Value::ResourceRef(binding, attr) => f(binding, attr),
            Value::List(items) | Value::Concat(items) => {
                for item in items {
                    item.for_each_ref(f);
                }
            }
            Value::Map(map) => {
                for v in map.values() {
                    v.for_each_ref(f);
                }
            }
            _ => {}
        }
    }
}

/// Desired state of a single resource in a declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    /// Bindings that must exist before this resource, beyond attribute references
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_dependency(mut self, binding: impl Into<String>) -> Self {
        self.depends_on.push(binding.into());
        self
    }

    /// Binding name of this resource
    pub fn binding(&self) -> &str {
        &self.id.name
    }

    /// All bindings this resource depends on, from references and explicit dependencies
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for value in self.attributes.values() {
            value.for_each_ref(&mut |binding, _| {
                if !deps.iter().any(|d| d == binding) {
                    deps.push(binding.to_string());
                }
            });
        }
        for binding in &self.depends_on {
            if !deps.contains(binding) {
                deps.push(binding.clone());
            }
        }
        deps.sort();
        deps
    }
}

/// Current state, either recorded after an apply or read from the provider
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Provider-side physical identifier (e.g., vpc-xxx, a task definition ARN)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}
