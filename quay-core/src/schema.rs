//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type,
//! enabling type validation before anything is applied.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Any value (nested provider structures that are passed through)
    Any,
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::Any, _) => Ok(()),

            // References and concatenations resolve to strings at apply time
            (
                AttributeType::String,
                Value::String(_) | Value::ResourceRef(_, _) | Value::Concat(_),
            ) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            // Unresolved values cannot be checked by a custom validator yet
            (AttributeType::Custom { base, .. }, Value::ResourceRef(_, _) | Value::Concat(_)) => {
                base.validate(value)
            }
            (AttributeType::Custom { validate, .. }, v) => {
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Any => "Any".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
            Value::ResourceRef(binding, attr) => format!("ResourceRef({}.{})", binding, attr),
            Value::Concat(_) => "Concat".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Changing this attribute forces the resource to be replaced
    pub create_only: bool,
    /// Set by the provider, never declared
    pub read_only: bool,
    pub description: Option<String>,
    /// Provider-side property name (e.g., "VpcId" for AWS Cloud Control)
    pub provider_name: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            create_only: false,
            read_only: false,
            description: None,
            provider_name: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn create_only(mut self) -> Self {
        self.create_only = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
    /// The provider lets this resource be deleted while others still refer
    /// to it, so replacing it leaves its dependents in place
    pub deletable_while_referenced: bool,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
            deletable_while_referenced: false,
        }
    }

    pub fn deletable_while_referenced(mut self) -> Self {
        self.deletable_while_referenced = true;
        self
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Names of attributes whose change forces replacement
    pub fn create_only_attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .values()
            .filter(|a| a.create_only)
            .map(|a| a.name.as_str())
    }

    /// Validate resource attributes
    ///
    /// Unknown and read-only attributes are rejected.
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        let mut names: Vec<&String> = self.attributes.keys().collect();
        names.sort();
        for name in names {
            let schema = &self.attributes[name];
            if schema.required && !attributes.contains_key(name) {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        let mut declared: Vec<(&String, &Value)> = attributes.iter().collect();
        declared.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in declared {
            match self.attributes.get(name) {
                Some(schema) if schema.read_only => {
                    errors.push(TypeError::AttributeError {
                        name: name.clone(),
                        inner: Box::new(TypeError::ValidationFailed {
                            message: "attribute is read-only".to_string(),
                        }),
                    });
                }
                Some(schema) => {
                    if let Err(e) = schema.attr_type.validate(value) {
                        errors.push(TypeError::AttributeError {
                            name: name.clone(),
                            inner: Box::new(e),
                        });
                    }
                }
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Constructors for constrained attribute types
pub mod types {
    use super::*;

    fn int_in(name: &str, validate: fn(&Value) -> Result<(), String>) -> AttributeType {
        AttributeType::Custom {
            name: name.to_string(),
            base: Box::new(AttributeType::Int),
            validate,
        }
    }

    pub fn non_negative_int() -> AttributeType {
        int_in("NonNegativeInt", |value| match value {
            Value::Int(n) if *n >= 0 => Ok(()),
            Value::Int(n) => Err(format!("{} is negative", n)),
            _ => Err("Expected integer".to_string()),
        })
    }

    /// TCP or UDP port, 1 through 65535
    pub fn port_number() -> AttributeType {
        int_in("PortNumber", |value| match value {
            Value::Int(n) if (1..=65535).contains(n) => Ok(()),
            Value::Int(n) => Err(format!("{} is not a port number (1-65535)", n)),
            _ => Err("Expected integer".to_string()),
        })
    }

    /// IPv4 block in `a.b.c.d/len` notation
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_cidr(s),
                _ => Err("Expected string".to_string()),
            },
        }
    }
}

/// Check `a.b.c.d/len` notation without requiring host bits to be zero
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let (address, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| format!("'{}' is not in address/prefix form", cidr))?;

    address
        .parse::<std::net::Ipv4Addr>()
        .map_err(|_| format!("'{}' is not an IPv4 address", address))?;

    match prefix.parse::<u8>() {
        Ok(len) if len <= 32 => Ok(()),
        _ => Err(format!("'{}' is not a prefix length (0-32)", prefix)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::reference("vpc", "vpc_id")).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["HTTP".to_string(), "HTTPS".to_string()]);
        assert!(t.validate(&Value::String("HTTP".to_string())).is_ok());
        assert!(t.validate(&Value::String("TCP".to_string())).is_err());
    }

    #[test]
    fn validate_port_number() {
        let t = types::port_number();
        assert!(t.validate(&Value::Int(80)).is_ok());
        assert!(t.validate(&Value::Int(8501)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(65536)).is_err());
    }

    #[test]
    fn custom_type_defers_references() {
        let t = types::cidr();
        assert!(t.validate(&Value::reference("vpc", "cidr_block")).is_ok());
        assert!(t.validate(&Value::string("10.0.0.0/33")).is_err());
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("ecs.service")
            .attribute(AttributeSchema::new("cluster", AttributeType::String).required())
            .attribute(AttributeSchema::new("desired_count", types::non_negative_int()))
            .attribute(AttributeSchema::new("arn", AttributeType::String).read_only());

        let mut attrs = HashMap::new();
        attrs.insert("cluster".to_string(), Value::reference("cluster", "arn"));
        attrs.insert("desired_count".to_string(), Value::Int(0));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("desired_count".to_string(), Value::Int(-1));
        attrs.insert("arn".to_string(), Value::string("arn:aws:ecs:..."));
        attrs.insert("desierd_count".to_string(), Value::Int(1));
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&TypeError::UnknownAttribute {
            name: "desierd_count".to_string()
        }));
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("ecr.repository")
            .attribute(AttributeSchema::new("repository_name", AttributeType::String).required());

        let result = schema.validate(&HashMap::new());
        assert_eq!(
            result.unwrap_err(),
            vec![TypeError::MissingRequired {
                name: "repository_name".to_string()
            }]
        );
    }

    #[test]
    fn validate_cidr_type() {
        let t = types::cidr();

        assert!(t.validate(&Value::String("10.0.0.0/16".to_string())).is_ok());
        assert!(t.validate(&Value::String("0.0.0.0/0".to_string())).is_ok());
        assert!(t.validate(&Value::String("10.0.0.0".to_string())).is_err());
        assert!(t.validate(&Value::String("10.0.0.256/16".to_string())).is_err());
        assert!(t.validate(&Value::String("10.0.0/16".to_string())).is_err());
        assert!(t.validate(&Value::Int(42)).is_err());
    }
}
