//! Conversion between resource values and Cloud Control JSON
//!
//! Top-level attributes are renamed through the schema's provider names.
//! Inside nested structures, snake_case keys become UpperCamelCase; any other
//! key (policy grammar, log driver options, condition keys) is sent as is.

use std::collections::HashMap;
use std::sync::LazyLock;

use heck::ToUpperCamelCase;
use quay_core::resource::Value;
use regex::Regex;
use serde_json::json;

static SNAKE_CASE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"));

/// Cloud Control name of a nested structure key
pub fn provider_key(key: &str) -> String {
    if SNAKE_CASE_KEY.is_match(key) {
        key.to_upper_camel_case()
    } else {
        key.to_string()
    }
}

/// Convert a resolved value to Cloud Control JSON
///
/// Returns `None` for values that cannot be sent: unresolved references and
/// concatenations are resolved before a provider sees them.
pub fn to_provider_json(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::String(s) => Some(json!(s)),
        Value::Bool(b) => Some(json!(b)),
        Value::Int(i) => Some(json!(i)),
        Value::List(items) => {
            let arr: Vec<serde_json::Value> = items.iter().filter_map(to_provider_json).collect();
            Some(serde_json::Value::Array(arr))
        }
        Value::Map(map) => {
            let obj: serde_json::Map<String, serde_json::Value> = map
                .iter()
                .filter_map(|(k, v)| to_provider_json(v).map(|v| (provider_key(k), v)))
                .collect();
            Some(serde_json::Value::Object(obj))
        }
        Value::ResourceRef(_, _) | Value::Concat(_) => None,
    }
}

/// Convert Cloud Control JSON back to a value, keeping nested keys as returned
pub fn from_provider_json(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(|f| Value::Int(f as i64))
            }
        }
        serde_json::Value::Array(arr) => Some(Value::List(
            arr.iter().filter_map(from_provider_json).collect(),
        )),
        serde_json::Value::Object(obj) => Some(Value::Map(
            obj.iter()
                .filter_map(|(k, v)| from_provider_json(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        serde_json::Value::Null => None,
    }
}

/// Build the CloudFormation tag list from a tags map, sorted by key
pub fn build_tags(tags: Option<&Value>) -> Vec<serde_json::Value> {
    let Some(Value::Map(tags)) = tags else {
        return Vec::new();
    };
    let mut keys: Vec<&String> = tags.keys().collect();
    keys.sort();
    keys.into_iter()
        .filter_map(|key| match &tags[key] {
            Value::String(v) => Some(json!({"Key": key, "Value": v})),
            _ => None,
        })
        .collect()
}

/// Parse a CloudFormation tag list into a tags map
pub fn parse_tags(tags: &[serde_json::Value]) -> HashMap<String, Value> {
    tags.iter()
        .filter_map(|tag| {
            let key = tag.get("Key")?.as_str()?;
            let value = tag.get("Value")?.as_str()?;
            Some((key.to_string(), Value::String(value.to_string())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_snake_case_keys_become_camel_case() {
        let value = Value::List(vec![Value::map([
            ("container_port", Value::Int(8501)),
            ("protocol", Value::string("tcp")),
        ])]);
        assert_eq!(
            to_provider_json(&value),
            Some(json!([{"ContainerPort": 8501, "Protocol": "tcp"}]))
        );
    }

    #[test]
    fn other_keys_pass_through() {
        let value = Value::map([
            ("awslogs-group", Value::string("/ecs/web")),
            ("SSEAlgorithm", Value::string("AES256")),
            (
                "Condition",
                Value::map([(
                    "Bool",
                    Value::map([("aws:SecureTransport", Value::string("false"))]),
                )]),
            ),
        ]);
        assert_eq!(
            to_provider_json(&value),
            Some(json!({
                "awslogs-group": "/ecs/web",
                "SSEAlgorithm": "AES256",
                "Condition": {"Bool": {"aws:SecureTransport": "false"}},
            }))
        );
    }

    #[test]
    fn unresolved_values_are_not_sent() {
        let value = Value::map([
            ("vpc_id", Value::reference("vpc", "vpc_id")),
            ("cidr_block", Value::string("10.0.0.0/24")),
        ]);
        assert_eq!(
            to_provider_json(&value),
            Some(json!({"CidrBlock": "10.0.0.0/24"}))
        );
    }

    #[test]
    fn provider_json_keeps_returned_keys() {
        let json = json!({"Rules": [{"ObjectOwnership": "BucketOwnerEnforced"}], "Gone": null});
        assert_eq!(
            from_provider_json(&json),
            Some(Value::map([(
                "Rules",
                Value::List(vec![Value::map([(
                    "ObjectOwnership",
                    Value::string("BucketOwnerEnforced")
                )])])
            )]))
        );
    }

    #[test]
    fn tags_convert_both_ways() {
        let tags = Value::map([
            ("Name", Value::string("web-vpc")),
            ("quay:stack", Value::string("web")),
        ]);
        let list = build_tags(Some(&tags));
        assert_eq!(
            list,
            vec![
                json!({"Key": "Name", "Value": "web-vpc"}),
                json!({"Key": "quay:stack", "Value": "web"}),
            ]
        );
        assert_eq!(Value::Map(parse_tags(&list)), tags);
        assert!(build_tags(None).is_empty());
    }
}
