//! Resolver - Substitute resource references with concrete values
//!
//! References point at `binding.attribute`. A binding's attributes are its
//! declared attributes merged with whatever the provider reported (ids, ARNs,
//! DNS names). References that cannot be satisfied yet are left in place.

use std::collections::HashMap;

use crate::resource::{Resource, State, Value};

/// binding name -> attribute name -> value
pub type BindingMap = HashMap<String, HashMap<String, Value>>;

/// Add or refresh a binding from its declared attributes and known state
pub fn bind(bindings: &mut BindingMap, resource: &Resource, state: Option<&State>) {
    let mut attrs = resource.attributes.clone();
    if let Some(state) = state
        && state.exists
    {
        for (k, v) in &state.attributes {
            if !attrs.contains_key(k) {
                attrs.insert(k.clone(), v.clone());
            }
        }
    }
    bindings.insert(resource.binding().to_string(), attrs);
}

/// Resolve every reference inside a value
pub fn resolve_value(value: &Value, bindings: &BindingMap) -> Value {
    match value {
        Value::ResourceRef(binding_name, attr_name) => {
            if let Some(attrs) = bindings.get(binding_name)
                && let Some(attr_value) = attrs.get(attr_name)
            {
                return resolve_value(attr_value, bindings);
            }
            value.clone()
        }
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|v| resolve_value(v, bindings))
                .collect(),
        ),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, bindings)))
                .collect(),
        ),
        Value::Concat(parts) => {
            let resolved: Vec<Value> = parts.iter().map(|p| resolve_value(p, bindings)).collect();
            join_parts(&resolved).map_or(Value::Concat(resolved), Value::String)
        }
        _ => value.clone(),
    }
}

fn join_parts(parts: &[Value]) -> Option<String> {
    let mut out = String::new();
    for part in parts {
        match part {
            Value::String(s) => out.push_str(s),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Bool(b) => out.push_str(&b.to_string()),
            _ => return None,
        }
    }
    Some(out)
}

/// Resolve every reference in a resource's attributes
pub fn resolve_resource(resource: &Resource, bindings: &BindingMap) -> Resource {
    let attributes = resource
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, bindings)))
        .collect();
    Resource {
        id: resource.id.clone(),
        attributes,
        depends_on: resource.depends_on.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceId;

    fn bindings() -> BindingMap {
        let mut map = BindingMap::new();
        let lb = Resource::new("elbv2.load_balancer", "load_balancer")
            .with_attribute("scheme", Value::string("internet-facing"));
        let mut computed = HashMap::new();
        computed.insert(
            "dns_name".to_string(),
            Value::string("app-123.us-east-2.elb.amazonaws.com"),
        );
        let state = State::existing(ResourceId::new("elbv2.load_balancer", "load_balancer"), computed);
        bind(&mut map, &lb, Some(&state));
        map
    }

    #[test]
    fn resolves_state_attributes() {
        let value = Value::reference("load_balancer", "dns_name");
        assert_eq!(
            resolve_value(&value, &bindings()),
            Value::string("app-123.us-east-2.elb.amazonaws.com")
        );
    }

    #[test]
    fn concat_joins_when_fully_resolved() {
        let value = Value::Concat(vec![
            Value::string("http://"),
            Value::reference("load_balancer", "dns_name"),
        ]);
        assert_eq!(
            resolve_value(&value, &bindings()),
            Value::string("http://app-123.us-east-2.elb.amazonaws.com")
        );
    }

    #[test]
    fn unknown_references_are_kept() {
        let value = Value::Concat(vec![
            Value::reference("repository", "repository_uri"),
            Value::string(":latest"),
        ]);
        let resolved = resolve_value(&value, &bindings());
        assert_eq!(resolved, value);
        assert!(!resolved.is_resolved());
    }

    #[test]
    fn declared_attributes_win_over_state() {
        let map = bindings();
        assert_eq!(
            resolve_value(&Value::reference("load_balancer", "scheme"), &map),
            Value::string("internet-facing")
        );
    }
}
