//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the declared "desired state" with the recorded "current state",
//! and generates the list of Effects (Plan) needed to converge.

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resolver::{self, BindingMap};
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A create-only attribute changed -> needs replacement
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }

    fn into_effect(self) -> Option<Effect> {
        match self {
            Diff::Create(r) => Some(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => Some(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => Some(Effect::Replace {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::NoChange(_) => None,
        }
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let requires_replacement = schema.is_some_and(|s| {
        s.create_only_attributes()
            .any(|name| changed.iter().any(|c| c == name))
    });

    if requires_replacement {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed: Vec<String> = desired
        .iter()
        .filter(|(key, desired_value)| current.get(*key) != Some(*desired_value))
        .map(|(key, _)| key.clone())
        .collect();
    changed.sort();
    changed
}

/// Compute Diffs for a whole declaration and generate a Plan
///
/// `desired` must already be in apply order and `current` in the order the
/// resources were recorded. The plan runs in three phases:
///
/// 1. recorded resources that are no longer declared, newest first
/// 2. the old side of replacements, in reverse apply order
/// 3. creates, updates and the new side of each replacement, in apply order
///
/// Replacing a resource also replaces every recorded resource that depends
/// on it, so nothing recorded still points at it when it is deleted. Types
/// marked `deletable_while_referenced` are the exception: they are replaced
/// in place during phase 3 and their dependents are left alone.
pub fn create_plan(
    desired: &[Resource],
    current: &[State],
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();
    let current_states: HashMap<&ResourceId, &State> = current
        .iter()
        .filter(|s| s.exists)
        .map(|s| (&s.id, s))
        .collect();
    let desired_ids: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();

    for state in current.iter().rev() {
        if state.exists && !desired_ids.contains(&state.id) {
            plan.add(Effect::Delete {
                id: state.id.clone(),
                from: state.clone(),
            });
        }
    }

    let mut bindings = BindingMap::new();
    // Replaced resources whose recorded dependents must go before them
    let mut cascading: HashSet<&str> = HashSet::new();
    // Replaced resources deleted in phase 2
    let mut torn_down: HashSet<&str> = HashSet::new();
    let mut forward = Vec::new();

    for resource in desired {
        let current = current_states
            .get(&resource.id)
            .map(|s| (*s).clone())
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let schema = schemas.get(&resource.id.resource_type);
        let resolved = resolver::resolve_resource(resource, &bindings);
        let mut d = diff(&resolved, &current, schema);

        let follows_replacement = current.exists
            && resource
                .dependencies()
                .iter()
                .any(|dep| cascading.contains(dep.as_str()));
        if follows_replacement {
            d = cascade_replacement(d, &resolved, &current);
        }
        if matches!(d, Diff::Replace { .. }) {
            let in_place = schema.is_some_and(|s| s.deletable_while_referenced);
            if !in_place {
                cascading.insert(resource.binding());
            }
            if follows_replacement || !in_place {
                torn_down.insert(resource.binding());
            }
        }
        log::debug!("diff {}: {:?}", resource.id, d.is_change());

        match d.into_effect() {
            // Computed attributes of new resources are known only after apply
            Some(effect) if effect.produces_new_identity() => {
                resolver::bind(&mut bindings, &resolved, None);
                forward.push(effect);
            }
            Some(effect) => {
                resolver::bind(&mut bindings, &resolved, Some(&current));
                forward.push(effect);
            }
            None => resolver::bind(&mut bindings, &resolved, Some(&current)),
        }
    }

    for effect in forward.iter().rev() {
        if let Effect::Replace { id, from, .. } = effect
            && torn_down.contains(id.name.as_str())
        {
            plan.add(Effect::Delete {
                id: id.clone(),
                from: from.clone(),
            });
        }
    }
    for effect in forward {
        plan.add(effect);
    }

    plan
}

/// Turn the diff of a resource whose dependency is being replaced into a
/// replacement of its own
fn cascade_replacement(d: Diff, desired: &Resource, current: &State) -> Diff {
    let changed_attributes = match d {
        Diff::Replace { .. } | Diff::Create(_) => return d,
        Diff::Update {
            changed_attributes, ..
        } => changed_attributes,
        Diff::NoChange(_) => Vec::new(),
    };
    Diff::Replace {
        id: desired.id.clone(),
        from: current.clone(),
        to: desired.clone(),
        changed_attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeSchema, AttributeType};

    fn schemas() -> HashMap<String, ResourceSchema> {
        let mut map = HashMap::new();
        map.insert(
            "ec2.vpc".to_string(),
            ResourceSchema::new("ec2.vpc")
                .attribute(AttributeSchema::new("cidr_block", AttributeType::String).create_only())
                .attribute(AttributeSchema::new("tags", AttributeType::Map(Box::new(AttributeType::String)))),
        );
        map
    }

    fn attrs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("ec2.vpc", "vpc");
        let current = State::not_found(ResourceId::new("ec2.vpc", "vpc"));

        let result = diff(&desired, &current, None);
        assert!(matches!(result, Diff::Create(_)));
    }

    #[test]
    fn diff_no_change_when_same() {
        let desired = Resource::new("ec2.vpc", "vpc")
            .with_attribute("cidr_block", Value::string("10.0.0.0/16"));
        let current = State::existing(
            ResourceId::new("ec2.vpc", "vpc"),
            attrs(&[
                ("cidr_block", Value::string("10.0.0.0/16")),
                ("vpc_id", Value::string("vpc-123")),
            ]),
        );

        assert!(matches!(
            diff(&desired, &current, None),
            Diff::NoChange(_)
        ));
    }

    #[test]
    fn diff_replace_when_create_only_attribute_changes() {
        let schemas = schemas();
        let desired = Resource::new("ec2.vpc", "vpc")
            .with_attribute("cidr_block", Value::string("10.1.0.0/16"));
        let current = State::existing(
            ResourceId::new("ec2.vpc", "vpc"),
            attrs(&[("cidr_block", Value::string("10.0.0.0/16"))]),
        );

        match diff(&desired, &current, schemas.get("ec2.vpc")) {
            Diff::Replace {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["cidr_block"]),
            other => panic!("Expected Replace, got {:?}", other),
        }
    }

    #[test]
    fn diff_update_when_mutable_attribute_changes() {
        let schemas = schemas();
        let desired = Resource::new("ec2.vpc", "vpc")
            .with_attribute("tags", Value::map([("Name", Value::string("new"))]));
        let current = State::existing(
            ResourceId::new("ec2.vpc", "vpc"),
            attrs(&[("tags", Value::map([("Name", Value::string("old"))]))]),
        );

        assert!(matches!(
            diff(&desired, &current, schemas.get("ec2.vpc")),
            Diff::Update { .. }
        ));
    }

    #[test]
    fn references_into_created_resources_stay_unknown() {
        let desired = vec![
            Resource::new("ec2.vpc", "vpc").with_attribute("cidr_block", Value::string("10.0.0.0/16")),
            Resource::new("ec2.subnet", "subnet")
                .with_attribute("vpc_id", Value::reference("vpc", "vpc_id")),
        ];

        let plan = create_plan(&desired, &[], &schemas());
        assert_eq!(plan.effects().len(), 2);
        match &plan.effects()[1] {
            Effect::Create(r) => {
                assert_eq!(r.attributes["vpc_id"], Value::reference("vpc", "vpc_id"))
            }
            other => panic!("Expected Create, got {:?}", other),
        }
    }

    #[test]
    fn replacement_cascades_to_dependents() {
        let desired = vec![
            Resource::new("ec2.vpc", "vpc").with_attribute("cidr_block", Value::string("10.1.0.0/16")),
            Resource::new("ec2.subnet", "subnet")
                .with_attribute("vpc_id", Value::reference("vpc", "vpc_id")),
        ];
        let current = vec![
            State::existing(
                ResourceId::new("ec2.vpc", "vpc"),
                attrs(&[
                    ("cidr_block", Value::string("10.0.0.0/16")),
                    ("vpc_id", Value::string("vpc-123")),
                ]),
            ),
            State::existing(
                ResourceId::new("ec2.subnet", "subnet"),
                attrs(&[("vpc_id", Value::string("vpc-123"))]),
            ),
        ];

        let plan = create_plan(&desired, &current, &schemas());
        let steps: Vec<String> = plan.effects().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            steps,
            vec![
                "Delete ec2.subnet.subnet",
                "Delete ec2.vpc.vpc",
                "Replace ec2.vpc.vpc",
                "Replace ec2.subnet.subnet",
            ]
        );
        match &plan.effects()[3] {
            Effect::Replace {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, &vec!["vpc_id".to_string()]),
            other => panic!("Expected Replace, got {:?}", other),
        }
    }

    #[test]
    fn unchanged_dependents_of_a_replacement_are_replaced_too() {
        let desired = vec![
            Resource::new("ec2.vpc", "vpc").with_attribute("cidr_block", Value::string("10.1.0.0/16")),
            Resource::new("ecs.cluster", "cluster").with_dependency("vpc"),
            Resource::new("ec2.eip", "eip"),
        ];
        let current = vec![
            State::existing(
                ResourceId::new("ec2.vpc", "vpc"),
                attrs(&[("cidr_block", Value::string("10.0.0.0/16"))]),
            )
            .with_identifier("vpc-123"),
            State::existing(ResourceId::new("ecs.cluster", "cluster"), HashMap::new())
                .with_identifier("web"),
            State::existing(ResourceId::new("ec2.eip", "eip"), HashMap::new())
                .with_identifier("eipalloc-1"),
        ];

        let plan = create_plan(&desired, &current, &schemas());
        let steps: Vec<String> = plan.effects().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            steps,
            vec![
                "Delete ecs.cluster.cluster",
                "Delete ec2.vpc.vpc",
                "Replace ec2.vpc.vpc",
                "Replace ecs.cluster.cluster",
            ]
        );
        assert_eq!(plan.summary().delete, 0);
        assert_eq!(plan.summary().replace, 2);
    }

    #[test]
    fn revisions_are_replaced_in_place_and_dependents_updated() {
        let mut schemas = schemas();
        schemas.insert(
            "ecs.task_definition".to_string(),
            ResourceSchema::new("ecs.task_definition")
                .deletable_while_referenced()
                .attribute(AttributeSchema::new("image", AttributeType::String).create_only()),
        );
        let desired = vec![
            Resource::new("ecs.task_definition", "task_definition")
                .with_attribute("image", Value::string("web@sha256:new")),
            Resource::new("ecs.service", "service").with_attribute(
                "task_definition",
                Value::reference("task_definition", "task_definition_arn"),
            ),
        ];
        let current = vec![
            State::existing(
                ResourceId::new("ecs.task_definition", "task_definition"),
                attrs(&[
                    ("image", Value::string("web@sha256:old")),
                    ("task_definition_arn", Value::string("arn:task/web:1")),
                ]),
            )
            .with_identifier("arn:task/web:1"),
            State::existing(
                ResourceId::new("ecs.service", "service"),
                attrs(&[("task_definition", Value::string("arn:task/web:1"))]),
            )
            .with_identifier("arn:service/web"),
        ];

        let plan = create_plan(&desired, &current, &schemas);
        let steps: Vec<String> = plan.effects().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            steps,
            vec![
                "Replace ecs.task_definition.task_definition",
                "Update ecs.service.service",
            ]
        );
    }

    #[test]
    fn unchanged_applied_declaration_yields_empty_plan() {
        let desired = vec![
            Resource::new("ec2.vpc", "vpc").with_attribute("cidr_block", Value::string("10.0.0.0/16")),
            Resource::new("ec2.subnet", "subnet")
                .with_attribute("vpc_id", Value::reference("vpc", "vpc_id")),
        ];
        let current = vec![
            State::existing(
                ResourceId::new("ec2.vpc", "vpc"),
                attrs(&[
                    ("cidr_block", Value::string("10.0.0.0/16")),
                    ("vpc_id", Value::string("vpc-123")),
                ]),
            ),
            State::existing(
                ResourceId::new("ec2.subnet", "subnet"),
                attrs(&[("vpc_id", Value::string("vpc-123"))]),
            ),
        ];

        assert!(create_plan(&desired, &current, &schemas()).is_empty());
    }

    #[test]
    fn orphans_are_deleted_newest_first() {
        let current = vec![
            State::existing(ResourceId::new("ec2.vpc", "old_vpc"), HashMap::new()),
            State::existing(ResourceId::new("ec2.subnet", "old_subnet"), HashMap::new()),
        ];

        let plan = create_plan(&[], &current, &schemas());
        let names: Vec<_> = plan
            .effects()
            .iter()
            .map(|e| e.resource_id().name.clone())
            .collect();
        assert_eq!(names, vec!["old_subnet", "old_vpc"]);
    }
}
