//! Plan - Collection of Effects
//!
//! A Plan is an ordered list of Effects to be executed.
//! No side effects occur until the Plan is applied.

use crate::effect::Effect;
use crate::resource::ResourceId;

/// Plan containing Effects to be executed
#[derive(Debug, Clone, Default)]
pub struct Plan {
    effects: Vec<Effect>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Whether a delete of `id` is the first half of a replacement later in the plan
    pub fn is_replaced(&self, id: &ResourceId) -> bool {
        self.effects
            .iter()
            .any(|e| matches!(e, Effect::Replace { id: replaced, .. } if replaced == id))
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for effect in &self.effects {
            match effect {
                Effect::Create(_) => summary.create += 1,
                Effect::Update { .. } => summary.update += 1,
                Effect::Replace { .. } => summary.replace += 1,
                Effect::Delete { id, .. } if self.is_replaced(id) => {}
                Effect::Delete { .. } => summary.delete += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to update, {} to replace, {} to delete",
            self.create, self.update, self.replace, self.delete
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, State};

    #[test]
    fn summary_counts_each_kind() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("ec2.vpc", "vpc")));
        plan.add(Effect::Delete {
            id: ResourceId::new("ec2.subnet", "old"),
            from: State::not_found(ResourceId::new("ec2.subnet", "old")),
        });

        let summary = plan.summary();
        assert_eq!(summary.create, 1);
        assert_eq!(summary.delete, 1);
        assert_eq!(
            summary.to_string(),
            "Plan: 1 to create, 0 to update, 0 to replace, 1 to delete"
        );
    }

    #[test]
    fn teardown_of_a_replacement_is_not_a_delete() {
        let id = ResourceId::new("elbv2.target_group", "target_group");
        let recorded = State::existing(id.clone(), Default::default()).with_identifier("tg-1");
        let mut plan = Plan::new();
        plan.add(Effect::Delete {
            id: id.clone(),
            from: recorded.clone(),
        });
        plan.add(Effect::Replace {
            id: id.clone(),
            from: recorded,
            to: Resource::new("elbv2.target_group", "target_group"),
            changed_attributes: vec!["port".to_string()],
        });

        assert!(plan.is_replaced(&id));
        assert_eq!(
            plan.summary().to_string(),
            "Plan: 0 to create, 0 to update, 1 to replace, 0 to delete"
        );
    }
}
