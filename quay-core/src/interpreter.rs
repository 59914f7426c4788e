//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.
//! References left unresolved by the differ are resolved here against the
//! states produced earlier in the same run.

use std::collections::HashMap;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{BoxFuture, Provider, ProviderError, ProviderResult};
use crate::resolver::{self, BindingMap};
use crate::resource::{Resource, ResourceId, State};

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Delete and re-create succeeded
    Replaced { state: State },
    /// Delete succeeded
    Deleted { id: ResourceId },
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

impl EffectOutcome {
    /// New state produced by this outcome, if any
    pub fn state(&self) -> Option<&State> {
        match self {
            EffectOutcome::Created { state }
            | EffectOutcome::Updated { state }
            | EffectOutcome::Replaced { state } => Some(state),
            EffectOutcome::Deleted { .. } | EffectOutcome::Skipped { .. } => None,
        }
    }
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    pub outcomes: Vec<Result<EffectOutcome, ProviderError>>,
    pub success_count: usize,
    pub failure_count: usize,
    /// Recorded states after the run, oldest first
    pub states: Vec<State>,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
}

/// Persists intermediate states after every successful effect
pub trait Checkpoint: Send + Sync {
    fn save<'a>(&'a self, states: &'a [State]) -> BoxFuture<'a, ProviderResult<()>>;
}

/// No-op checkpoint
impl Checkpoint for () {
    fn save<'a>(&'a self, _states: &'a [State]) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan, recorded: &[State]) -> ApplyResult {
        self.apply_with_checkpoint(plan, recorded, &()).await
    }

    /// Execute a Plan, saving the states through `checkpoint` after each success
    pub async fn apply_with_checkpoint(
        &self,
        plan: &Plan,
        recorded: &[State],
        checkpoint: &dyn Checkpoint,
    ) -> ApplyResult {
        let mut states: Vec<State> = recorded.iter().filter(|s| s.exists).cloned().collect();
        let mut bindings = BindingMap::new();
        for state in &states {
            bindings.insert(state.id.name.clone(), state.attributes.clone());
        }

        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;

        for effect in plan.effects() {
            log::info!("{}", effect);
            let still_recorded = states.iter().any(|s| &s.id == effect.resource_id());
            let mut result = self.execute_effect(effect, &bindings, still_recorded).await;

            if let Ok(outcome) = &result {
                let changed = record_outcome(&mut states, &mut bindings, outcome);
                if changed && let Err(e) = checkpoint.save(&states).await {
                    result = Err(e);
                }
            }

            match &result {
                Ok(_) => {
                    success_count += 1;
                    outcomes.push(result);
                }
                Err(e) => {
                    log::debug!("{} failed: {}", effect, e);
                    failure_count += 1;
                    outcomes.push(result);
                    break;
                }
            }
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
            states,
        }
    }

    /// Execute a single Effect
    ///
    /// `recorded` tells whether the resource is still in the run's states; a
    /// replacement whose old resource was already deleted earlier in the plan
    /// only creates.
    async fn execute_effect(
        &self,
        effect: &Effect,
        bindings: &BindingMap,
        recorded: bool,
    ) -> ProviderResult<EffectOutcome> {
        if self.config.dry_run {
            return Ok(EffectOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        let id = effect.resource_id();
        let attach = |e: ProviderError| {
            if e.resource_id.is_none() {
                e.for_resource(id.clone())
            } else {
                e
            }
        };

        match effect {
            Effect::Create(resource) => {
                let resolved = resolve_fully(resource, bindings)?;
                let state = self.provider.create(&resolved).await.map_err(attach)?;
                Ok(EffectOutcome::Created {
                    state: merge_state(&resolved, state),
                })
            }
            Effect::Update { id, from, to, .. } => {
                let resolved = resolve_fully(to, bindings)?;
                let identifier = recorded_identifier(from)?;
                let state = self
                    .provider
                    .update(id, identifier, from, &resolved)
                    .await
                    .map_err(attach)?;
                Ok(EffectOutcome::Updated {
                    state: merge_state(&resolved, state.with_identifier(identifier)),
                })
            }
            Effect::Replace { id, from, to, .. } => {
                let resolved = resolve_fully(to, bindings)?;
                if recorded {
                    let identifier = recorded_identifier(from)?;
                    self.provider.delete(id, identifier).await.map_err(attach)?;
                }
                let state = self.provider.create(&resolved).await.map_err(attach)?;
                Ok(EffectOutcome::Replaced {
                    state: merge_state(&resolved, state),
                })
            }
            Effect::Delete { id, from } => {
                let identifier = recorded_identifier(from)?;
                self.provider.delete(id, identifier).await.map_err(attach)?;
                Ok(EffectOutcome::Deleted { id: id.clone() })
            }
        }
    }
}

fn resolve_fully(resource: &Resource, bindings: &BindingMap) -> ProviderResult<Resource> {
    let resolved = resolver::resolve_resource(resource, bindings);
    let mut unresolved: Vec<&String> = resolved
        .attributes
        .iter()
        .filter(|(_, v)| !v.is_resolved())
        .map(|(k, _)| k)
        .collect();
    unresolved.sort();
    match unresolved.first() {
        Some(attr) => Err(ProviderError::new(format!(
            "Attribute '{}' references a value that is not available",
            attr
        ))
        .for_resource(resource.id.clone())),
        None => Ok(resolved),
    }
}

fn recorded_identifier(state: &State) -> ProviderResult<&str> {
    state.identifier.as_deref().ok_or_else(|| {
        ProviderError::new("No provider identifier recorded").for_resource(state.id.clone())
    })
}

/// Declared attributes win over what the provider reports back
fn merge_state(resolved: &Resource, state: State) -> State {
    let mut attributes = resolved.attributes.clone();
    for (k, v) in state.attributes {
        attributes.entry(k).or_insert(v);
    }
    State {
        id: resolved.id.clone(),
        identifier: state.identifier,
        attributes,
        exists: true,
    }
}

fn record_outcome(states: &mut Vec<State>, bindings: &mut BindingMap, outcome: &EffectOutcome) -> bool {
    match outcome {
        EffectOutcome::Deleted { id } => {
            states.retain(|s| &s.id != id);
            bindings.remove(&id.name);
            true
        }
        EffectOutcome::Skipped { .. } => false,
        _ => {
            let Some(state) = outcome.state() else {
                return false;
            };
            bindings.insert(state.id.name.clone(), state.attributes.clone());
            match states.iter_mut().find(|s| s.id == state.id) {
                Some(existing) => *existing = state.clone(),
                None => states.push(state.clone()),
            }
            true
        }
    }
}

/// Arrange states in the given order; states not listed keep their relative
/// order and come first
pub fn order_states(states: Vec<State>, order: &[ResourceId]) -> Vec<State> {
    let position: HashMap<&ResourceId, usize> =
        order.iter().enumerate().map(|(i, id)| (id, i)).collect();
    let (mut listed, unlisted): (Vec<State>, Vec<State>) = states
        .into_iter()
        .partition(|s| position.contains_key(&s.id));
    listed.sort_by_key(|s| position.get(&s.id).copied().unwrap_or(usize::MAX));
    unlisted.into_iter().chain(listed).collect()
}
