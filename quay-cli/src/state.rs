//! Recorded state around an apply: refresh, checkpoints and outputs

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use tokio::sync::Mutex;

use quay_core::declaration::Declaration;
use quay_core::interpreter::Checkpoint;
use quay_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult};
use quay_core::resolver::{self, BindingMap};
use quay_core::resource::State;
use quay_state::state::value_to_json;
use quay_state::{ResourceState, StateBackend, StateFile};

/// Read the recorded state, or an empty one before the first apply
pub async fn read_recorded(backend: &dyn StateBackend) -> Result<StateFile> {
    Ok(backend.read_state().await?.unwrap_or_default())
}

/// Drop recorded resources that no longer exist and pick up attributes the
/// provider computed; recorded values win over what the provider reports
pub async fn refresh(provider: &dyn Provider, recorded: Vec<State>) -> ProviderResult<Vec<State>> {
    let mut refreshed = Vec::with_capacity(recorded.len());
    for state in recorded {
        let Some(identifier) = state.identifier.clone() else {
            refreshed.push(state);
            continue;
        };

        let live = provider.read(&state.id, &identifier).await?;
        if !live.exists {
            log::info!("{} ({}) no longer exists", state.id, identifier);
            continue;
        }

        let mut attributes = live.attributes;
        attributes.extend(state.attributes);
        refreshed.push(State {
            id: state.id,
            identifier: Some(identifier),
            attributes,
            exists: true,
        });
    }
    Ok(refreshed)
}

/// What to record next to each state
#[derive(Debug, Clone, Default)]
pub struct RecordContext {
    /// Resource type -> provider name
    pub providers: HashMap<String, &'static str>,
    /// Binding -> bindings it depends on
    pub dependencies: HashMap<String, Vec<String>>,
}

impl RecordContext {
    pub fn new(declaration: &Declaration, provider_name: impl Fn(&str) -> Option<&'static str>) -> Self {
        let mut context = Self::default();
        for resource in &declaration.resources {
            let resource_type = &resource.id.resource_type;
            if let Some(name) = provider_name(resource_type) {
                context.providers.insert(resource_type.clone(), name);
            }
            context
                .dependencies
                .insert(resource.binding().to_string(), resource.dependencies());
        }
        context
    }
}

/// State file holding `states`, keeping what `previous` knew about resources
/// the context does not cover
pub fn record(previous: &StateFile, states: &[State], context: &RecordContext) -> StateFile {
    let mut file = previous.clone();
    file.resources = states
        .iter()
        .filter(|s| s.exists)
        .map(|state| {
            let before = previous.find_resource(&state.id.resource_type, &state.id.name);
            let provider = context
                .providers
                .get(&state.id.resource_type)
                .copied()
                .map(str::to_string)
                .or_else(|| before.map(|r| r.provider.clone()))
                .unwrap_or_else(|| "unknown".to_string());
            let dependencies = context
                .dependencies
                .get(&state.id.name)
                .cloned()
                .or_else(|| before.map(|r| r.dependencies.clone()))
                .unwrap_or_default();
            ResourceState::from_state(state, provider, dependencies)
        })
        .collect();
    file.increment_serial();
    file
}

/// Output values that resolve against `states`
pub fn resolve_outputs(
    declaration: &Declaration,
    states: &[State],
) -> BTreeMap<String, serde_json::Value> {
    let bindings: BindingMap = states
        .iter()
        .map(|s| (s.id.name.clone(), s.attributes.clone()))
        .collect();

    let mut outputs = BTreeMap::new();
    for output in &declaration.outputs {
        let value = resolver::resolve_value(&output.value, &bindings);
        if value.is_resolved() {
            outputs.insert(output.name.clone(), value_to_json(&value));
        } else {
            log::warn!("Output '{}' is not known yet", output.name);
        }
    }
    outputs
}

/// Writes the state file after every successful effect
pub struct StateCheckpoint<'a> {
    backend: &'a dyn StateBackend,
    file: Mutex<StateFile>,
    context: RecordContext,
}

impl<'a> StateCheckpoint<'a> {
    pub fn new(backend: &'a dyn StateBackend, file: StateFile, context: RecordContext) -> Self {
        Self {
            backend,
            file: Mutex::new(file),
            context,
        }
    }

    async fn write(
        &self,
        states: &[State],
        outputs: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Result<StateFile> {
        let mut file = self.file.lock().await;
        let mut next = record(&file, states, &self.context);
        if let Some(outputs) = outputs {
            next.outputs = outputs;
        }
        self.backend.write_state(&next).await?;
        *file = next.clone();
        Ok(next)
    }

    /// Final write, replacing the recorded outputs
    pub async fn finish(
        &self,
        states: &[State],
        outputs: BTreeMap<String, serde_json::Value>,
    ) -> Result<StateFile> {
        self.write(states, Some(outputs)).await
    }
}

impl Checkpoint for StateCheckpoint<'_> {
    fn save<'a>(&'a self, states: &'a [State]) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.write(states, None)
                .await
                .map(|_| ())
                .map_err(|e| ProviderError::new(format!("Failed to save state: {:#}", e)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_core::declaration::Output;
    use quay_core::resource::{Resource, ResourceId, Value};
    use quay_state::backends::LocalBackend;

    fn vpc() -> State {
        State::existing(
            ResourceId::new("ec2.vpc", "vpc"),
            HashMap::from([("cidr_block".to_string(), Value::string("10.0.0.0/16"))]),
        )
        .with_identifier("vpc-1")
    }

    fn load_balancer() -> State {
        State::existing(
            ResourceId::new("elbv2.load_balancer", "load_balancer"),
            HashMap::from([(
                "dns_name".to_string(),
                Value::string("web-123.us-east-2.elb.amazonaws.com"),
            )]),
        )
        .with_identifier("arn:aws:elasticloadbalancing:lb/web")
    }

    fn declaration() -> Declaration {
        let mut decl = Declaration::new("web");
        decl.add(Resource::new("ec2.vpc", "vpc"));
        decl.add(
            Resource::new("elbv2.load_balancer", "load_balancer")
                .with_attribute("vpc", Value::reference("vpc", "vpc_id")),
        );
        decl.output(Output::new(
            "url",
            Value::Concat(vec![
                Value::string("http://"),
                Value::reference("load_balancer", "dns_name"),
            ]),
        ));
        decl
    }

    /// Knows only the VPC, which reports one extra attribute
    struct OnlyVpc;

    impl Provider for OnlyVpc {
        fn name(&self) -> &'static str {
            "awscc"
        }

        fn handles(&self, _resource_type: &str) -> bool {
            true
        }

        fn read(&self, id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move {
                if id.name == "vpc" {
                    Ok(State::existing(
                        id,
                        HashMap::from([
                            ("cidr_block".to_string(), Value::string("10.9.0.0/16")),
                            ("vpc_id".to_string(), Value::string("vpc-1")),
                        ]),
                    ))
                } else {
                    Ok(State::not_found(id))
                }
            })
        }

        fn create(&self, _resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            Box::pin(async { Err(ProviderError::new("unexpected create")) })
        }

        fn update(
            &self,
            _id: &ResourceId,
            _identifier: &str,
            _from: &State,
            _to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            Box::pin(async { Err(ProviderError::new("unexpected update")) })
        }

        fn delete(&self, _id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Err(ProviderError::new("unexpected delete")) })
        }
    }

    #[tokio::test]
    async fn refresh_drops_vanished_and_keeps_recorded_values() {
        let refreshed = refresh(&OnlyVpc, vec![vpc(), load_balancer()]).await.unwrap();

        assert_eq!(refreshed.len(), 1);
        let vpc = &refreshed[0];
        assert_eq!(vpc.attributes["cidr_block"], Value::string("10.0.0.0/16"));
        assert_eq!(vpc.attributes["vpc_id"], Value::string("vpc-1"));
        assert_eq!(vpc.identifier.as_deref(), Some("vpc-1"));
    }

    #[test]
    fn record_uses_declared_providers_and_dependencies() {
        let context = RecordContext::new(&declaration(), |t| {
            (t != "elbv2.load_balancer").then_some("awscc")
        });

        let mut previous = StateFile::with_lineage("lineage-1".to_string());
        previous.upsert_resource(ResourceState::new("elbv2.load_balancer", "load_balancer", "legacy"));

        let file = record(&previous, &[vpc(), load_balancer()], &context);
        assert_eq!(file.serial, 1);
        assert_eq!(file.lineage, "lineage-1");

        let vpc = file.find_resource("ec2.vpc", "vpc").unwrap();
        assert_eq!(vpc.provider, "awscc");
        assert!(vpc.dependencies.is_empty());

        let lb = file
            .find_resource("elbv2.load_balancer", "load_balancer")
            .unwrap();
        assert_eq!(lb.provider, "legacy");
        assert_eq!(lb.dependencies, vec!["vpc"]);
    }

    #[test]
    fn outputs_resolve_once_known() {
        let decl = declaration();
        assert!(resolve_outputs(&decl, &[vpc()]).is_empty());

        let outputs = resolve_outputs(&decl, &[vpc(), load_balancer()]);
        assert_eq!(
            outputs["url"],
            serde_json::json!("http://web-123.us-east-2.elb.amazonaws.com")
        );
    }

    #[tokio::test]
    async fn checkpoint_writes_every_save() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::with_path(dir.path().join("web.state.json"));
        let checkpoint = StateCheckpoint::new(
            &backend,
            StateFile::new(),
            RecordContext::new(&declaration(), |_| Some("awscc")),
        );

        checkpoint.save(&[vpc()]).await.unwrap();
        let saved = backend.read_state().await.unwrap().unwrap();
        assert_eq!(saved.serial, 1);
        assert_eq!(saved.resources.len(), 1);

        let states = [vpc(), load_balancer()];
        let outputs = resolve_outputs(&declaration(), &states);
        let finished = checkpoint.finish(&states, outputs).await.unwrap();
        assert_eq!(finished.serial, 2);

        let saved = backend.read_state().await.unwrap().unwrap();
        assert_eq!(saved, finished);
        assert!(saved.outputs.contains_key("url"));
    }
}
