//! AWS Cloud Control Provider implementation
//!
//! Every AWS resource of the stack is managed through the Cloud Control API:
//! the desired state is sent as CloudFormation properties, updates are JSON
//! patches, and every mutation is followed by a read so computed attributes
//! (ids, ARNs, DNS names) land in the recorded state.

use std::collections::HashMap;
use std::time::Duration;

use aws_config::Region;
use aws_sdk_cloudcontrol::Client as CloudControlClient;
use aws_sdk_cloudcontrol::types::{HandlerErrorCode, OperationStatus};
use quay_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult};
use quay_core::resource::{Resource, ResourceId, State, Value};
use serde_json::json;

use crate::convert::{build_tags, from_provider_json, parse_tags, to_provider_json};
use crate::schemas::{self, AwsccSchemaConfig};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_ATTEMPTS: u32 = 240;

/// CloudFormation properties to send when creating `resource`
pub fn desired_state(
    config: &AwsccSchemaConfig,
    resource: &Resource,
) -> serde_json::Map<String, serde_json::Value> {
    let mut desired = serde_json::Map::new();

    for (name, attr) in &config.schema.attributes {
        if name == "tags" || attr.read_only {
            continue;
        }
        if let Some(aws_name) = &attr.provider_name
            && let Some(value) = resource.attributes.get(name)
            && let Some(v) = to_provider_json(value)
        {
            desired.insert(aws_name.clone(), v);
        }
    }

    if config.has_tags {
        let tags = build_tags(resource.attributes.get("tags"));
        if !tags.is_empty() {
            desired.insert("Tags".to_string(), json!(tags));
        }
    }

    desired
}

/// JSON patch turning `from` into `to`, limited to attributes that can change in place
pub fn patch_operations(
    config: &AwsccSchemaConfig,
    from: &State,
    to: &Resource,
) -> Vec<serde_json::Value> {
    let mut names: Vec<&String> = config.schema.attributes.keys().collect();
    names.sort();

    let mut ops = Vec::new();
    for name in names {
        let attr = &config.schema.attributes[name];
        if attr.read_only || attr.create_only {
            continue;
        }
        let current = from.attributes.get(name);
        let desired = to.attributes.get(name);
        if current == desired {
            continue;
        }

        let (path, value) = if name == "tags" {
            if !config.has_tags {
                continue;
            }
            let tags = build_tags(desired);
            ("/Tags".to_string(), (!tags.is_empty()).then(|| json!(tags)))
        } else {
            let Some(aws_name) = &attr.provider_name else {
                continue;
            };
            (format!("/{}", aws_name), desired.and_then(to_provider_json))
        };

        match (current, value) {
            (_, Some(value)) => {
                let op = if current.is_some() { "replace" } else { "add" };
                ops.push(json!({"op": op, "path": path, "value": value}));
            }
            (Some(_), None) => ops.push(json!({"op": "remove", "path": path})),
            (None, None) => {}
        }
    }
    ops
}

/// State built from the CloudFormation properties Cloud Control returned
pub fn state_from_properties(
    config: &AwsccSchemaConfig,
    id: ResourceId,
    identifier: &str,
    props: &serde_json::Value,
) -> State {
    let mut attributes = HashMap::new();

    for (name, attr) in &config.schema.attributes {
        if name == "tags" {
            continue;
        }
        if let Some(aws_name) = &attr.provider_name
            && let Some(value) = props.get(aws_name.as_str())
            && let Some(v) = from_provider_json(value)
        {
            attributes.insert(name.clone(), v);
        }
    }

    if config.has_tags
        && let Some(tags) = props.get("Tags").and_then(|v| v.as_array())
    {
        let tags = parse_tags(tags);
        if !tags.is_empty() {
            attributes.insert("tags".to_string(), Value::Map(tags));
        }
    }

    State::existing(id, attributes).with_identifier(identifier)
}

/// Record `resource`'s own values wherever the provider read back the same thing
///
/// Cloud Control returns nested keys in CloudFormation case and leaves out
/// write-only properties; keeping the declared form lets the next plan compare
/// like with like.
pub fn reconcile_with_declared(config: &AwsccSchemaConfig, resource: &Resource, mut state: State) -> State {
    if !state.exists {
        return state;
    }
    for (name, declared) in &resource.attributes {
        let managed = name == "tags" || config.schema.attributes.get(name).is_some_and(|a| !a.read_only);
        if !managed {
            continue;
        }
        let same = match state.attributes.get(name) {
            Some(read) => to_provider_json(read) == to_provider_json(declared),
            None => true,
        };
        if same {
            state.attributes.insert(name.clone(), declared.clone());
        }
    }
    state
}

/// AWS Cloud Control Provider
pub struct AwsccProvider {
    cloudcontrol_client: CloudControlClient,
    configs: HashMap<String, AwsccSchemaConfig>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl AwsccProvider {
    /// Create a new AwsccProvider for the specified region
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            cloudcontrol_client: CloudControlClient::new(&config),
            configs: schemas::configs()
                .into_iter()
                .map(|c| (c.schema.resource_type.clone(), c))
                .collect(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    fn config(&self, id: &ResourceId) -> ProviderResult<&AwsccSchemaConfig> {
        self.configs.get(&id.resource_type).ok_or_else(|| {
            ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
                .for_resource(id.clone())
        })
    }

    // =========================================================================
    // Cloud Control API Methods
    // =========================================================================

    /// Get a resource's properties, `None` if it does not exist
    async fn cc_get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> ProviderResult<Option<serde_json::Value>> {
        let result = self
            .cloudcontrol_client
            .get_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await;

        match result {
            Ok(response) => {
                let Some(props) = response.resource_description().and_then(|d| d.properties())
                else {
                    return Ok(None);
                };
                let props = serde_json::from_str(props).map_err(|e| {
                    ProviderError::new("Cloud Control returned invalid properties").with_cause(e)
                })?;
                Ok(Some(props))
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(ProviderError::new(format!(
                "Failed to get resource: {}",
                aws_sdk_cloudcontrol::error::DisplayErrorContext(&e)
            ))),
        }
    }

    /// Create a resource and return its identifier
    async fn cc_create_resource(
        &self,
        type_name: &str,
        desired_state: serde_json::Value,
    ) -> ProviderResult<String> {
        let result = self
            .cloudcontrol_client
            .create_resource()
            .type_name(type_name)
            .desired_state(desired_state.to_string())
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "Failed to create resource: {}",
                    aws_sdk_cloudcontrol::error::DisplayErrorContext(&e)
                ))
            })?;

        let request_token = result
            .progress_event()
            .and_then(|p| p.request_token())
            .ok_or_else(|| ProviderError::new("No request token returned"))?;

        Ok(self.wait_for_operation(request_token).await?)
    }

    async fn cc_update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_ops: Vec<serde_json::Value>,
    ) -> ProviderResult<()> {
        if patch_ops.is_empty() {
            return Ok(());
        }

        let patch_document = serde_json::to_string(&patch_ops)
            .map_err(|e| ProviderError::new("Failed to build patch").with_cause(e))?;

        let result = self
            .cloudcontrol_client
            .update_resource()
            .type_name(type_name)
            .identifier(identifier)
            .patch_document(patch_document)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "Failed to update resource: {}",
                    aws_sdk_cloudcontrol::error::DisplayErrorContext(&e)
                ))
            })?;

        if let Some(request_token) = result.progress_event().and_then(|p| p.request_token()) {
            self.wait_for_operation(request_token).await?;
        }

        Ok(())
    }

    async fn cc_delete_resource(&self, type_name: &str, identifier: &str) -> ProviderResult<()> {
        let result = self
            .cloudcontrol_client
            .delete_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                log::warn!("{} {} was already gone", type_name, identifier);
                return Ok(());
            }
            Err(e) => {
                return Err(ProviderError::new(format!(
                    "Failed to delete resource: {}",
                    aws_sdk_cloudcontrol::error::DisplayErrorContext(&e)
                )));
            }
        };

        if let Some(request_token) = response.progress_event().and_then(|p| p.request_token()) {
            match self.wait_for_operation(request_token).await {
                Ok(_) => {}
                Err(OperationError::NotFound) => {
                    log::warn!("{} {} was already gone", type_name, identifier);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Poll an operation until it settles, returning the resource identifier
    async fn wait_for_operation(&self, request_token: &str) -> Result<String, OperationError> {
        for _ in 0..self.max_attempts {
            let status = self
                .cloudcontrol_client
                .get_resource_request_status()
                .request_token(request_token)
                .send()
                .await
                .map_err(|e| {
                    OperationError::Failed(format!(
                        "Failed to get operation status: {}",
                        aws_sdk_cloudcontrol::error::DisplayErrorContext(&e)
                    ))
                })?;

            if let Some(progress) = status.progress_event() {
                match progress.operation_status() {
                    Some(OperationStatus::Success) => {
                        return Ok(progress.identifier().unwrap_or_default().to_string());
                    }
                    Some(OperationStatus::Failed) => {
                        if progress.error_code() == Some(&HandlerErrorCode::NotFound) {
                            return Err(OperationError::NotFound);
                        }
                        let msg = progress.status_message().unwrap_or("Unknown error");
                        return Err(OperationError::Failed(format!("Operation failed: {}", msg)));
                    }
                    Some(OperationStatus::CancelComplete) => {
                        return Err(OperationError::Failed(
                            "Operation was cancelled".to_string(),
                        ));
                    }
                    _ => {
                        log::debug!("waiting for Cloud Control request {}", request_token);
                    }
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        Err(OperationError::Failed("Operation timed out".to_string()))
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    pub async fn read_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let config = self.config(id)?;
        match self.cc_get_resource(config.aws_type_name, identifier).await {
            Ok(Some(props)) => Ok(state_from_properties(config, id.clone(), identifier, &props)),
            Ok(None) => Ok(State::not_found(id.clone())),
            Err(e) => Err(e.for_resource(id.clone())),
        }
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let config = self.config(&resource.id)?;
        let desired = desired_state(config, resource);

        let identifier = self
            .cc_create_resource(config.aws_type_name, serde_json::Value::Object(desired))
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))?;
        log::debug!("created {} as {}", resource.id, identifier);

        let state = self.read_resource(&resource.id, &identifier).await?;
        Ok(reconcile_with_declared(config, resource, state))
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let config = self.config(id)?;
        let patch_ops = patch_operations(config, from, to);
        log::debug!("updating {} with {} patch operations", id, patch_ops.len());

        self.cc_update_resource(config.aws_type_name, identifier, patch_ops)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        let state = self.read_resource(id, identifier).await?;
        Ok(reconcile_with_declared(config, to, state))
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let config = self.config(id)?;
        self.cc_delete_resource(config.aws_type_name, identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))
    }
}

/// Terminal failure of a Cloud Control operation
#[derive(Debug)]
enum OperationError {
    NotFound,
    Failed(String),
}

impl From<OperationError> for ProviderError {
    fn from(e: OperationError) -> Self {
        match e {
            OperationError::NotFound => ProviderError::new("Resource not found"),
            OperationError::Failed(message) => ProviderError::new(message),
        }
    }
}

impl Provider for AwsccProvider {
    fn name(&self) -> &'static str {
        "awscc"
    }

    fn handles(&self, resource_type: &str) -> bool {
        self.configs.contains_key(resource_type)
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.read_resource(&id, &identifier).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::{ecs, elbv2};

    fn service() -> Resource {
        Resource::new("ecs.service", "service")
            .with_attribute("service_name", Value::string("web"))
            .with_attribute("cluster", Value::string("arn:aws:ecs:us-east-2:123456789012:cluster/web"))
            .with_attribute("task_definition", Value::string("arn:aws:ecs:us-east-2:123456789012:task-definition/web:1"))
            .with_attribute("desired_count", Value::Int(1))
            .with_attribute(
                "tags",
                Value::map([("Name", Value::string("web-service"))]),
            )
    }

    #[test]
    fn desired_state_uses_cloudformation_names() {
        let desired = desired_state(&ecs::service_config(), &service());

        assert_eq!(desired["ServiceName"], json!("web"));
        assert_eq!(desired["DesiredCount"], json!(1));
        assert_eq!(desired["Tags"], json!([{"Key": "Name", "Value": "web-service"}]));
        assert!(!desired.contains_key("service_name"));
    }

    #[test]
    fn desired_state_skips_read_only_attributes() {
        let resource = service().with_attribute("service_arn", Value::string("arn:aws:ecs:x"));
        let desired = desired_state(&ecs::service_config(), &resource);
        assert!(!desired.contains_key("ServiceArn"));
    }

    #[test]
    fn patch_only_touches_changed_mutable_attributes() {
        let from = State::existing(ResourceId::new("ecs.service", "service"), service().attributes)
            .with_identifier("arn:aws:ecs:us-east-2:123456789012:service/web/web");
        let to = service()
            .with_attribute("desired_count", Value::Int(3))
            .with_attribute("service_name", Value::string("renamed"));

        let ops = patch_operations(&ecs::service_config(), &from, &to);
        assert_eq!(
            ops,
            vec![json!({"op": "replace", "path": "/DesiredCount", "value": 3})]
        );
    }

    #[test]
    fn patch_adds_and_removes_attributes() {
        let mut attrs = service().attributes;
        attrs.remove("desired_count");
        attrs.insert(
            "health_check_grace_period_seconds".to_string(),
            Value::Int(60),
        );
        let from = State::existing(ResourceId::new("ecs.service", "service"), attrs);

        let ops = patch_operations(&ecs::service_config(), &from, &service());
        assert_eq!(
            ops,
            vec![
                json!({"op": "add", "path": "/DesiredCount", "value": 1}),
                json!({"op": "remove", "path": "/HealthCheckGracePeriodSeconds"}),
            ]
        );
    }

    #[test]
    fn changed_tags_replace_the_tag_list() {
        let from = State::existing(ResourceId::new("ecs.service", "service"), service().attributes);
        let to = service().with_attribute("tags", Value::map([("Name", Value::string("web"))]));

        let ops = patch_operations(&ecs::service_config(), &from, &to);
        assert_eq!(
            ops,
            vec![json!({"op": "replace", "path": "/Tags", "value": [{"Key": "Name", "Value": "web"}]})]
        );
    }

    #[test]
    fn declared_shape_is_kept_when_the_provider_agrees() {
        let task = Resource::new("ecs.task_definition", "task_definition")
            .with_attribute("family", Value::string("web"))
            .with_attribute("cpu", Value::string("256"))
            .with_attribute(
                "container_definitions",
                Value::List(vec![Value::map([
                    ("name", Value::string("web")),
                    ("port_mappings", Value::List(vec![Value::map([("container_port", Value::Int(8501))])])),
                ])]),
            );
        let props = json!({
            "TaskDefinitionArn": "arn:aws:ecs:us-east-2:123456789012:task-definition/web:1",
            "Family": "web",
            "Cpu": "512",
            "ContainerDefinitions": [{"Name": "web", "PortMappings": [{"ContainerPort": 8501}]}],
        });
        let config = ecs::task_definition_config();
        let read = state_from_properties(
            &config,
            task.id.clone(),
            "arn:aws:ecs:us-east-2:123456789012:task-definition/web:1",
            &props,
        );
        let state = reconcile_with_declared(&config, &task, read);

        assert_eq!(state.attributes["container_definitions"], task.attributes["container_definitions"]);
        assert_eq!(state.attributes["family"], Value::string("web"));
        // Drift stays visible
        assert_eq!(state.attributes["cpu"], Value::string("512"));
    }

    #[test]
    fn missing_resources_are_not_reconciled() {
        let config = ecs::task_definition_config();
        let task = Resource::new("ecs.task_definition", "task_definition")
            .with_attribute("family", Value::string("web"));
        let state = reconcile_with_declared(&config, &task, State::not_found(task.id.clone()));
        assert!(!state.exists);
        assert!(state.attributes.is_empty());
    }

    #[test]
    fn state_reads_computed_attributes() {
        let props = json!({
            "LoadBalancerArn": "arn:aws:elasticloadbalancing:us-east-2:123456789012:loadbalancer/app/web/abc",
            "DNSName": "web-123.us-east-2.elb.amazonaws.com",
            "CanonicalHostedZoneID": "Z3AADJGX6KTTL2",
            "Scheme": "internet-facing",
            "Tags": [{"Key": "Name", "Value": "web-alb"}],
        });
        let state = state_from_properties(
            &elbv2::load_balancer_config(),
            ResourceId::new("elbv2.load_balancer", "load_balancer"),
            "arn:aws:elasticloadbalancing:us-east-2:123456789012:loadbalancer/app/web/abc",
            &props,
        );

        assert!(state.exists);
        assert_eq!(
            state.attributes["dns_name"],
            Value::string("web-123.us-east-2.elb.amazonaws.com")
        );
        assert_eq!(state.attributes["canonical_hosted_zone_id"], Value::string("Z3AADJGX6KTTL2"));
        assert_eq!(
            state.attributes["tags"],
            Value::map([("Name", Value::string("web-alb"))])
        );
    }
}
