//! Routes each resource to the provider that manages its type

use quay_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult};
use quay_core::resource::{Resource, ResourceId, State};

use crate::image::ImageProvider;
use crate::provider::AwsccProvider;

/// Provider for the whole stack: images through docker, the rest through Cloud Control
pub struct StackProvider {
    providers: Vec<Box<dyn Provider>>,
}

impl StackProvider {
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Self {
        Self { providers }
    }

    /// Providers for the given region
    pub async fn for_region(region: &str) -> Self {
        Self::new(vec![
            Box::new(ImageProvider::new()),
            Box::new(AwsccProvider::new(region).await),
        ])
    }

    /// Name of the provider that manages `resource_type`
    pub fn provider_name(&self, resource_type: &str) -> Option<&'static str> {
        self.providers
            .iter()
            .find(|p| p.handles(resource_type))
            .map(|p| p.name())
    }

    fn provider_for(&self, id: &ResourceId) -> ProviderResult<&dyn Provider> {
        self.providers
            .iter()
            .find(|p| p.handles(&id.resource_type))
            .map(|p| p.as_ref())
            .ok_or_else(|| {
                ProviderError::new(format!("No provider handles {}", id.resource_type))
                    .for_resource(id.clone())
            })
    }
}

impl Provider for StackProvider {
    fn name(&self) -> &'static str {
        "stack"
    }

    fn handles(&self, resource_type: &str) -> bool {
        self.providers.iter().any(|p| p.handles(resource_type))
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        match self.provider_for(id) {
            Ok(provider) => provider.read(id, identifier),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        match self.provider_for(&resource.id) {
            Ok(provider) => provider.create(resource),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        match self.provider_for(id) {
            Ok(provider) => provider.update(id, identifier, from, to),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        match self.provider_for(id) {
            Ok(provider) => provider.delete(id, identifier),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Answers every create with its own name as the identifier
    struct Named {
        name: &'static str,
        prefix: &'static str,
    }

    impl Provider for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn handles(&self, resource_type: &str) -> bool {
            resource_type.starts_with(self.prefix)
        }

        fn read(&self, id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let id = resource.id.clone();
            Box::pin(async move { Ok(State::existing(id, HashMap::new()).with_identifier(self.name)) })
        }

        fn update(
            &self,
            id: &ResourceId,
            _identifier: &str,
            _from: &State,
            _to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::existing(id, HashMap::new()).with_identifier(self.name)) })
        }

        fn delete(&self, _id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn stack() -> StackProvider {
        StackProvider::new(vec![
            Box::new(Named { name: "docker", prefix: "docker." }),
            Box::new(Named { name: "awscc", prefix: "" }),
        ])
    }

    #[tokio::test]
    async fn images_go_to_docker_and_the_rest_to_cloud_control() {
        let stack = stack();

        let build = stack
            .create(&Resource::new("docker.image_build", "image_build"))
            .await
            .unwrap();
        assert_eq!(build.identifier.as_deref(), Some("docker"));

        let vpc = stack.create(&Resource::new("ec2.vpc", "vpc")).await.unwrap();
        assert_eq!(vpc.identifier.as_deref(), Some("awscc"));

        assert_eq!(stack.provider_name("docker.image_push"), Some("docker"));
        assert_eq!(stack.provider_name("ecs.service"), Some("awscc"));
    }

    #[tokio::test]
    async fn unknown_types_are_an_error() {
        let stack = StackProvider::new(vec![Box::new(Named { name: "docker", prefix: "docker." })]);
        assert!(!stack.handles("ec2.vpc"));

        let err = stack
            .create(&Resource::new("ec2.vpc", "vpc"))
            .await
            .unwrap_err();
        assert!(err.message.contains("No provider handles ec2.vpc"));
    }
}
