//! The seam between the interpreter and cloud APIs
//!
//! Attributes handed to a provider are fully resolved; no `ResourceRef`
//! reaches one.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Error)]
#[error("{}{message}", .resource_id.as_ref().map(|id| format!("[{}] ", id)).unwrap_or_default())]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait Provider: Send + Sync {
    /// Recorded next to each resource in the state file
    fn name(&self) -> &'static str;

    fn handles(&self, resource_type: &str) -> bool;

    /// `State::not_found` when the identifier no longer resolves
    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>>;

    /// The returned state carries the physical identifier plus computed
    /// attributes such as ARNs and DNS names
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;
}

impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn handles(&self, resource_type: &str) -> bool {
        (**self).handles(resource_type)
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }
}
