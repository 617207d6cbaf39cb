//! Azure Resource Manager provider implementation
//!
//! CRUD handlers follow the same shape for every resource type: acquire the
//! named locks for the resource (and its parent, for child resources),
//! issue the mutating request, hand the response to the poller, wait for
//! the operation to reach a terminal state, then re-read the final state.
//! Locks are guard-scoped, so they release on every exit path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use armature_client::{
    ClientError, HttpTransport, OperationHandle, Poller, Transport, TransportRequest,
    TransportResponse,
};
use armature_core::provider::{ProviderError, ProviderResult};
use armature_core::resource::{Resource, ResourceId, State, Value};
use armature_locks::{LockGuard, LockRegistry};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::AzureConfig;
use crate::resources::{ResourceConfig, get_resource_config};

/// Azure Resource Manager provider
pub struct AzureProvider {
    transport: Arc<dyn Transport>,
    poller: Poller,
    locks: Arc<LockRegistry>,
    cancel: CancellationToken,
    config: AzureConfig,
}

impl AzureProvider {
    /// Create a provider talking to the configured ARM endpoint.
    ///
    /// The lock registry is an explicit argument so that every provider in
    /// the process can share one registry.
    pub fn new(config: AzureConfig, locks: Arc<LockRegistry>) -> Self {
        Self::with_transport(config, locks, Arc::new(HttpTransport::new()))
    }

    /// Create a provider over a custom transport (used by tests and by
    /// callers that need request middleware)
    pub fn with_transport(
        config: AzureConfig,
        locks: Arc<LockRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            poller: Poller::new(Arc::clone(&transport)),
            transport,
            locks,
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Attach a cancellation token observed by all polling loops
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    // =========================================================================
    // URL Construction
    // =========================================================================

    fn resource_path(
        &self,
        config: &ResourceConfig,
        parent: Option<&str>,
        name: &str,
    ) -> ProviderResult<String> {
        let base = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}",
            self.config.subscription_id, self.config.resource_group, config.arm_type
        );
        match (config.child_segment, parent) {
            (Some(segment), Some(parent_name)) => {
                Ok(format!("{base}/{parent_name}/{segment}/{name}"))
            }
            (Some(_), None) => Err(ProviderError::new(format!(
                "missing parent resource name for {}",
                config.arm_type
            ))),
            (None, _) => Ok(format!("{base}/{name}")),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}{}?api-version={}",
            self.config.endpoint, path, self.config.api_version
        )
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read a resource by its remote identifier (the ARM resource ID path)
    pub async fn read_resource(
        &self,
        resource_type: &str,
        name: &str,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let id = ResourceId::new(resource_type, name);
        let config = config_for(&id)?;

        let identifier = match identifier {
            Some(identifier) => identifier,
            None => return Ok(State::not_found(id)),
        };

        let url = self.url(identifier);
        let response = self
            .transport
            .send(TransportRequest::get(&url))
            .await
            .map_err(|e| {
                ProviderError::new(format!("reading {identifier}: {e}"))
                    .for_resource(id.clone())
                    .with_cause(e)
            })?;

        if response.status == 404 {
            return Ok(State::not_found(id));
        }
        if !response.is_success() {
            return Err(server_error("read", &response).for_resource(id));
        }

        let body = response.json().ok_or_else(|| {
            ProviderError::new("resource body is not JSON").for_resource(id.clone())
        })?;

        Ok(state_from_body(config, id, identifier, &body))
    }

    /// Create a resource and wait for the operation to complete
    pub async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        self.put_resource(&resource, self.config.timeouts.create())
            .await
    }

    /// Update a resource in place (ARM PUT semantics: full replacement)
    pub async fn update_resource(
        &self,
        _id: ResourceId,
        _identifier: &str,
        to: Resource,
    ) -> ProviderResult<State> {
        self.put_resource(&to, self.config.timeouts.update()).await
    }

    /// Delete a resource and wait for the operation to complete
    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let config = config_for(id)?;

        let parent = path_segment(identifier, parent_collection(config)).map(str::to_string);
        let _guards = self.acquire_locks(config, parent.as_deref(), id).await;

        let url = self.url(identifier);
        debug!(resource = %id, url = %url, "deleting resource");
        let response = self
            .transport
            .send(TransportRequest::delete(&url))
            .await
            .map_err(|e| {
                ProviderError::new(format!("deleting {identifier}: {e}"))
                    .for_resource(id.clone())
                    .with_cause(e)
            })?;

        // Deleting something already gone is success.
        if response.status == 404 {
            return Ok(());
        }
        if response.status >= 400 {
            return Err(server_error("delete", &response).for_resource(id.clone()));
        }

        self.wait_for_operation(&response, &url, self.config.timeouts.delete())
            .await
            .map_err(|e| e.for_resource(id.clone()))?;
        Ok(())
    }

    // =========================================================================
    // Shared Handler Plumbing
    // =========================================================================

    async fn put_resource(&self, resource: &Resource, timeout: Duration) -> ProviderResult<State> {
        let id = &resource.id;
        let config = config_for(id)?;

        let parent = match config.parent_attr {
            Some(attr) => Some(
                resource
                    .attributes
                    .get(attr)
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ProviderError::new(format!("missing required attribute {attr}"))
                            .for_resource(id.clone())
                    })?
                    .to_string(),
            ),
            None => None,
        };

        let _guards = self.acquire_locks(config, parent.as_deref(), id).await;

        let path = self.resource_path(config, parent.as_deref(), &id.name)?;
        let url = self.url(&path);
        let body = build_request_body(config, resource)?;

        debug!(resource = %id, url = %url, "putting resource");
        let response = self
            .transport
            .send(TransportRequest::put(&url, body))
            .await
            .map_err(|e| {
                ProviderError::new(format!("putting {path}: {e}"))
                    .for_resource(id.clone())
                    .with_cause(e)
            })?;

        if response.status >= 400 {
            return Err(server_error("put", &response).for_resource(id.clone()));
        }

        self.wait_for_operation(&response, &url, timeout)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        self.read_resource(&id.resource_type, &id.name, Some(&path))
            .await
    }

    /// Acquire the named locks for a mutation. Child resources lock their
    /// parent too; `acquire_pair` normalizes the order so concurrent
    /// handlers cannot deadlock.
    async fn acquire_locks(
        &self,
        config: &ResourceConfig,
        parent: Option<&str>,
        id: &ResourceId,
    ) -> Vec<LockGuard> {
        match (config.parent_attr, parent) {
            (Some(parent_type), Some(parent_name)) => {
                let (parent_guard, own_guard) = self
                    .locks
                    .acquire_pair((parent_type, parent_name), (&id.resource_type, &id.name))
                    .await;
                vec![parent_guard, own_guard]
            }
            _ => vec![self.locks.acquire(&id.resource_type, &id.name).await],
        }
    }

    /// Hand an initiating response to the poller and wait for completion
    async fn wait_for_operation(
        &self,
        response: &TransportResponse,
        origin_url: &str,
        timeout: Duration,
    ) -> Result<Option<serde_json::Value>, ProviderError> {
        let mut handle = OperationHandle::from_response(response, origin_url)
            .map_err(|e| map_client_error(e, "operation"))?;

        let policy = self.config.polling.policy(timeout);
        self.poller
            .poll_until_done(&mut handle, &policy, &self.cancel)
            .await
            .map_err(|e| map_client_error(e, "operation"))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn config_for(id: &ResourceId) -> ProviderResult<&'static ResourceConfig> {
    get_resource_config(&id.resource_type).ok_or_else(|| {
        ProviderError::new(format!("unknown resource type: {}", id.resource_type))
            .for_resource(id.clone())
    })
}

/// Surface a server-reported error verbatim
fn server_error(operation: &str, response: &TransportResponse) -> ProviderError {
    let detail = response
        .json()
        .map(|v| v.to_string())
        .unwrap_or_else(|| String::from_utf8_lossy(&response.body).into_owned());
    ProviderError::new(format!(
        "{operation} failed with status {}: {detail}",
        response.status
    ))
}

fn map_client_error(err: ClientError, operation: &str) -> ProviderError {
    let message = match &err {
        ClientError::DeadlineExceeded => {
            format!("{operation} did not complete within the configured timeout")
        }
        ClientError::Canceled => format!("{operation} canceled by caller"),
        other => format!("{operation}: {other}"),
    };
    ProviderError::new(message).with_cause(err)
}

/// URL segment naming the collection a child's parent lives in
/// (e.g., "virtualNetworks" for subnets)
fn parent_collection(config: &ResourceConfig) -> &'static str {
    config.arm_type.rsplit('/').next().unwrap_or(config.arm_type)
}

/// Extract the path component following `segment` in an ARM resource ID
fn path_segment<'a>(path: &'a str, segment: &str) -> Option<&'a str> {
    let mut parts = path.split('/');
    while let Some(part) = parts.next() {
        if part == segment {
            return parts.next().filter(|s| !s.is_empty());
        }
    }
    None
}

fn build_request_body(
    config: &ResourceConfig,
    resource: &Resource,
) -> ProviderResult<serde_json::Value> {
    let mut properties = json!({});
    for (attr, pointer, required) in config.attributes {
        match resource.attributes.get(*attr) {
            Some(value) => insert_at_pointer(&mut properties, pointer, value.to_json()),
            None if *required => {
                return Err(
                    ProviderError::new(format!("missing required attribute {attr}"))
                        .for_resource(resource.id.clone()),
                );
            }
            None => {}
        }
    }

    let mut body = json!({ "properties": properties });
    if config.has_location {
        let location = resource
            .attributes
            .get("location")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProviderError::new("missing required attribute location")
                    .for_resource(resource.id.clone())
            })?;
        body["location"] = json!(location);
    }
    Ok(body)
}

/// Insert `value` at a JSON pointer, creating intermediate objects
fn insert_at_pointer(root: &mut serde_json::Value, pointer: &str, value: serde_json::Value) {
    let parts: Vec<&str> = pointer.trim_start_matches('/').split('/').collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };
    let mut current = root;
    for part in parents {
        if !current.get(*part).is_some_and(|v| v.is_object()) {
            current[*part] = json!({});
        }
        current = &mut current[*part];
    }
    current[*last] = value;
}

fn state_from_body(
    config: &ResourceConfig,
    id: ResourceId,
    identifier: &str,
    body: &serde_json::Value,
) -> State {
    let mut attributes = HashMap::new();

    for (attr, pointer, _) in config.attributes {
        if let Some(value) = body.pointer(&format!("/properties{pointer}"))
            && let Some(v) = Value::from_json(value)
        {
            attributes.insert((*attr).to_string(), v);
        }
    }

    if config.has_location
        && let Some(location) = body.get("location").and_then(|v| v.as_str())
    {
        attributes.insert("location".to_string(), Value::String(location.to_string()));
    }

    if let Some(parent_attr) = config.parent_attr
        && let Some(parent) = path_segment(identifier, parent_collection(config))
    {
        attributes.insert(
            parent_attr.to_string(),
            Value::String(parent.to_string()),
        );
    }

    State::existing(id, attributes).with_identifier(identifier)
}
