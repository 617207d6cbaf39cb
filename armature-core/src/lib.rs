//! Armature Core
//!
//! Core library for an infrastructure engine that manages cloud resources
//! declaratively: the resource model shared by all providers, and the
//! Provider trait that concrete cloud backends implement.

pub mod provider;
pub mod resource;

pub use provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
pub use resource::{Resource, ResourceId, State, Value};
