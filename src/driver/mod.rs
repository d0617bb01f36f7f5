/// Orchestration driver: realizes a declaration graph against a provider
pub mod client;
pub mod memory;
pub mod models;
pub mod realizer;

pub use client::HttpProvider;
pub use memory::InMemoryProvider;
pub use realizer::{destroy, status, Realizer};

use serde::Serialize;
use std::fmt;

use crate::declare::{ResourceKind, ResourceOutputs};
use crate::error::ProviderError;
use models::LiveResource;

/// Seam to the provider's control plane.
///
/// Implementations make single calls only; ordering, diffing and failure
/// handling belong to the [`Realizer`].
#[allow(async_fn_in_trait)]
pub trait Provider {
    /// Current state of a resource, `None` if it does not exist
    async fn describe(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<LiveResource>, ProviderError>;

    /// Create or update a resource and wait until it is ready
    async fn apply(
        &self,
        kind: ResourceKind,
        name: &str,
        spec: &serde_json::Value,
    ) -> Result<ResourceOutputs, ProviderError>;

    /// Delete a resource and wait until it is gone
    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<(), ProviderError>;
}

/// Lifecycle of one resource during realization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Declared,
    Diffed,
    Applying,
    Applied,
    Failed,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceState::Declared => "declared",
            ResourceState::Diffed => "diffed",
            ResourceState::Applying => "applying",
            ResourceState::Applied => "applied",
            ResourceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the driver has to do to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Create,
    Update,
    Unchanged,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Change::Create => "create",
            Change::Update => "update",
            Change::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}
