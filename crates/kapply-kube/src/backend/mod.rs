//! Backend connectors
//!
//! The reconciler only talks to a [`Backend`]. Two implementations ship with
//! the crate:
//! - **Cluster**: a live Kubernetes API server through `kube`
//! - **Memory**: an in-memory store for tests, with operation counters and
//!   failure injection

mod cluster;
mod memory;

pub use cluster::{DEFAULT_FIELD_MANAGER, KubeBackend};
pub use memory::{MemoryBackend, OperationCounts};

use async_trait::async_trait;
use kapply_core::{ResourceDocument, ResourceKey};

use crate::error::Result;

/// Result of a delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Deleted,
    NotFound,
}

/// Capability set the reconciler needs from a backend
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Whether objects of this apiVersion/kind live in a namespace
    async fn is_namespaced(&self, key: &ResourceKey) -> Result<bool>;

    /// Get the live object, `None` if it does not exist
    async fn get(&self, key: &ResourceKey) -> Result<Option<ResourceDocument>>;

    /// Create a new object; an existing object is a conflict
    async fn create(&self, doc: &ResourceDocument) -> Result<ResourceDocument>;

    /// Replace an existing object
    ///
    /// `doc` carries the `metadata.resourceVersion` it was computed from; a
    /// stale version is a conflict.
    async fn update(&self, doc: &ResourceDocument) -> Result<ResourceDocument>;

    /// Delete an object by key
    async fn delete(&self, key: &ResourceKey) -> Result<DeleteStatus>;
}

