//! In-memory backend for testing
//!
//! This backend stores objects in memory, useful for unit tests without
//! requiring a Kubernetes cluster. It mimics the parts of API server
//! behavior the reconciler depends on: resourceVersion bumps on every write,
//! conflicts on stale versions and create races, and NotFound on delete.

use async_trait::async_trait;
use kapply_core::{ResourceDocument, ResourceIdentity, ResourceKey, is_cluster_scoped};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{Backend, DeleteStatus};
use crate::error::{KubeError, Result};

/// In-memory backend for testing
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    in_flight: Arc<InFlight>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl OperationCounts {
    pub fn total(&self) -> usize {
        self.gets + self.creates + self.updates + self.deletes
    }
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ResourceIdentity, ResourceDocument>,
    counts: OperationCounts,
    last_version: u64,
    offline: bool,
    pending_conflicts: usize,
    rejections: HashMap<ResourceIdentity, String>,
    latency: Option<Duration>,
    cluster_kinds: HashSet<String>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.offline {
            return Err(KubeError::Connection(
                "connection refused (memory backend offline)".to_string(),
            ));
        }
        Ok(())
    }

    fn check_rejected(&self, identity: &ResourceIdentity) -> Result<()> {
        match self.rejections.get(identity) {
            Some(message) => Err(KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: message.clone(),
                reason: "Invalid".to_string(),
                code: 422,
            }))),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlightGuard<'a>(&'a InFlight);

impl<'a> InFlightGuard<'a> {
    fn enter(in_flight: &'a InFlight) -> Self {
        let now = in_flight.current.fetch_add(1, Ordering::SeqCst) + 1;
        in_flight.peak.fetch_max(now, Ordering::SeqCst);
        Self(in_flight)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryBackend {
    /// Create a new empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated objects (not counted as operations)
    pub fn with_documents(documents: Vec<ResourceDocument>) -> Self {
        let backend = Self::new();
        for doc in documents {
            backend.insert(doc);
        }
        backend
    }

    /// Store an object directly, assigning a fresh resourceVersion
    pub fn insert(&self, mut doc: ResourceDocument) {
        let mut state = self.state();
        let version = state.next_version();
        doc.set_resource_version(&version);
        state.objects.insert(doc.identity().clone(), doc);
    }

    /// Change a stored object out-of-band, as another client would
    ///
    /// Returns false if the object does not exist.
    pub fn modify(&self, identity: &ResourceIdentity, edit: impl FnOnce(&mut Value)) -> bool {
        let mut state = self.state();
        let Some(current) = state.objects.get(identity) else {
            return false;
        };

        let mut object = current.object().clone();
        edit(&mut object);
        let mut doc = current.with_object(object);
        let version = state.next_version();
        doc.set_resource_version(&version);
        state.objects.insert(identity.clone(), doc);
        true
    }

    /// Read a stored object without counting an operation
    pub fn lookup(&self, identity: &ResourceIdentity) -> Option<ResourceDocument> {
        self.state().objects.get(identity).cloned()
    }

    /// All stored objects, keyed by identity
    pub fn snapshot(&self) -> BTreeMap<ResourceIdentity, Value> {
        self.state()
            .objects
            .iter()
            .map(|(identity, doc)| (identity.clone(), doc.object().clone()))
            .collect()
    }

    /// Count stored objects
    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.state().counts.clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        self.state().counts = OperationCounts::default();
    }

    /// Make every call fail with a connection error
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Make the next `count` updates fail with a conflict, as if another
    /// writer got there first
    pub fn inject_conflicts(&self, count: usize) {
        self.state().pending_conflicts = count;
    }

    /// Reject every write to `identity` with a validation error
    pub fn reject(&self, identity: ResourceIdentity, message: impl Into<String>) {
        self.state().rejections.insert(identity, message.into());
    }

    /// Serve `kind` as cluster-scoped, like a CRD with `scope: Cluster`
    ///
    /// Built-in cluster-scoped kinds are known without this.
    pub fn serve_cluster_scoped(&self, kind: impl Into<String>) {
        self.state().cluster_kinds.insert(kind.into());
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    /// Highest number of calls that were in progress at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.in_flight.peak.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn is_namespaced(&self, key: &ResourceKey) -> Result<bool> {
        let kind = key.kind();
        Ok(!is_cluster_scoped(kind) && !self.state().cluster_kinds.contains(kind))
    }

    async fn get(&self, key: &ResourceKey) -> Result<Option<ResourceDocument>> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        self.simulate_latency().await;

        let mut state = self.state();
        state.counts.gets += 1;
        state.check_reachable()?;

        Ok(state.objects.get(&key.identity).cloned())
    }

    async fn create(&self, doc: &ResourceDocument) -> Result<ResourceDocument> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        self.simulate_latency().await;

        let mut state = self.state();
        state.counts.creates += 1;
        state.check_reachable()?;
        state.check_rejected(doc.identity())?;

        if state.objects.contains_key(doc.identity()) {
            return Err(KubeError::Conflict {
                resource: doc.identity().to_string(),
                message: "already exists".to_string(),
            });
        }

        let mut stored = doc.clone();
        let version = state.next_version();
        stored.set_resource_version(&version);
        state.objects.insert(doc.identity().clone(), stored.clone());
        Ok(stored)
    }

    async fn update(&self, doc: &ResourceDocument) -> Result<ResourceDocument> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        self.simulate_latency().await;

        let mut state = self.state();
        state.counts.updates += 1;
        state.check_reachable()?;
        state.check_rejected(doc.identity())?;

        let identity = doc.identity().clone();
        let live_version = match state.objects.get(&identity) {
            Some(live) => live.resource_version().map(str::to_string),
            None => {
                return Err(KubeError::NotFound {
                    resource: identity.to_string(),
                });
            }
        };

        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            // Someone else wrote in between
            let version = state.next_version();
            if let Some(live) = state.objects.get_mut(&identity) {
                live.set_resource_version(&version);
            }
            return Err(KubeError::Conflict {
                resource: identity.to_string(),
                message: "the object has been modified".to_string(),
            });
        }

        if doc.resource_version() != live_version.as_deref() {
            return Err(KubeError::Conflict {
                resource: identity.to_string(),
                message: format!(
                    "stale resourceVersion {:?}, live is {:?}",
                    doc.resource_version(),
                    live_version
                ),
            });
        }

        let mut stored = doc.clone();
        let version = state.next_version();
        stored.set_resource_version(&version);
        state.objects.insert(identity, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, key: &ResourceKey) -> Result<DeleteStatus> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        self.simulate_latency().await;

        let mut state = self.state();
        state.counts.deletes += 1;
        state.check_reachable()?;
        state.check_rejected(&key.identity)?;

        Ok(match state.objects.remove(&key.identity) {
            Some(_) => DeleteStatus::Deleted,
            None => DeleteStatus::NotFound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_map(name: &str, value: &str) -> ResourceDocument {
        ResourceDocument::from_value(
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": { "name": name, "namespace": "default" },
                "data": { "key1": value }
            }),
            0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_create_and_get() {
        let backend = MemoryBackend::new();
        let doc = config_map("test0", "apple");

        let created = backend.create(&doc).await.unwrap();
        assert_eq!(created.resource_version(), Some("1"));

        let fetched = backend.get(doc.key()).await.unwrap().unwrap();
        assert_eq!(fetched.pointer("/data/key1"), Some(&json!("apple")));

        let counts = backend.operation_counts();
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.gets, 1);
    }

    #[tokio::test]
    async fn test_memory_create_duplicate_conflicts() {
        let backend = MemoryBackend::new();
        let doc = config_map("test0", "apple");
        backend.create(&doc).await.unwrap();

        let err = backend.create(&doc).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_memory_update_requires_current_version() {
        let backend = MemoryBackend::new();
        let live = backend.create(&config_map("cm", "apple")).await.unwrap();

        let stale = config_map("cm", "orange");
        let err = backend.update(&stale).await.unwrap_err();
        assert!(err.is_conflict());

        let fresh = live.with_object({
            let mut object = live.object().clone();
            object["data"]["key1"] = json!("orange");
            object
        });
        let updated = backend.update(&fresh).await.unwrap();
        assert_eq!(updated.resource_version(), Some("2"));
    }

    #[tokio::test]
    async fn test_memory_update_missing_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend.update(&config_map("ghost", "x")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_memory_injected_conflict_bumps_version() {
        let backend = MemoryBackend::new();
        let live = backend.create(&config_map("cm", "apple")).await.unwrap();
        backend.inject_conflicts(1);

        assert!(backend.update(&live).await.unwrap_err().is_conflict());

        let refreshed = backend.get(live.key()).await.unwrap().unwrap();
        assert_ne!(refreshed.resource_version(), live.resource_version());
        backend.update(&refreshed).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_delete() {
        let backend = MemoryBackend::with_documents(vec![config_map("cm", "apple")]);
        let key = config_map("cm", "apple").key().clone();

        assert_eq!(backend.delete(&key).await.unwrap(), DeleteStatus::Deleted);
        assert_eq!(backend.delete(&key).await.unwrap(), DeleteStatus::NotFound);
        assert_eq!(backend.object_count(), 0);
    }

    #[tokio::test]
    async fn test_memory_offline() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);

        let err = backend.get(config_map("cm", "x").key()).await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_memory_reject() {
        let backend = MemoryBackend::new();
        let doc = config_map("cm", "x");
        backend.reject(doc.identity().clone(), "data.key1: invalid");

        let err = backend.create(&doc).await.unwrap_err();
        assert!(!err.is_conflict());
        assert!(err.to_string().contains("data.key1: invalid"));
    }

    #[tokio::test]
    async fn test_memory_modify_out_of_band() {
        let backend = MemoryBackend::with_documents(vec![config_map("cm", "apple")]);
        let identity = config_map("cm", "apple").identity().clone();

        assert!(backend.modify(&identity, |object| {
            object["data"]["key2"] = json!("banana");
        }));

        let stored = backend.lookup(&identity).unwrap();
        assert_eq!(stored.pointer("/data/key2"), Some(&json!("banana")));
        assert_eq!(stored.resource_version(), Some("2"));
        assert_eq!(backend.operation_counts().total(), 0);

        let missing = ResourceIdentity::new("ConfigMap", Some("default"), "nope");
        assert!(!backend.modify(&missing, |_| {}));
    }

    #[tokio::test]
    async fn test_memory_scope_lookup() {
        let backend = MemoryBackend::new();
        let key = |api_version: &str, kind: &str| {
            ResourceKey::new(api_version, ResourceIdentity::new(kind, None, "x"))
        };

        assert!(backend.is_namespaced(&key("v1", "ConfigMap")).await.unwrap());
        assert!(!backend.is_namespaced(&key("v1", "Namespace")).await.unwrap());

        let issuer = key("cert-manager.io/v1", "ClusterIssuer");
        assert!(backend.is_namespaced(&issuer).await.unwrap());
        backend.serve_cluster_scoped("ClusterIssuer");
        assert!(!backend.is_namespaced(&issuer).await.unwrap());
        assert_eq!(backend.operation_counts().total(), 0);
    }

    #[tokio::test]
    async fn test_operation_counts_reset() {
        let backend = MemoryBackend::new();
        let doc = config_map("cm", "x");
        backend.create(&doc).await.unwrap();
        let _ = backend.get(doc.key()).await;
        let _ = backend.delete(doc.key()).await;

        assert_eq!(backend.operation_counts().total(), 3);
        backend.reset_counts();
        assert_eq!(backend.operation_counts(), OperationCounts::default());
    }
}
