//! Kubernetes API server backend
//!
//! Works on any resource type without compile-time type knowledge: the
//! apiVersion/kind of each document is resolved through discovery and the
//! object is sent as a `DynamicObject`.

use async_trait::async_trait;
use kapply_core::{ResourceDocument, ResourceKey};
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, PostParams, PropagationPolicy},
    core::{GroupVersionKind, TypeMeta},
    discovery::{self, ApiCapabilities, ApiResource, Scope},
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{Backend, DeleteStatus};
use crate::error::{KubeError, Result};

/// Field manager name recorded on writes
pub const DEFAULT_FIELD_MANAGER: &str = "kapply";

/// Resolved API resource for an (apiVersion, kind)
#[derive(Debug, Clone)]
struct Resolved {
    resource: ApiResource,
    capabilities: ApiCapabilities,
}

/// Backend talking to a live cluster
pub struct KubeBackend {
    client: Client,
    field_manager: String,
    /// Cached discovery results keyed by (apiVersion, kind)
    resolved: RwLock<HashMap<(String, String), Resolved>>,
}

impl KubeBackend {
    /// Create a backend from an existing client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Set the field manager recorded on writes
    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    async fn resolve(&self, key: &ResourceKey) -> Result<Resolved> {
        let cache_key = (key.api_version.clone(), key.kind().to_string());
        if let Some(resolved) = self.resolved.read().await.get(&cache_key) {
            return Ok(resolved.clone());
        }

        let (group, version) = key.group_version();
        let gvk = GroupVersionKind::gvk(group, version, key.kind());

        let (resource, capabilities) = match discovery::pinned_kind(&self.client, &gvk).await {
            Ok(found) => found,
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                return Err(unknown_type(key));
            }
            Err(kube::Error::Discovery(_)) => return Err(unknown_type(key)),
            Err(e) => return Err(KubeError::Api(e)),
        };
        debug!(
            api_version = %key.api_version,
            kind = key.kind(),
            plural = %resource.plural,
            namespaced = capabilities.scope == Scope::Namespaced,
            "resolved resource type"
        );

        let resolved = Resolved {
            resource,
            capabilities,
        };
        self.resolved
            .write()
            .await
            .insert(cache_key, resolved.clone());
        Ok(resolved)
    }

    fn api(&self, resolved: &Resolved, key: &ResourceKey) -> Result<Api<DynamicObject>> {
        if resolved.capabilities.scope == Scope::Cluster {
            return Ok(Api::all_with(self.client.clone(), &resolved.resource));
        }
        match key.namespace() {
            Some(ns) => Ok(Api::namespaced_with(
                self.client.clone(),
                ns,
                &resolved.resource,
            )),
            None => Err(KubeError::MissingNamespace {
                resource: key.identity.to_string(),
            }),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }
}

#[async_trait]
impl Backend for KubeBackend {
    async fn is_namespaced(&self, key: &ResourceKey) -> Result<bool> {
        Ok(self.resolve(key).await?.capabilities.scope == Scope::Namespaced)
    }

    #[instrument(skip(self), fields(resource = %key))]
    async fn get(&self, key: &ResourceKey) -> Result<Option<ResourceDocument>> {
        let resolved = self.resolve(key).await?;
        let api = self.api(&resolved, key)?;

        match api.get_opt(key.name()).await? {
            Some(obj) => Ok(Some(from_dynamic(obj, &resolved)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, doc), fields(resource = %doc.key()))]
    async fn create(&self, doc: &ResourceDocument) -> Result<ResourceDocument> {
        let resolved = self.resolve(doc.key()).await?;
        let api = self.api(&resolved, doc.key())?;

        let created = api
            .create(&self.post_params(), &to_dynamic(doc, &resolved)?)
            .await?;
        from_dynamic(created, &resolved)
    }

    #[instrument(skip(self, doc), fields(resource = %doc.key()))]
    async fn update(&self, doc: &ResourceDocument) -> Result<ResourceDocument> {
        let resolved = self.resolve(doc.key()).await?;
        let api = self.api(&resolved, doc.key())?;

        let replaced = api
            .replace(doc.name(), &self.post_params(), &to_dynamic(doc, &resolved)?)
            .await?;
        from_dynamic(replaced, &resolved)
    }

    #[instrument(skip(self), fields(resource = %key))]
    async fn delete(&self, key: &ResourceKey) -> Result<DeleteStatus> {
        let resolved = self.resolve(key).await?;
        let api = self.api(&resolved, key)?;

        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };

        match api.delete(key.name(), &params).await {
            Ok(_) => Ok(DeleteStatus::Deleted),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(DeleteStatus::NotFound),
            Err(e) => Err(KubeError::Api(e)),
        }
    }
}

fn unknown_type(key: &ResourceKey) -> KubeError {
    KubeError::UnknownResourceType {
        api_version: key.api_version.clone(),
        kind: key.kind().to_string(),
    }
}

fn to_dynamic(doc: &ResourceDocument, resolved: &Resolved) -> Result<DynamicObject> {
    let mut obj: DynamicObject = serde_json::from_value(doc.object().clone())?;
    if resolved.capabilities.scope == Scope::Cluster {
        obj.metadata.namespace = None;
    }
    Ok(obj)
}

fn from_dynamic(mut obj: DynamicObject, resolved: &Resolved) -> Result<ResourceDocument> {
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: resolved.resource.api_version.clone(),
            kind: resolved.resource.kind.clone(),
        });
    }
    let value = serde_json::to_value(&obj)?;
    Ok(ResourceDocument::from_value(value, 0)?)
}
