//! Resource documents and their identities
//!
//! A [`ResourceDocument`] is one decoded declarative object. It keeps the
//! full object as a JSON value so that fields unknown to kapply travel to
//! the backend untouched.

use serde_json::{Map, Value};
use std::fmt;

use crate::error::{DecodeError, Result};

/// Namespace used for namespaced documents that do not set one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Built-in kinds that are never namespaced. The decoder does not assign a
/// default namespace to these; other kinds are corrected once the backend
/// reports their scope.
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "CSIDriver",
    "CSINode",
    "CertificateSigningRequest",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "FlowSchema",
    "IPAddress",
    "IngressClass",
    "MutatingAdmissionPolicy",
    "MutatingAdmissionPolicyBinding",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PriorityClass",
    "PriorityLevelConfiguration",
    "RuntimeClass",
    "ServiceCIDR",
    "StorageClass",
    "ValidatingAdmissionPolicy",
    "ValidatingAdmissionPolicyBinding",
    "ValidatingWebhookConfiguration",
    "VolumeAttachment",
    "VolumeAttributesClass",
];

/// Identity of a resource within a batch: (kind, namespace, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    pub kind: String,
    /// None for cluster-scoped resources
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(kind: impl Into<String>, namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Backend address of a resource: the identity plus the apiVersion needed
/// to resolve its type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub api_version: String,
    pub identity: ResourceIdentity,
}

impl ResourceKey {
    pub fn new(api_version: impl Into<String>, identity: ResourceIdentity) -> Self {
        Self {
            api_version: api_version.into(),
            identity,
        }
    }

    pub fn kind(&self) -> &str {
        &self.identity.kind
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.identity.namespace.as_deref()
    }

    /// Split the apiVersion into (group, version)
    ///
    /// - "apps/v1" -> ("apps", "v1")
    /// - "v1" -> ("", "v1") (core API)
    pub fn group_version(&self) -> (&str, &str) {
        match self.api_version.rsplit_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.identity.fmt(f)
    }
}

/// A decoded declarative object
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDocument {
    key: ResourceKey,
    object: Value,
}

impl ResourceDocument {
    /// Build a document from a decoded value
    ///
    /// `index` is the position of the document in its source and is only
    /// used in error messages.
    pub fn from_value(object: Value, index: usize) -> Result<Self> {
        let map = object
            .as_object()
            .ok_or(DecodeError::NotAnObject { index })?;

        let api_version = required_str(map.get("apiVersion"), index, "apiVersion")?;
        let kind = required_str(map.get("kind"), index, "kind")?;

        let metadata = match map.get("metadata") {
            Some(Value::Object(metadata)) => metadata,
            Some(_) => {
                return Err(DecodeError::InvalidField {
                    index,
                    field: "metadata".to_string(),
                    message: "expected a mapping".to_string(),
                });
            }
            None => {
                return Err(DecodeError::MissingField {
                    index,
                    field: "metadata.name".to_string(),
                });
            }
        };

        let name = required_str(metadata.get("name"), index, "metadata.name")?;
        let namespace = match metadata.get("namespace") {
            None | Some(Value::Null) => None,
            Some(Value::String(ns)) if ns.is_empty() => None,
            Some(Value::String(ns)) => Some(ns.clone()),
            Some(_) => {
                return Err(DecodeError::InvalidField {
                    index,
                    field: "metadata.namespace".to_string(),
                    message: "expected a string".to_string(),
                });
            }
        };

        let identity = ResourceIdentity {
            kind,
            namespace,
            name,
        };

        Ok(Self {
            key: ResourceKey::new(api_version, identity),
            object,
        })
    }

    /// Assign `namespace` when the document has none and its kind is namespaced
    pub fn with_default_namespace(mut self, namespace: &str) -> Self {
        if self.key.identity.namespace.is_some() || is_cluster_scoped(self.kind()) {
            return self;
        }

        if let Some(metadata) = self.metadata_mut() {
            metadata.insert(
                "namespace".to_string(),
                Value::String(namespace.to_string()),
            );
        }
        self.key.identity.namespace = Some(namespace.to_string());
        self
    }

    /// Set the namespace, or clear it for cluster-scoped objects
    ///
    /// Both the identity and `metadata.namespace` change.
    pub fn with_namespace(mut self, namespace: Option<&str>) -> Self {
        if let Some(metadata) = self.metadata_mut() {
            match namespace {
                Some(ns) => {
                    metadata.insert("namespace".to_string(), Value::String(ns.to_string()));
                }
                None => {
                    metadata.remove("namespace");
                }
            }
        }
        self.key.identity.namespace = namespace.map(str::to_string);
        self
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.key.identity
    }

    pub fn api_version(&self) -> &str {
        &self.key.api_version
    }

    pub fn kind(&self) -> &str {
        &self.key.identity.kind
    }

    pub fn name(&self) -> &str {
        &self.key.identity.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.key.identity.namespace.as_deref()
    }

    /// The full object
    pub fn object(&self) -> &Value {
        &self.object
    }

    pub fn into_object(self) -> Value {
        self.object
    }

    /// Look up a field by JSON pointer, e.g. `/data/key1`
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.object.pointer(pointer)
    }

    /// `metadata.resourceVersion`, set on documents read from a backend
    pub fn resource_version(&self) -> Option<&str> {
        self.pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
    }

    pub fn set_resource_version(&mut self, version: &str) {
        if let Some(metadata) = self.metadata_mut() {
            metadata.insert(
                "resourceVersion".to_string(),
                Value::String(version.to_string()),
            );
        }
    }

    /// Annotation value from `metadata.annotations`
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.pointer("/metadata/annotations")
            .and_then(Value::as_object)
            .and_then(|annotations| annotations.get(key))
            .and_then(Value::as_str)
    }

    /// Replace the object while keeping the key.
    ///
    /// Used by the reconciler for merged objects, which always carry the
    /// identity of the live object they were merged into.
    pub fn with_object(&self, object: Value) -> Self {
        Self {
            key: self.key.clone(),
            object,
        }
    }

    fn metadata_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.object
            .as_object_mut()
            .and_then(|map| map.get_mut("metadata"))
            .and_then(Value::as_object_mut)
    }
}

/// Whether `kind` is a well-known cluster-scoped kind
pub fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

fn required_str(value: Option<&Value>, index: usize, field: &str) -> Result<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) | None | Some(Value::Null) => Err(DecodeError::MissingField {
            index,
            field: field.to_string(),
        }),
        Some(_) => Err(DecodeError::InvalidField {
            index,
            field: field.to_string(),
            message: "expected a string".to_string(),
        }),
    }
}
