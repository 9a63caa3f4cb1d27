//! Error types for kapply-kube

use kapply_core::DecodeError;
use thiserror::Error;

use crate::report::ReconcileReport;

/// Result type for kapply-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while reconciling manifests against a backend
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Malformed manifest, raised before any backend call
    #[error("invalid manifest: {0}")]
    Decode(#[from] DecodeError),

    /// Backend unreachable or credentials rejected
    #[error("cannot reach backend: {0}")]
    Connection(String),

    /// Optimistic concurrency conflict (stale resourceVersion or create race)
    #[error("conflict on {resource}: {message}")]
    Conflict { resource: String, message: String },

    /// Resource not found
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// apiVersion/kind not served by the cluster
    #[error("unknown resource type: {api_version}/{kind}")]
    UnknownResourceType { api_version: String, kind: String },

    /// A namespaced object reached the backend without a namespace
    #[error("{resource} is namespaced but has no namespace")]
    MissingNamespace { resource: String },

    /// A manifest source could not be read
    #[error("failed to load {source_name}: {message}")]
    Load {
        source_name: String,
        message: String,
    },

    /// Kubeconfig could not be read or the context does not exist
    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// No usable configuration could be inferred from the environment
    #[error("cannot infer cluster configuration: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The batch was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Timeout
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Some documents or sources failed; the report holds every result
    #[error("{}", partial_batch_message(.report, .cause.as_deref()))]
    PartialBatch {
        report: Box<ReconcileReport>,
        /// The error that stopped the batch, if it was stopped early
        cause: Option<Box<KubeError>>,
    },
}

fn partial_batch_message(report: &ReconcileReport, cause: Option<&KubeError>) -> String {
    match cause {
        Some(cause) => format!("batch aborted ({}): {}", report.summary(), cause),
        None => format!("batch incomplete ({})", report.summary()),
    }
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::NotFound { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        match self {
            KubeError::Conflict { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    /// Check if the backend could not be reached or refused our credentials.
    ///
    /// These errors are fatal for a whole batch.
    pub fn is_connection(&self) -> bool {
        match self {
            KubeError::Connection(_) => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 401 || resp.code == 403,
            KubeError::Api(
                kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::Auth(_),
            ) => true,
            _ => false,
        }
    }

    /// Check if this error stops the remaining work of a batch
    pub fn is_fatal(&self) -> bool {
        self.is_connection() || matches!(self, KubeError::Cancelled | KubeError::Timeout(_))
    }

    /// The report carried by a partial batch error
    pub fn report(&self) -> Option<&ReconcileReport> {
        match self {
            KubeError::PartialBatch { report, .. } => Some(report),
            _ => None,
        }
    }
}
