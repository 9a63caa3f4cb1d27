//! High-level client for applying manifests to a cluster
//!
//! Combines connection settings, the cluster backend, the manifest loader
//! and the reconciler behind a handful of calls.

use tokio_util::sync::CancellationToken;

use crate::backend::KubeBackend;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::loader::{ManifestLoader, ManifestSource};
use crate::reconciler::{ReconcileOptions, Reconciler};
use crate::report::ReconcileReport;

/// Applies and deletes manifests on the cluster selected by a [`ClientConfig`]
pub struct Client {
    reconciler: Reconciler<KubeBackend, ManifestLoader>,
}

impl Client {
    /// Connect with default options
    ///
    /// The default namespace comes from the config (or its context).
    pub async fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_options(config, ReconcileOptions::default()).await
    }

    /// Connect using `KAPPLY_CONTEXT` and `KAPPLY_KUBECONFIG`
    pub async fn from_env() -> Result<Self> {
        Self::new(&ClientConfig::from_env()).await
    }

    /// Connect with explicit options
    ///
    /// `options.default_namespace` is replaced by the namespace resolved
    /// from `config`.
    pub async fn with_options(config: &ClientConfig, mut options: ReconcileOptions) -> Result<Self> {
        let (client, namespace) = config.connect().await?;
        options.default_namespace = namespace;

        let backend = KubeBackend::new(client).with_field_manager(options.field_manager.clone());
        let reconciler = Reconciler::new(backend, ManifestLoader::new()?).with_options(options);
        Ok(Self { reconciler })
    }

    /// Stop in-flight work when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.reconciler = self.reconciler.with_cancellation(token);
        self
    }

    /// Apply manifest bytes (YAML or JSON, single, list or multi-document)
    pub async fn apply(&self, content: &[u8]) -> Result<ReconcileReport> {
        self.reconciler.apply_bytes(content).await
    }

    /// Delete everything described by manifest bytes
    pub async fn delete(&self, content: &[u8]) -> Result<ReconcileReport> {
        self.reconciler.delete_bytes(content).await
    }

    /// Apply files, directories or URLs in order
    pub async fn apply_files<S: AsRef<str>>(&self, sources: &[S]) -> Result<ReconcileReport> {
        self.reconciler.apply_sources(&parse_sources(sources)).await
    }

    /// Delete what files, directories or URLs describe
    pub async fn delete_files<S: AsRef<str>>(&self, sources: &[S]) -> Result<ReconcileReport> {
        self.reconciler.delete_sources(&parse_sources(sources)).await
    }

    /// Namespace given to documents that don't set one
    pub fn default_namespace(&self) -> &str {
        &self.reconciler.options().default_namespace
    }
}

fn parse_sources<S: AsRef<str>>(sources: &[S]) -> Vec<ManifestSource> {
    sources
        .iter()
        .map(|source| ManifestSource::parse(source.as_ref()))
        .collect()
}
