//! Idempotent apply and delete of resource documents
//!
//! `apply` creates missing objects, updates changed ones through a
//! three-way merge and leaves identical ones alone. `delete` removes objects
//! by identity and treats missing ones as already done. Both can be re-run
//! safely: the backend is the only state, so replaying a batch is the
//! recovery path after a partial failure.

use futures::StreamExt;
use kapply_core::{
    ResourceDocument, annotate_last_applied, changed_paths, decode_documents, ensure_unique,
    read_last_applied, three_way_merge,
};
use std::pin::pin;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, DeleteStatus};
use crate::error::{KubeError, Result};
use crate::loader::{DocumentLoader, ManifestSource};
use crate::report::{Outcome, ReconcileReport, ReconcileResult, SourceFailure};

/// Options shared by every batch a reconciler runs
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Namespace assigned to namespaced documents without one
    pub default_namespace: String,

    /// Maximum documents in flight at once (1 = sequential)
    pub concurrency: usize,

    /// Keep going after a document fails (connection errors still abort)
    pub continue_on_error: bool,

    /// Deadline for one batch
    pub timeout: Option<Duration>,

    /// Field manager recorded by backends that track one
    pub field_manager: String,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            default_namespace: kapply_core::DEFAULT_NAMESPACE.to_string(),
            concurrency: 1,
            continue_on_error: false,
            timeout: None,
            field_manager: crate::backend::DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Apply,
    Delete,
}

/// Drives documents to their declared state on a backend
pub struct Reconciler<B: Backend, L: DocumentLoader> {
    backend: B,
    loader: L,
    options: ReconcileOptions,
    cancel: CancellationToken,
}

impl<B: Backend, L: DocumentLoader> Reconciler<B, L> {
    /// Create a reconciler with default options
    pub fn new(backend: B, loader: L) -> Self {
        Self {
            backend,
            loader,
            options: ReconcileOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop in-flight and pending work when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Apply documents in order
    pub async fn apply(&self, documents: &[ResourceDocument]) -> Result<ReconcileReport> {
        self.run_batch(documents, Operation::Apply).await
    }

    /// Delete documents, in the same order `apply` would process them
    pub async fn delete(&self, documents: &[ResourceDocument]) -> Result<ReconcileReport> {
        self.run_batch(documents, Operation::Delete).await
    }

    /// Decode manifest bytes and apply them
    pub async fn apply_bytes(&self, content: &[u8]) -> Result<ReconcileReport> {
        let documents = decode_documents(content, &self.options.default_namespace)?;
        self.apply(&documents).await
    }

    /// Decode manifest bytes and delete what they describe
    pub async fn delete_bytes(&self, content: &[u8]) -> Result<ReconcileReport> {
        let documents = decode_documents(content, &self.options.default_namespace)?;
        self.delete(&documents).await
    }

    /// Load each source and apply its documents as one batch
    ///
    /// A source that fails to load is reported and skipped. A failed document
    /// stops the remaining sources unless `continue_on_error` is set; a fatal
    /// error (connection, cancellation, timeout) always does.
    pub async fn apply_sources(&self, sources: &[ManifestSource]) -> Result<ReconcileReport> {
        self.run_sources(sources, Operation::Apply).await
    }

    /// Load each source and delete its documents
    pub async fn delete_sources(&self, sources: &[ManifestSource]) -> Result<ReconcileReport> {
        self.run_sources(sources, Operation::Delete).await
    }

    async fn run_sources(
        &self,
        sources: &[ManifestSource],
        operation: Operation,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for source in sources {
            if self.cancel.is_cancelled() {
                return Err(partial(report, Some(KubeError::Cancelled)));
            }

            let documents = match self
                .loader
                .load(source, &self.options.default_namespace)
                .await
            {
                Ok(documents) => documents,
                Err(e) => {
                    warn!(%source, error = %e, "skipping manifest source");
                    report.source_failures.push(SourceFailure {
                        source: source.to_string(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match self.run_batch(&documents, operation).await {
                Ok(batch) => report.extend(batch),
                Err(KubeError::PartialBatch {
                    report: batch,
                    cause,
                }) => {
                    report.extend(*batch);
                    if let Some(cause) =
                        cause.filter(|c| c.is_fatal() || !self.options.continue_on_error)
                    {
                        return Err(partial(report, Some(*cause)));
                    }
                }
                Err(e) => return Err(e),
            }
        }

        if report.is_success() {
            Ok(report)
        } else {
            Err(partial(report, None))
        }
    }

    async fn run_batch(
        &self,
        documents: &[ResourceDocument],
        operation: Operation,
    ) -> Result<ReconcileReport> {
        ensure_unique(documents)?;

        let deadline = self.options.timeout.map(|timeout| Instant::now() + timeout);
        let mut report = ReconcileReport::default();
        let mut abort: Option<KubeError> = None;

        let mut results = pin!(
            futures::stream::iter(documents.iter().map(|doc| async move {
                let doc = match self.scoped(doc).await {
                    Ok(doc) => doc,
                    Err(e) => return (doc.identity().clone(), Err(e)),
                };
                let result = match operation {
                    Operation::Apply => self.apply_one(&doc).await,
                    Operation::Delete => self.delete_one(&doc).await,
                };
                (doc.identity().clone(), result)
            }))
            .buffered(self.options.concurrency.max(1))
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    abort = Some(KubeError::Cancelled);
                    break;
                }
                _ = wait_until(deadline) => {
                    abort = Some(KubeError::Timeout(self.options.timeout.unwrap_or_default()));
                    break;
                }
                next = results.next() => next,
            };

            let Some((identity, result)) = next else {
                break;
            };

            match result {
                Ok(outcome) => {
                    report.results.push(ReconcileResult::new(&identity, outcome));
                }
                Err(e) => {
                    warn!(resource = %identity, error = %e, "reconcile failed");
                    report.results.push(ReconcileResult::new(
                        &identity,
                        Outcome::Failed(e.to_string()),
                    ));
                    if e.is_fatal() || !self.options.continue_on_error {
                        abort = Some(e);
                        break;
                    }
                }
            }
        }

        info!(summary = %report.summary(), "batch finished");

        if abort.is_some() || !report.is_success() {
            return Err(partial(report, abort));
        }
        Ok(report)
    }

    /// Clear the namespace of cluster-scoped documents and default it on
    /// namespaced ones
    async fn scoped(&self, doc: &ResourceDocument) -> Result<ResourceDocument> {
        let doc = doc.clone();
        if !self.backend.is_namespaced(doc.key()).await? {
            return Ok(doc.with_namespace(None));
        }
        if doc.namespace().is_some() {
            return Ok(doc);
        }
        Ok(doc.with_namespace(Some(&self.options.default_namespace)))
    }

    #[instrument(skip(self, doc), fields(resource = %doc.identity()))]
    async fn apply_one(&self, doc: &ResourceDocument) -> Result<Outcome> {
        let desired = doc.with_object(annotate_last_applied(doc.object())?);

        match self.try_apply(&desired).await {
            Err(e) if e.is_conflict() => {
                debug!(error = %e, "conflict, retrying against the refreshed object");
                self.try_apply(&desired).await
            }
            other => other,
        }
    }

    async fn try_apply(&self, desired: &ResourceDocument) -> Result<Outcome> {
        let Some(live) = self.backend.get(desired.key()).await? else {
            self.backend.create(desired).await?;
            debug!("created");
            return Ok(Outcome::Created);
        };

        let last_applied = read_last_applied(live.object());
        let merged = three_way_merge(last_applied.as_ref(), desired.object(), live.object());
        if &merged == live.object() {
            debug!("unchanged");
            return Ok(Outcome::Unchanged);
        }

        debug!(changed = ?changed_paths(live.object(), &merged), "updating");
        self.backend.update(&live.with_object(merged)).await?;
        Ok(Outcome::Updated)
    }

    #[instrument(skip(self, doc), fields(resource = %doc.identity()))]
    async fn delete_one(&self, doc: &ResourceDocument) -> Result<Outcome> {
        match self.backend.delete(doc.key()).await? {
            DeleteStatus::Deleted => {
                debug!("deleted");
                Ok(Outcome::Deleted)
            }
            DeleteStatus::NotFound => {
                debug!("already absent");
                Ok(Outcome::AlreadyAbsent)
            }
        }
    }
}

fn partial(report: ReconcileReport, cause: Option<KubeError>) -> KubeError {
    KubeError::PartialBatch {
        report: Box::new(report),
        cause: cause.map(Box::new),
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
