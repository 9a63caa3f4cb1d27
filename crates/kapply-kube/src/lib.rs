//! kapply kube - apply and delete manifests against Kubernetes
//!
//! This crate provides:
//! - **Backends**: the [`Backend`] capability set, with a live cluster
//!   implementation over `kube` and an in-memory one for tests
//! - **Loader**: manifests from inline bytes, files, directories and URLs
//! - **Reconciler**: idempotent apply (create, three-way merge update, no-op)
//!   and delete, sequential or with bounded concurrency
//! - **Client**: connection settings plus the above behind a few calls
//!
//! ```no_run
//! # async fn run() -> kapply_kube::Result<()> {
//! use kapply_kube::{Client, ClientConfig};
//!
//! let client = Client::new(&ClientConfig::new().with_context("kind-dev")).await?;
//! let report = client.apply_files(&["manifests/"]).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod loader;
pub mod reconciler;
pub mod report;

pub use backend::{
    Backend, DEFAULT_FIELD_MANAGER, DeleteStatus, KubeBackend, MemoryBackend, OperationCounts,
};
pub use client::Client;
pub use config::{CONTEXT_ENV_VAR, ClientConfig, KUBECONFIG_ENV_VAR};
pub use error::{KubeError, Result};
pub use loader::{DocumentLoader, ManifestLoader, ManifestSource};
pub use reconciler::{ReconcileOptions, Reconciler};
pub use report::{Outcome, ReconcileReport, ReconcileResult, SourceFailure};
