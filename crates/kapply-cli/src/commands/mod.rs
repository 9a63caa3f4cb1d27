//! CLI commands

pub mod apply;
pub mod delete;

use clap::{Args, ValueEnum};
use kapply_kube::{Client, ClientConfig, ReconcileOptions};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per resource
    Text,
    /// The full report as JSON
    Json,
}

/// Arguments shared by `apply` and `delete`
#[derive(Debug, Args)]
pub struct ManifestArgs {
    /// Manifest file, directory or http(s) URL (repeatable)
    #[arg(short = 'f', long = "filename", required = true)]
    pub files: Vec<String>,

    /// Kube context to use
    #[arg(long, env = kapply_kube::CONTEXT_ENV_VAR)]
    pub context: Option<String>,

    /// Path to the kubeconfig file
    #[arg(long, env = kapply_kube::KUBECONFIG_ENV_VAR)]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace for documents that don't set one
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Documents processed at once
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: u16,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Keep going after a resource fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

impl ManifestArgs {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            context: self.context.clone(),
            kubeconfig: self.kubeconfig.clone(),
            namespace: self.namespace.clone(),
        }
    }

    fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            concurrency: usize::from(self.concurrency),
            continue_on_error: self.continue_on_error,
            timeout: self.timeout.map(Duration::from_secs),
            ..Default::default()
        }
    }

    /// Connect, with Ctrl-C wired to cancellation
    pub async fn connect(&self) -> Result<Client> {
        let client = Client::with_options(&self.client_config(), self.options()).await?;
        debug!(namespace = client.default_namespace(), "connected");

        let token = CancellationToken::new();
        let on_signal = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });

        Ok(client.with_cancellation(token))
    }
}
