//! CLI error types with exit code handling

use kapply_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// A manifest could not be decoded
    #[error("Invalid manifest: {message}")]
    #[diagnostic(
        code(kapply::cli::manifest),
        help("every document needs apiVersion, kind and metadata.name")
    )]
    Manifest { message: String },

    /// Cluster unreachable or configuration unusable
    #[error("Cannot connect to cluster: {message}")]
    #[diagnostic(code(kapply::cli::connection))]
    Connection {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Some documents or sources failed
    #[error("Reconcile incomplete: {summary}")]
    #[diagnostic(code(kapply::cli::partial))]
    Partial {
        summary: String,
        #[help]
        cause: Option<String>,
    },

    /// Cancelled or timed out
    #[error("Interrupted: {message}")]
    #[diagnostic(code(kapply::cli::interrupted))]
    Interrupted { message: String },

    /// Anything else
    #[error("{message}")]
    #[diagnostic(code(kapply::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Manifest { .. } => exit_codes::MANIFEST_ERROR,
            CliError::Connection { .. } => exit_codes::CONNECTION_ERROR,
            CliError::Partial { .. } => exit_codes::PARTIAL_FAILURE,
            CliError::Interrupted { .. } => exit_codes::INTERRUPTED,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    fn connection(err: &KubeError) -> Self {
        CliError::Connection {
            message: err.to_string(),
            help: Some(
                "check --context and --kubeconfig (or KAPPLY_CONTEXT / KAPPLY_KUBECONFIG)"
                    .to_string(),
            ),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Decode(e) => CliError::Manifest {
                message: e.to_string(),
            },
            KubeError::PartialBatch { report, cause } => match cause.as_deref() {
                Some(cause) if matches!(cause, KubeError::Cancelled | KubeError::Timeout(_)) => {
                    CliError::Interrupted {
                        message: format!("{} ({})", cause, report.summary()),
                    }
                }
                Some(cause) if cause.is_connection() => CliError::connection(cause),
                cause => CliError::Partial {
                    summary: report.summary(),
                    cause: cause.map(|c| c.to_string()),
                },
            },
            KubeError::Kubeconfig(_)
            | KubeError::InferConfig(_)
            | KubeError::InvalidConfig(_) => CliError::connection(&err),
            ref e if e.is_connection() => CliError::connection(e),
            other => CliError::Other {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
