//! Cluster connection settings
//!
//! Every field is optional. Unset values fall back to the ambient kube
//! configuration: `KUBECONFIG`, then `~/.kube/config`, then the in-cluster
//! service account.

use kube::config::{KubeConfigOptions, Kubeconfig};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{KubeError, Result};

/// Environment variable selecting the kube context
pub const CONTEXT_ENV_VAR: &str = "KAPPLY_CONTEXT";

/// Environment variable pointing at a kubeconfig file
pub const KUBECONFIG_ENV_VAR: &str = "KAPPLY_KUBECONFIG";

/// Which cluster to talk to, and as whom
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Context name inside the kubeconfig
    pub context: Option<String>,
    /// Explicit kubeconfig file
    pub kubeconfig: Option<PathBuf>,
    /// Default namespace, overriding the one set on the context
    pub namespace: Option<String>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `KAPPLY_CONTEXT` and `KAPPLY_KUBECONFIG`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());
        Self {
            context: var(CONTEXT_ENV_VAR),
            kubeconfig: var(KUBECONFIG_ENV_VAR).map(PathBuf::from),
            namespace: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_kubeconfig(mut self, path: impl AsRef<Path>) -> Self {
        self.kubeconfig = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Resolve into a `kube::Config` without contacting the cluster
    pub async fn to_kube_config(&self) -> Result<kube::Config> {
        let options = KubeConfigOptions {
            context: self.context.clone(),
            ..Default::default()
        };

        let mut config = match (&self.kubeconfig, &self.context) {
            (Some(path), _) => {
                let kubeconfig = Kubeconfig::read_from(path)?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?
            }
            (None, Some(_)) => kube::Config::from_kubeconfig(&options).await?,
            (None, None) => kube::Config::infer().await?,
        };

        if let Some(namespace) = &self.namespace {
            if namespace.is_empty() {
                return Err(KubeError::InvalidConfig(
                    "namespace must not be empty".to_string(),
                ));
            }
            config.default_namespace = namespace.clone();
        }

        debug!(
            cluster = %config.cluster_url,
            namespace = %config.default_namespace,
            context = self.context.as_deref().unwrap_or("<current>"),
            "resolved cluster configuration"
        );
        Ok(config)
    }

    /// Build a client and return it with its default namespace
    pub async fn connect(&self) -> Result<(kube::Client, String)> {
        let config = self.to_kube_config().await?;
        let namespace = config.default_namespace.clone();
        let client = kube::Client::try_from(config)?;
        Ok((client, namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: ctx-b
clusters:
  - name: local
    cluster:
      server: https://127.0.0.1:6443
      insecure-skip-tls-verify: true
contexts:
  - name: ctx-a
    context:
      cluster: local
      user: tester
      namespace: team-a
  - name: ctx-b
    context:
      cluster: local
      user: tester
users:
  - name: tester
    user:
      token: not-a-real-token
"#;

    fn kubeconfig_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(KUBECONFIG.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (CONTEXT_ENV_VAR, "ctx-a"),
            (KUBECONFIG_ENV_VAR, "/tmp/kubeconfig"),
        ]
        .into_iter()
        .collect();

        let config = ClientConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.context.as_deref(), Some("ctx-a"));
        assert_eq!(config.kubeconfig, Some(PathBuf::from("/tmp/kubeconfig")));
        assert_eq!(config.namespace, None);
    }

    #[test]
    fn test_from_lookup_ignores_empty() {
        let config = ClientConfig::from_lookup(|_| Some(String::new()));
        assert_eq!(config, ClientConfig::default());
    }

    #[tokio::test]
    async fn test_context_namespace() {
        let file = kubeconfig_file();
        let config = ClientConfig::new()
            .with_kubeconfig(file.path())
            .with_context("ctx-a")
            .to_kube_config()
            .await
            .unwrap();

        assert_eq!(config.default_namespace, "team-a");
        assert_eq!(config.cluster_url.host(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_current_context_and_namespace_override() {
        let file = kubeconfig_file();

        let config = ClientConfig::new()
            .with_kubeconfig(file.path())
            .to_kube_config()
            .await
            .unwrap();
        assert_eq!(config.default_namespace, "default");

        let config = ClientConfig::new()
            .with_kubeconfig(file.path())
            .with_context("ctx-a")
            .with_namespace("override")
            .to_kube_config()
            .await
            .unwrap();
        assert_eq!(config.default_namespace, "override");
    }

    #[tokio::test]
    async fn test_unknown_context() {
        let file = kubeconfig_file();
        let err = ClientConfig::new()
            .with_kubeconfig(file.path())
            .with_context("missing")
            .to_kube_config()
            .await
            .unwrap_err();

        assert!(matches!(err, KubeError::Kubeconfig(_)));
    }

    #[tokio::test]
    async fn test_missing_kubeconfig_file() {
        let err = ClientConfig::new()
            .with_kubeconfig("/nonexistent/kubeconfig")
            .to_kube_config()
            .await
            .unwrap_err();

        assert!(matches!(err, KubeError::Kubeconfig(_)));
    }
}
