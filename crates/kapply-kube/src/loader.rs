//! Manifest loading from inline bytes, local paths and URLs
//!
//! A directory path loads every `.yaml`, `.yml` and `.json` file directly
//! inside it, in file name order, as a single batch.

use async_trait::async_trait;
use kapply_core::{ResourceDocument, decode_documents, ensure_unique};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{KubeError, Result};

/// Timeout for fetching remote manifests
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Extensions picked up when a directory is given
const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Where manifest bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    /// Bytes already in memory
    Inline { name: String, content: Vec<u8> },
    /// A local file or directory
    Path(PathBuf),
    /// A remote manifest fetched over HTTP(S)
    Url(Url),
}

impl ManifestSource {
    /// Inline content, named `<inline>` in reports
    pub fn inline(content: impl Into<Vec<u8>>) -> Self {
        Self::Inline {
            name: "<inline>".to_string(),
            content: content.into(),
        }
    }

    /// Interpret a command-line style argument
    ///
    /// `http://` and `https://` arguments that parse as URLs become
    /// [`ManifestSource::Url`]; everything else is a path.
    pub fn parse(input: &str) -> Self {
        let is_remote = input.starts_with("http://") || input.starts_with("https://");
        match Url::parse(input) {
            Ok(url) if is_remote => Self::Url(url),
            _ => Self::Path(PathBuf::from(input)),
        }
    }
}

impl fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline { name, .. } => f.write_str(name),
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{}", url),
        }
    }
}

impl From<&str> for ManifestSource {
    fn from(input: &str) -> Self {
        Self::parse(input)
    }
}

/// Turns a source into documents
///
/// A loader must reject malformed input before the reconciler contacts any
/// backend.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(
        &self,
        source: &ManifestSource,
        default_namespace: &str,
    ) -> Result<Vec<ResourceDocument>>;
}

/// Default loader: local filesystem plus HTTP(S) through `reqwest`
#[derive(Clone)]
pub struct ManifestLoader {
    http: reqwest::Client,
}

impl ManifestLoader {
    /// Create a loader with its own HTTP client
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("kapply/", env!("CARGO_PKG_VERSION")))
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| KubeError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Create a loader around an existing HTTP client
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Read the raw bytes of a source, one entry per file
    pub async fn read(&self, source: &ManifestSource) -> Result<Vec<(String, Vec<u8>)>> {
        match source {
            ManifestSource::Inline { name, content } => Ok(vec![(name.clone(), content.clone())]),
            ManifestSource::Path(path) => read_path(path).await,
            ManifestSource::Url(url) => {
                let content = self.fetch(url).await?;
                Ok(vec![(url.to_string(), content)])
            }
        }
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let load_error = |message: String| KubeError::Load {
            source_name: url.to_string(),
            message,
        };

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| load_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(load_error(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| load_error(e.to_string()))?;
        debug!(%url, bytes = body.len(), "fetched remote manifest");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl DocumentLoader for ManifestLoader {
    #[instrument(skip(self, source), fields(source = %source))]
    async fn load(
        &self,
        source: &ManifestSource,
        default_namespace: &str,
    ) -> Result<Vec<ResourceDocument>> {
        let mut documents = Vec::new();
        for (name, content) in self.read(source).await? {
            let decoded = decode_documents(&content, default_namespace)?;
            debug!(file = %name, documents = decoded.len(), "decoded manifest");
            documents.extend(decoded);
        }
        ensure_unique(&documents)?;
        Ok(documents)
    }
}

async fn read_path(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let load_error = |e: std::io::Error| KubeError::Load {
        source_name: path.display().to_string(),
        message: e.to_string(),
    };

    let metadata = tokio::fs::metadata(path).await.map_err(load_error)?;
    if !metadata.is_dir() {
        let content = tokio::fs::read(path).await.map_err(load_error)?;
        return Ok(vec![(path.display().to_string(), content)]);
    }

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(path).await.map_err(load_error)?;
    while let Some(entry) = entries.next_entry().await.map_err(load_error)? {
        let file = entry.path();
        if entry.file_type().await.map_err(load_error)?.is_file() && is_manifest_file(&file) {
            files.push(file);
        }
    }
    files.sort();

    let mut contents = Vec::with_capacity(files.len());
    for file in files {
        let content = tokio::fs::read(&file).await.map_err(load_error)?;
        contents.push((file.display().to_string(), content));
    }
    Ok(contents)
}

fn is_manifest_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        assert!(matches!(
            ManifestSource::parse("https://example.com/cm.yaml"),
            ManifestSource::Url(_)
        ));
        assert!(matches!(
            ManifestSource::parse("./testdata/cm.yaml"),
            ManifestSource::Path(_)
        ));
        // Not a remote scheme
        assert!(matches!(
            ManifestSource::parse("C:/manifests/cm.yaml"),
            ManifestSource::Path(_)
        ));
    }

    #[test]
    fn test_source_display() {
        assert_eq!(ManifestSource::inline("x").to_string(), "<inline>");
        assert_eq!(ManifestSource::parse("dir/cm.yaml").to_string(), "dir/cm.yaml");
        assert_eq!(
            ManifestSource::parse("https://example.com/a.yaml").to_string(),
            "https://example.com/a.yaml"
        );
    }

    #[test]
    fn test_is_manifest_file() {
        assert!(is_manifest_file(Path::new("a.yaml")));
        assert!(is_manifest_file(Path::new("a.yml")));
        assert!(is_manifest_file(Path::new("a.json")));
        assert!(!is_manifest_file(Path::new("README.md")));
        assert!(!is_manifest_file(Path::new("Makefile")));
    }

    #[tokio::test]
    async fn test_load_inline() {
        let loader = ManifestLoader::new().unwrap();
        let source = ManifestSource::inline(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n".as_bytes(),
        );

        let docs = loader.load(&source, "default").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].namespace(), Some("default"));
    }
}
