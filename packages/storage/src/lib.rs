//! Artifact storage for generated documents.
//!
//! Artifacts are written under `{prefix}/{scope}/{name}` and addressed by a
//! public URL. Backends:
//! - S3-compatible storage in production/staging
//! - On-disk storage for local dev
//! - In-memory storage for tests
//!
//! All three come from `object_store`; this crate only adds key layout,
//! public URL construction and environment configuration.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub allow_http: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    S3(S3Config),
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied to all artifact keys.
    pub prefix: Option<String>,
    /// Base URL artifacts are served from; overrides the backend default.
    pub public_base_url: Option<String>,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendConfig::Memory,
            prefix: None,
            public_base_url: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendConfig::Filesystem { root: root.into() },
            ..Self::memory()
        }
    }

    pub fn s3(cfg: S3Config) -> Self {
        Self {
            backend: StorageBackendConfig::S3(cfg),
            ..Self::memory()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    /// Build a config from environment variables.
    ///
    /// - `ARTIFACT_BACKEND`: `s3`, `filesystem` or `memory` (default: filesystem)
    /// - `ARTIFACT_FS_ROOT` (default: `./data/artifacts`)
    /// - `ARTIFACT_PREFIX` (optional)
    /// - `ARTIFACT_PUBLIC_URL` (optional base URL for public references)
    ///
    /// S3: `S3_BUCKET` (required), `AWS_REGION` (default `us-east-1`),
    /// `S3_ENDPOINT`, `S3_ALLOW_HTTP`, `AWS_ACCESS_KEY_ID`,
    /// `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self, StorageError> {
        let cfg = match env_var("ARTIFACT_BACKEND").as_deref() {
            Some("s3") => Self::s3(read_s3_config()?),
            Some("memory") | Some("mem") => Self::memory(),
            Some("filesystem") | Some("fs") | None => {
                let root = env_var("ARTIFACT_FS_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./data/artifacts"));
                Self::filesystem(root)
            }
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported ARTIFACT_BACKEND={other} (expected s3|filesystem|memory)"
                )));
            }
        };

        Ok(Self {
            prefix: env_var("ARTIFACT_PREFIX"),
            public_base_url: env_var("ARTIFACT_PUBLIC_URL"),
            ..cfg
        })
    }
}

/// Where an artifact was written and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub key: String,
    pub url: String,
}

#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
    public_base: String,
}

impl Storage {
    pub async fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (store, default_base): (Arc<dyn ObjectStore>, String) = match cfg.backend {
            StorageBackendConfig::S3(s3) => {
                let base = s3_public_base(&s3);
                (Arc::new(build_s3(s3)?), base)
            }
            StorageBackendConfig::Filesystem { root } => {
                std::fs::create_dir_all(&root)?;
                let root = root.canonicalize()?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                (Arc::new(fs), format!("file://{}", root.display()))
            }
            StorageBackendConfig::Memory => (
                Arc::new(object_store::memory::InMemory::new()),
                "memory://artifacts".to_string(),
            ),
        };

        let public_base = cfg
            .public_base_url
            .and_then(non_empty)
            .unwrap_or(default_base);

        Ok(Self {
            store,
            prefix: cfg.prefix.and_then(non_empty),
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?).await
    }

    /// Object key for an artifact `name` within `scope`.
    pub fn artifact_key(&self, name: &str, scope: &str) -> Result<String, StorageError> {
        let name = name.trim_matches('/');
        if name.is_empty() || name.contains('/') {
            return Err(StorageError::InvalidKey(format!(
                "artifact name must be a single non-empty segment: {name:?}"
            )));
        }

        let mut segments = Vec::new();
        if let Some(prefix) = self.prefix.as_deref() {
            segments.push(prefix.trim_matches('/'));
        }
        segments.push(scope.trim_matches('/'));
        segments.push(name);

        Ok(segments
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/"))
    }

    /// Public URL under which `key` is served.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    /// Write an artifact and return its key and public URL.
    pub async fn write_artifact(
        &self,
        bytes: Bytes,
        name: &str,
        scope: &str,
    ) -> Result<StoredArtifact, StorageError> {
        let key = self.artifact_key(name, scope)?;
        let size = bytes.len();
        self.store
            .put(&Path::from(key.as_str()), object_store::PutPayload::from(bytes))
            .await?;

        tracing::debug!("Wrote artifact {} ({} bytes)", key, size);

        Ok(StoredArtifact {
            url: self.public_url(&key),
            key,
        })
    }

    /// Read an artifact back by key.
    pub async fn read_artifact(&self, key: &str) -> Result<Bytes, StorageError> {
        let res = self.store.get(&Path::from(key)).await?;
        Ok(res.bytes().await?)
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(non_empty)
}

fn parse_bool(var_name: &str, value: &str) -> Result<bool, StorageError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(true),
        "0" | "false" | "no" | "n" => Ok(false),
        _ => Err(StorageError::InvalidConfig(format!(
            "invalid boolean for {var_name}={value} (expected true/false)"
        ))),
    }
}

fn read_s3_config() -> Result<S3Config, StorageError> {
    let bucket = env_var("S3_BUCKET").ok_or_else(|| {
        StorageError::InvalidConfig("S3_BUCKET is required for s3 backend".into())
    })?;
    let endpoint = env_var("S3_ENDPOINT");

    let allow_http = match env_var("S3_ALLOW_HTTP") {
        Some(v) => parse_bool("S3_ALLOW_HTTP", &v)?,
        None => endpoint
            .as_deref()
            .is_some_and(|e| e.to_ascii_lowercase().starts_with("http://")),
    };

    Ok(S3Config {
        bucket,
        region: env_var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        endpoint,
        allow_http,
        access_key_id: env_var("AWS_ACCESS_KEY_ID"),
        secret_access_key: env_var("AWS_SECRET_ACCESS_KEY"),
        session_token: env_var("AWS_SESSION_TOKEN"),
    })
}

fn s3_public_base(cfg: &S3Config) -> String {
    match cfg.endpoint.as_deref() {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), cfg.bucket),
        None => format!("https://{}.s3.{}.amazonaws.com", cfg.bucket, cfg.region),
    }
}

fn build_s3(cfg: S3Config) -> Result<object_store::aws::AmazonS3, StorageError> {
    let mut builder = object_store::aws::AmazonS3Builder::new()
        .with_bucket_name(cfg.bucket)
        .with_region(cfg.region)
        .with_allow_http(cfg.allow_http);

    if let Some(endpoint) = cfg.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if let Some(access_key_id) = cfg.access_key_id {
        builder = builder.with_access_key_id(access_key_id);
    }
    if let Some(secret_access_key) = cfg.secret_access_key {
        builder = builder.with_secret_access_key(secret_access_key);
    }
    if let Some(session_token) = cfg.session_token {
        builder = builder.with_token(session_token);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[tokio::test]
    async fn memory_artifact_gets_scoped_key_and_url() -> Result<(), StorageError> {
        let storage = Storage::new(
            StorageConfig::memory()
                .with_prefix("docs/")
                .with_public_base_url("https://cdn.example.com/"),
        )
        .await?;

        let stored = storage
            .write_artifact(Bytes::from("# hi"), "synthesis.md", "p1")
            .await?;
        assert_eq!(stored.key, "docs/p1/synthesis.md");
        assert_eq!(stored.url, "https://cdn.example.com/docs/p1/synthesis.md");

        let got = storage.read_artifact(&stored.key).await?;
        assert_eq!(got, Bytes::from("# hi"));
        Ok(())
    }

    #[tokio::test]
    async fn filesystem_artifact_is_addressed_by_file_url() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::new(StorageConfig::filesystem(dir.path())).await?;

        let stored = storage
            .write_artifact(Bytes::from("body"), "derivation.md", "p2")
            .await?;
        assert!(stored.url.starts_with("file://"));
        assert!(stored.url.ends_with("/p2/derivation.md"));
        assert!(dir.path().join("p2").join("derivation.md").exists());
        Ok(())
    }

    #[tokio::test]
    async fn nested_names_are_rejected() -> Result<(), StorageError> {
        let storage = Storage::new(StorageConfig::memory()).await?;
        let err = storage.artifact_key("a/b.md", "p1");
        assert!(matches!(err, Err(StorageError::InvalidKey(_))));
        assert!(storage.artifact_key("", "p1").is_err());
        Ok(())
    }

    #[test]
    fn s3_public_base_prefers_custom_endpoint() {
        let mut cfg = S3Config {
            bucket: "art".into(),
            region: "eu-west-1".into(),
            endpoint: None,
            allow_http: false,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
        };
        assert_eq!(s3_public_base(&cfg), "https://art.s3.eu-west-1.amazonaws.com");

        cfg.endpoint = Some("http://localhost:9000/".into());
        assert_eq!(s3_public_base(&cfg), "http://localhost:9000/art");
    }
}
