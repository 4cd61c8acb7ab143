//! OpendalClient - OpenDAL 経由の S3 / GCS クライアント
//!
//! One `Operator` per bucket, built lazily and cached for the lifetime of the
//! client (one Load/Save). No `RetryLayer`: retries belong to the backoff
//! executor wrapping the whole call.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use opendal::layers::TimeoutLayer;
use opendal::{ErrorKind, Operator};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::config::{GcsConfig, S3Config};
use crate::domain::{
    Artifact, ArtifactLocation, GcsCredentials, Provider, S3Credentials, TransferError,
};
use crate::ports::{ClientFactory, ObjectClient};
use crate::transfer::local;

/// Read/write granularity for streaming transfers.
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Clone)]
enum Backend {
    S3 {
        endpoint: Option<String>,
        region: String,
        virtual_host_style: bool,
        credentials: S3Credentials,
        timeouts: Timeouts,
    },
    Gcs {
        endpoint: Option<String>,
        /// Service account key, base64 encoded the way OpenDAL expects it.
        credential: String,
        timeouts: Timeouts,
    },
    /// Process-local service; buckets become root directories.
    Memory,
}

#[derive(Debug, Clone, Copy, Default)]
struct Timeouts {
    timeout_ms: Option<u64>,
    io_timeout_ms: Option<u64>,
}

impl Timeouts {
    fn layer(&self) -> Option<TimeoutLayer> {
        if self.timeout_ms.is_none() && self.io_timeout_ms.is_none() {
            return None;
        }
        let mut layer = TimeoutLayer::new();
        if let Some(ms) = self.timeout_ms.filter(|v| *v > 0) {
            layer = layer.with_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.io_timeout_ms.filter(|v| *v > 0) {
            layer = layer.with_io_timeout(Duration::from_millis(ms));
        }
        Some(layer)
    }
}

/// [`ObjectClient`] backed by an OpenDAL operator.
pub struct OpendalClient {
    provider: Provider,
    backend: Backend,
    operators: Mutex<HashMap<String, Operator>>,
}

impl OpendalClient {
    fn with_backend(provider: Provider, backend: Backend) -> Self {
        Self {
            provider,
            backend,
            operators: Mutex::new(HashMap::new()),
        }
    }

    /// S3 (or an S3-compatible endpoint). Descriptor values override `cfg`.
    pub fn s3(
        cfg: &S3Config,
        endpoint: Option<&str>,
        region: Option<&str>,
        credentials: &S3Credentials,
    ) -> Self {
        Self::with_backend(
            Provider::S3,
            Backend::S3 {
                endpoint: endpoint.map(str::to_string).or_else(|| cfg.endpoint.clone()),
                region: region.map_or_else(|| cfg.region.clone(), str::to_string),
                virtual_host_style: cfg.virtual_host_style,
                credentials: credentials.clone(),
                timeouts: Timeouts {
                    timeout_ms: cfg.timeout_ms,
                    io_timeout_ms: cfg.io_timeout_ms,
                },
            },
        )
    }

    pub fn gcs(cfg: &GcsConfig, credentials: &GcsCredentials) -> Self {
        Self::with_backend(
            Provider::Gcs,
            Backend::Gcs {
                endpoint: cfg.endpoint.clone(),
                credential: STANDARD.encode(credentials.service_account_key.expose()),
                timeouts: Timeouts {
                    timeout_ms: cfg.timeout_ms,
                    io_timeout_ms: cfg.io_timeout_ms,
                },
            },
        )
    }

    /// OpenDAL's in-memory service, reporting itself as `provider`.
    pub fn memory(provider: Provider) -> Self {
        Self::with_backend(provider, Backend::Memory)
    }

    fn operator(&self, bucket: &str) -> Result<Operator, TransferError> {
        let mut operators = self.operators.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(op) = operators.get(bucket) {
            return Ok(op.clone());
        }
        let op = self.build_operator(bucket)?;
        operators.insert(bucket.to_string(), op.clone());
        Ok(op)
    }

    fn build_operator(&self, bucket: &str) -> Result<Operator, TransferError> {
        let init_error = |e: opendal::Error| {
            TransferError::Config(format!("init {} operator for bucket {bucket}: {e}", self.provider))
        };
        let (op, timeouts) = match &self.backend {
            Backend::S3 {
                endpoint,
                region,
                virtual_host_style,
                credentials,
                timeouts,
            } => {
                let mut builder = opendal::services::S3::default()
                    .bucket(bucket)
                    .region(region)
                    .access_key_id(&credentials.access_key_id)
                    .secret_access_key(credentials.secret_access_key.expose())
                    .disable_config_load();
                if let Some(endpoint) = endpoint {
                    builder = builder.endpoint(endpoint);
                }
                if let Some(token) = &credentials.session_token {
                    builder = builder.session_token(token.expose());
                }
                if *virtual_host_style {
                    builder = builder.enable_virtual_host_style();
                }
                (Operator::new(builder).map_err(init_error)?.finish(), *timeouts)
            }
            Backend::Gcs {
                endpoint,
                credential,
                timeouts,
            } => {
                let mut builder = opendal::services::Gcs::default()
                    .bucket(bucket)
                    .credential(credential);
                if let Some(endpoint) = endpoint {
                    builder = builder.endpoint(endpoint);
                }
                (Operator::new(builder).map_err(init_error)?.finish(), *timeouts)
            }
            Backend::Memory => {
                let builder = opendal::services::Memory::default().root(&format!("/{bucket}"));
                (Operator::new(builder).map_err(init_error)?.finish(), Timeouts::default())
            }
        };

        debug!(provider = %self.provider, bucket, "built opendal operator");
        Ok(match timeouts.layer() {
            Some(layer) => op.layer(layer),
            None => op,
        })
    }

    fn map_error(&self, err: opendal::Error, bucket: &str, key: &str) -> TransferError {
        match err.kind() {
            ErrorKind::NotFound => TransferError::not_found(bucket, key),
            ErrorKind::PermissionDenied => TransferError::CredentialsInvalid {
                provider: self.provider,
                reason: err.to_string(),
            },
            ErrorKind::ConfigInvalid => TransferError::Config(err.to_string()),
            _ => TransferError::transient_with(format!("{} request failed for {bucket}/{key}", self.provider), err),
        }
    }
}

#[async_trait]
impl ObjectClient for OpendalClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn put_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransferError> {
        let op = self.operator(bucket)?;
        let mut file = fs::File::open(path)
            .await
            .map_err(|e| TransferError::local_io(path, e))?;
        let mut writer = op
            .writer(key)
            .await
            .map_err(|e| self.map_error(e, bucket, key))?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = match file.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(TransferError::local_io(path, e));
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.write(buf[..n].to_vec()).await {
                let _ = writer.abort().await;
                return Err(self.map_error(e, bucket, key));
            }
            total += n as u64;
        }
        writer
            .close()
            .await
            .map_err(|e| self.map_error(e, bucket, key))?;
        Ok(total)
    }

    async fn get_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransferError> {
        let op = self.operator(bucket)?;
        // stat first: a missing object must not leave an empty file behind
        let meta = op
            .stat(key)
            .await
            .map_err(|e| self.map_error(e, bucket, key))?;
        if meta.is_dir() {
            return Err(TransferError::not_found(bucket, key));
        }
        let len = meta.content_length();

        let mut file = local::create_destination(path).await?;
        let mut offset = 0u64;
        while offset < len {
            let end = (offset + CHUNK_SIZE as u64).min(len);
            let chunk = op
                .read_with(key)
                .range(offset..end)
                .await
                .map_err(|e| self.map_error(e, bucket, key))?;
            file.write_all(&chunk.to_bytes())
                .await
                .map_err(|e| TransferError::local_io(path, e))?;
            offset = end;
        }
        file.flush()
            .await
            .map_err(|e| TransferError::local_io(path, e))?;
        Ok(len)
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> BoxStream<'a, Result<String, TransferError>> {
        // OpenDAL lists directories; list the prefix's parent and filter.
        // For "runs/42" that walks all of "runs/", and a root-level key walks
        // the whole bucket, so even classify's first-result lookup pays for
        // every earlier name under the parent. Keys ending in "/" list only
        // their own subtree.
        let parent = match prefix.rfind('/') {
            Some(i) => prefix[..=i].to_string(),
            None => "/".to_string(),
        };
        let open = async move {
            let op = self.operator(bucket)?;
            op.lister_with(&parent)
                .recursive(true)
                .await
                .map_err(|e| self.map_error(e, bucket, &parent))
        };

        stream::once(open)
            .map_ok(move |lister| lister.map_err(move |e| self.map_error(e, bucket, prefix)))
            .try_flatten()
            .try_filter_map(move |entry| async move {
                let name = entry.path();
                let keep = !entry.metadata().is_dir() && name.starts_with(prefix);
                Ok(keep.then(|| name.to_string()))
            })
            .boxed()
    }
}

/// Builds an [`OpendalClient`] per Load/Save from provider-wide settings and
/// the descriptor's credentials.
#[derive(Debug, Clone, Default)]
pub struct OpendalClientFactory {
    s3: S3Config,
    gcs: GcsConfig,
}

impl OpendalClientFactory {
    pub fn new(s3: S3Config, gcs: GcsConfig) -> Self {
        Self { s3, gcs }
    }
}

impl ClientFactory for OpendalClientFactory {
    fn connect(&self, artifact: &Artifact) -> Result<Arc<dyn ObjectClient>, TransferError> {
        artifact.validate_credentials()?;
        let client = match artifact.location() {
            ArtifactLocation::S3(loc) => OpendalClient::s3(
                &self.s3,
                loc.endpoint.as_deref(),
                loc.region.as_deref(),
                &loc.credentials,
            ),
            ArtifactLocation::Gcs(loc) => OpendalClient::gcs(&self.gcs, &loc.credentials),
            ArtifactLocation::Raw(_) => {
                return Err(TransferError::Unsupported {
                    provider: Provider::Raw,
                    operation: "object storage access",
                });
            }
        };
        Ok(Arc::new(client))
    }
}
