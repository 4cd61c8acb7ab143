//! ArtifactDriver - Load / Save の入口
//!
//! # 設計原則
//! - 構造的なエラー（パス種別・認証情報）はネットワーク呼び出しの前に返す
//! - Load / Save 1 回分（分類 + 転送）を丸ごと backoff の中で実行する
//! - クライアントは呼び出しごとに ClientFactory から作る

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{Instrument, info, info_span};

use crate::config::ShuttleConfig;
use crate::domain::{Artifact, ArtifactLocation, ObjectRef, Provider, TransferError, TransferId};
use crate::observability::TransferCounts;
use crate::ports::{ClientFactory, ObjectClient};
use crate::transfer::backoff::{BackoffPolicy, Step, retry};
use crate::transfer::bulk::BulkTransfer;
use crate::transfer::classify::{ObjectKind, classify};
use crate::transfer::{local, single};

/// Moves one artifact between local disk and its storage.
#[async_trait]
pub trait ArtifactDriver: Send + Sync {
    /// Fetch `artifact` into `path`: a file for a single object, a directory
    /// for a prefix.
    async fn load(&self, artifact: &Artifact, path: &Path) -> Result<TransferCounts, TransferError>;

    /// Store the file or directory at `path` as `artifact`.
    async fn save(&self, path: &Path, artifact: &Artifact) -> Result<TransferCounts, TransferError>;
}

/// Driver for artifacts stored in an object store (S3, GCS).
pub struct ObjectStoreDriver {
    factory: Arc<dyn ClientFactory>,
    policy: BackoffPolicy,
    bulk: BulkTransfer,
    create_missing_parents: bool,
}

impl ObjectStoreDriver {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            policy: BackoffPolicy::default(),
            bulk: BulkTransfer::default(),
            create_missing_parents: false,
        }
    }

    pub fn from_config(
        cfg: &ShuttleConfig,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Self, TransferError> {
        Ok(Self::new(factory)
            .with_policy(cfg.backoff.to_policy()?)
            .with_bulk(cfg.transfer.bulk())
            .with_create_missing_parents(cfg.transfer.create_missing_parents))
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_bulk(mut self, bulk: BulkTransfer) -> Self {
        self.bulk = bulk;
        self
    }

    pub fn with_create_missing_parents(mut self, create: bool) -> Self {
        self.create_missing_parents = create;
        self
    }

    async fn load_once(
        &self,
        client: Arc<dyn ObjectClient>,
        object: ObjectRef<'_>,
        path: &Path,
    ) -> Result<TransferCounts, TransferError> {
        match classify(client.as_ref(), object.bucket, object.key).await? {
            ObjectKind::Missing => Err(TransferError::not_found(object.bucket, object.key)),
            ObjectKind::File => single::get_file(client.as_ref(), object.bucket, object.key, path).await,
            ObjectKind::Directory => {
                self.bulk
                    .load_directory(client, object.bucket, object.key, path)
                    .await
            }
        }
    }

    async fn save_once(
        &self,
        client: Arc<dyn ObjectClient>,
        object: ObjectRef<'_>,
        path: &Path,
        is_dir: bool,
    ) -> Result<TransferCounts, TransferError> {
        if is_dir {
            self.bulk
                .save_directory(client, object.bucket, object.key, path)
                .await
        } else {
            single::put_file(client.as_ref(), object.bucket, object.key, path).await
        }
    }
}

fn object_of(artifact: &Artifact) -> Result<ObjectRef<'_>, TransferError> {
    artifact.object().ok_or_else(|| TransferError::Unsupported {
        provider: artifact.provider(),
        operation: "object store transfer",
    })
}

#[async_trait]
impl ArtifactDriver for ObjectStoreDriver {
    async fn load(&self, artifact: &Artifact, path: &Path) -> Result<TransferCounts, TransferError> {
        let object = object_of(artifact)?;
        let span = info_span!(
            "load",
            transfer_id = %TransferId::generate(),
            provider = %object.provider,
            bucket = object.bucket,
            key = object.key,
            path = %path.display(),
        );

        async {
            let started = Instant::now();
            local::ensure_parent(path, self.create_missing_parents).await?;
            let client = self.factory.connect(artifact)?;

            let counts = retry(&self.policy, |_attempt| {
                let client = Arc::clone(&client);
                async move { Step::from_result(self.load_once(client, object, path).await) }
            })
            .await?;

            info!(
                objects = counts.objects,
                bytes = counts.bytes,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "load finished"
            );
            Ok::<_, TransferError>(counts)
        }
        .instrument(span)
        .await
    }

    async fn save(&self, path: &Path, artifact: &Artifact) -> Result<TransferCounts, TransferError> {
        let object = object_of(artifact)?;
        let span = info_span!(
            "save",
            transfer_id = %TransferId::generate(),
            provider = %object.provider,
            bucket = object.bucket,
            key = object.key,
            path = %path.display(),
        );

        async {
            let started = Instant::now();
            let meta = fs::metadata(path)
                .await
                .map_err(|e| TransferError::local_io(path, e))?;
            let is_dir = meta.is_dir();
            let client = self.factory.connect(artifact)?;

            let counts = retry(&self.policy, |_attempt| {
                let client = Arc::clone(&client);
                async move { Step::from_result(self.save_once(client, object, path, is_dir).await) }
            })
            .await?;

            info!(
                objects = counts.objects,
                bytes = counts.bytes,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "save finished"
            );
            Ok::<_, TransferError>(counts)
        }
        .instrument(span)
        .await
    }
}

/// Driver for inline artifacts. Load writes the data; Save is not possible.
#[derive(Debug, Clone, Default)]
pub struct RawDriver {
    create_missing_parents: bool,
}

impl RawDriver {
    pub fn new(create_missing_parents: bool) -> Self {
        Self {
            create_missing_parents,
        }
    }
}

#[async_trait]
impl ArtifactDriver for RawDriver {
    async fn load(&self, artifact: &Artifact, path: &Path) -> Result<TransferCounts, TransferError> {
        let ArtifactLocation::Raw(raw) = artifact.location() else {
            return Err(TransferError::Unsupported {
                provider: artifact.provider(),
                operation: "inline load",
            });
        };

        local::ensure_parent(path, self.create_missing_parents).await?;
        let mut file = local::create_destination(path).await?;
        file.write_all(raw.data.as_bytes())
            .await
            .map_err(|e| TransferError::local_io(path, e))?;
        file.flush()
            .await
            .map_err(|e| TransferError::local_io(path, e))?;

        info!(artifact = artifact.name(), path = %path.display(), bytes = raw.data.len(), "raw artifact written");
        Ok(TransferCounts::single(raw.data.len() as u64))
    }

    async fn save(&self, _path: &Path, _artifact: &Artifact) -> Result<TransferCounts, TransferError> {
        Err(TransferError::Unsupported {
            provider: Provider::Raw,
            operation: "save",
        })
    }
}
