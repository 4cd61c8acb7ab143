//! InMemoryObjectStore - 開発・テスト用のオブジェクトストア
//!
//! # 学習ポイント
//! - std Mutex はロックを await をまたいで保持しない限り async でも使える
//! - BTreeMap なので list は常に辞書順（S3 / GCS と同じ並び）
//! - Clone は同じストアを共有する（Arc）

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::{Artifact, Provider, TransferError};
use crate::ports::{ClientFactory, ObjectClient};
use crate::transfer::local;

type Buckets = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// Buckets of objects kept in process memory.
///
/// # 使用例
/// ```ignore
/// let store = InMemoryObjectStore::new();
/// store.insert("bucket", "runs/42/a.txt", b"hello".to_vec());
/// let runtime = RuntimeBuilder::from_config(&config, Arc::new(store.clone())).build()?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    buckets: Arc<Mutex<Buckets>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Buckets> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put an object directly, bypassing the local filesystem.
    pub fn insert(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data);
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock().get(bucket)?.get(key).cloned()
    }

    /// All object names in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectClient for InMemoryObjectStore {
    fn provider(&self) -> Provider {
        Provider::S3
    }

    async fn put_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransferError> {
        let data = fs::read(path)
            .await
            .map_err(|e| TransferError::local_io(path, e))?;
        let len = data.len() as u64;
        self.insert(bucket, key, data);
        Ok(len)
    }

    async fn get_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransferError> {
        // ロックは await の前に手放す
        let data = self
            .get(bucket, key)
            .ok_or_else(|| TransferError::not_found(bucket, key))?;

        let mut file = local::create_destination(path).await?;
        file.write_all(&data)
            .await
            .map_err(|e| TransferError::local_io(path, e))?;
        file.flush()
            .await
            .map_err(|e| TransferError::local_io(path, e))?;
        Ok(data.len() as u64)
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> BoxStream<'a, Result<String, TransferError>> {
        // snapshot: 列挙中の put は見えない
        let names: Vec<String> = self
            .lock()
            .get(bucket)
            .map(|objects| {
                objects
                    .range(prefix.to_string()..)
                    .take_while(|(name, _)| name.starts_with(prefix))
                    // "runs/42/" のような directory marker は object ではない
                    .filter(|(name, _)| !name.ends_with('/'))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();
        stream::iter(names.into_iter().map(Ok)).boxed()
    }
}

/// Hands out the same store for every artifact, after the same credential
/// checks a real provider factory performs.
impl ClientFactory for InMemoryObjectStore {
    fn connect(&self, artifact: &Artifact) -> Result<Arc<dyn ObjectClient>, TransferError> {
        artifact.validate_credentials()?;
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::classify::{ObjectKind, classify};
    use futures::TryStreamExt;

    #[tokio::test]
    async fn lists_only_matching_names_in_order() {
        let store = InMemoryObjectStore::new();
        for key in ["runs/42/b", "runs/42/a", "runs/420", "runs/41", "other"] {
            store.insert("bucket", key, Vec::new());
        }
        store.insert("elsewhere", "runs/42/c", Vec::new());

        let names: Vec<String> = store.list_objects("bucket", "runs/42").try_collect().await.unwrap();
        assert_eq!(names, ["runs/42/a", "runs/42/b", "runs/420"]);
    }

    #[tokio::test]
    async fn directory_markers_are_not_listed() {
        let store = InMemoryObjectStore::new();
        store.insert("bucket", "runs/42/", Vec::new());
        store.insert("bucket", "runs/42/a", b"a".to_vec());
        store.insert("bucket", "runs/43/", Vec::new());

        let names: Vec<String> = store.list_objects("bucket", "runs/42/").try_collect().await.unwrap();
        assert_eq!(names, ["runs/42/a"]);
        assert_eq!(
            classify(&store, "bucket", "runs/42/").await.unwrap(),
            ObjectKind::Directory
        );
        assert_eq!(
            classify(&store, "bucket", "runs/43/").await.unwrap(),
            ObjectKind::Missing
        );
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryObjectStore::new();
        let err = store
            .get_object("bucket", "nope", &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::NotFound { .. }));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn clones_share_objects() {
        let store = InMemoryObjectStore::new();
        store.clone().insert("bucket", "k", b"v".to_vec());
        assert_eq!(store.get("bucket", "k").unwrap(), b"v");
    }
}
