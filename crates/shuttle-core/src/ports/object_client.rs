//! ObjectClient port - オブジェクトストレージの抽象化
//!
//! ObjectClient は provider（S3, GCS, ...）ごとの薄いアダプタです。
//! 上位層（bulk pipeline, driver）は provider を区別しません。
//!
//! # 実装
//! - `impls::OpendalClient`: S3 / GCS / memory（OpenDAL 経由）
//! - `impls::InMemoryObjectStore`: 開発・テスト用

use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::{Provider, TransferError};
use crate::transfer::classify::{ObjectKind, classify};

/// Uniform per-provider object store contract.
///
/// # Contract
/// - `put_object` overwrites an existing object.
/// - `get_object` creates or truncates the destination file and fails with
///   [`TransferError::LocalPathIsDirectory`] when the destination is a directory.
/// - `list_objects` is lazy, finite and restartable; ordering is provider-defined.
///
/// A client lives for one Load/Save call and keeps no state between calls
/// beyond its provider session.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Upload the local file at `path`. Returns the number of bytes written.
    async fn put_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransferError>;

    /// Download `key` into `path`. Returns the number of bytes read.
    async fn get_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransferError>;

    /// Names of all objects whose name starts with `prefix`. Directory
    /// markers (names ending in `/`) are not objects and never listed.
    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> BoxStream<'a, Result<String, TransferError>>;

    /// True unless an object named exactly `key` exists.
    async fn is_prefix(&self, bucket: &str, key: &str) -> Result<bool, TransferError> {
        let kind = classify(self, bucket, key).await?;
        Ok(kind != ObjectKind::File)
    }
}
