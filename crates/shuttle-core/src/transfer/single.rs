//! Single-object transfers. These bypass the bulk pipeline.

use std::path::Path;

use tokio::fs;
use tracing::debug;

use crate::domain::TransferError;
use crate::observability::TransferCounts;
use crate::ports::ObjectClient;

/// Upload one regular file to `key`.
///
/// A directory at `path` fails with [`TransferError::LocalPathIsDirectory`]
/// before the client is touched.
pub async fn put_file(
    client: &dyn ObjectClient,
    bucket: &str,
    key: &str,
    path: &Path,
) -> Result<TransferCounts, TransferError> {
    let meta = fs::metadata(path)
        .await
        .map_err(|e| TransferError::local_io(path, e))?;
    if meta.is_dir() {
        return Err(TransferError::LocalPathIsDirectory(path.to_path_buf()));
    }

    let bytes = client.put_object(bucket, key, path).await?;
    debug!(bucket, key, bytes, "uploaded object");
    Ok(TransferCounts::single(bytes))
}

/// Download `key` into the file at `path`.
///
/// An existing directory at `path` fails with
/// [`TransferError::LocalPathIsDirectory`] before the client is touched.
pub async fn get_file(
    client: &dyn ObjectClient,
    bucket: &str,
    key: &str,
    path: &Path,
) -> Result<TransferCounts, TransferError> {
    super::local::reject_directory(path).await?;

    let bytes = client.get_object(bucket, key, path).await?;
    debug!(bucket, key, bytes, "downloaded object");
    Ok(TransferCounts::single(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryObjectStore;
    use crate::testing::CountingClient;

    #[tokio::test]
    async fn file_round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        std::fs::write(&source, &content).unwrap();

        let store = InMemoryObjectStore::new();
        let up = put_file(&store, "bucket", "blobs/in.bin", &source).await.unwrap();
        assert_eq!(up, TransferCounts::single(10_000));

        let target = dir.path().join("out.bin");
        get_file(&store, "bucket", "blobs/in.bin", &target).await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), content);
    }

    #[tokio::test]
    async fn saving_a_directory_as_a_file_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let client = CountingClient::new(InMemoryObjectStore::new());

        let err = put_file(&client, "bucket", "k", dir.path()).await.unwrap_err();
        assert!(matches!(err, TransferError::LocalPathIsDirectory(_)));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn loading_a_file_into_a_directory_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryObjectStore::new();
        store.insert("bucket", "k", b"data".to_vec());
        let client = CountingClient::new(store);

        let err = get_file(&client, "bucket", "k", dir.path()).await.unwrap_err();
        assert!(matches!(err, TransferError::LocalPathIsDirectory(_)));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn get_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        std::fs::write(&target, "a much longer previous content").unwrap();

        let store = InMemoryObjectStore::new();
        store.insert("bucket", "k", b"short".to_vec());
        get_file(&store, "bucket", "k", &target).await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "short");
    }
}
