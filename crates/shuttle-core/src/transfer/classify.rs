//! Object path classifier: does a key name one object or a prefix?

use futures::TryStreamExt;

use crate::domain::TransferError;
use crate::ports::ObjectClient;

/// What a remote key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// An object named exactly like the key exists.
    File,

    /// Objects exist under the key, none of them named exactly like it.
    Directory,

    /// Nothing starts with the key.
    Missing,
}

/// Classify `key` by listing with `prefix = key` and looking at the first
/// result only.
///
/// This is a heuristic, not a metadata lookup. A key that is both an exact
/// object and a prefix of other objects is reported as [`ObjectKind::File`]
/// when the exact object lists first, which is the case for lexicographic
/// listings.
pub async fn classify<C>(client: &C, bucket: &str, key: &str) -> Result<ObjectKind, TransferError>
where
    C: ObjectClient + ?Sized,
{
    let mut listing = client.list_objects(bucket, key);
    let kind = match listing.try_next().await? {
        None => ObjectKind::Missing,
        Some(name) if name == key => ObjectKind::File,
        Some(_) => ObjectKind::Directory,
    };
    Ok(kind)
}
