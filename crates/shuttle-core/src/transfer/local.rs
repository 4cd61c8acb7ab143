//! Local filesystem helpers shared by clients and the transfer pipeline.

use std::path::{Component, Path, PathBuf};

use tokio::fs;

use crate::domain::TransferError;

/// Open `path` for a download: created if absent, truncated if present.
///
/// Fails with [`TransferError::LocalPathIsDirectory`] when `path` is an
/// existing directory.
pub async fn create_destination(path: &Path) -> Result<fs::File, TransferError> {
    reject_directory(path).await?;
    fs::File::create(path)
        .await
        .map_err(|e| TransferError::local_io(path, e))
}

/// Fail when `path` exists and is a directory.
pub async fn reject_directory(path: &Path) -> Result<(), TransferError> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Err(TransferError::LocalPathIsDirectory(path.to_path_buf())),
        _ => Ok(()),
    }
}

/// Make sure the directory that will hold `path` exists.
///
/// With `create == false` a missing parent is an error rather than being
/// created silently.
pub async fn ensure_parent(path: &Path, create: bool) -> Result<(), TransferError> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    match fs::metadata(parent).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(TransferError::LocalPathIsFile(parent.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if create {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| TransferError::local_io(parent, e))
            } else {
                Err(TransferError::ParentMissing(parent.to_path_buf()))
            }
        }
        Err(e) => Err(TransferError::local_io(parent, e)),
    }
}

/// Join `relative` onto a key prefix with exactly one `/` between them.
pub fn join_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    match (prefix.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{relative}"),
    }
}

/// Turn the prefix of a key into a directory prefix (`runs/42` -> `runs/42/`).
pub fn directory_prefix(key: &str) -> String {
    if key.is_empty() || key.ends_with('/') {
        key.to_string()
    } else {
        format!("{key}/")
    }
}

/// Object key suffix for a path relative to the walked root. Always uses `/`.
pub fn relative_key(relative: &Path) -> Result<String, TransferError> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| TransferError::InvalidPath {
                    path: relative.to_string_lossy().into_owned(),
                    reason: "path is not valid UTF-8",
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(TransferError::InvalidPath {
                    path: relative.to_string_lossy().into_owned(),
                    reason: "path escapes the transfer root",
                });
            }
        }
    }
    Ok(parts.join("/"))
}

/// Local destination for a listed object, given its name relative to the
/// listed prefix.
///
/// Rejects names that would land outside `root`.
pub fn local_path_for(root: &Path, relative: &str) -> Result<PathBuf, TransferError> {
    let invalid = |reason| TransferError::InvalidPath {
        path: relative.to_string(),
        reason,
    };
    let mut path = root.to_path_buf();
    for segment in relative.split('/') {
        match segment {
            "" => return Err(invalid("empty path segment")),
            "." | ".." => return Err(invalid("relative path segment")),
            s if s.contains('\\') => return Err(invalid("backslash in path segment")),
            s => path.push(s),
        }
    }
    Ok(path)
}
