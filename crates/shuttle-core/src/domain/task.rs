//! Transfer task: one object moving between local disk and a bucket.

use std::path::{Path, PathBuf};

/// One unit of work inside a bulk transfer.
///
/// Design:
/// - Created by the directory walker (save) or the listing producer (load).
/// - Consumed exactly once by a worker, then dropped.
/// - Carries no retry state; retries wrap the whole Load/Save instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    key: String,
    local_path: PathBuf,
}

impl TransferTask {
    pub fn new(key: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            local_path: local_path.into(),
        }
    }

    /// Remote object key (prefix joined with the relative path).
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }
}
