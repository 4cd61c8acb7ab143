//! Errors - 転送エラーの型と分類
//!
//! Every failure the transfer subsystem can report is a [`TransferError`].
//! Each variant maps to an [`ErrorKind`], which the backoff executor uses to
//! decide between "try again" and "give up now".

use std::io;
use std::path::{Path, PathBuf};

use super::artifact::Provider;

/// Boxed error used for provider-specific causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// ErrorKind は失敗の運用分類
///
/// - Transient: 一時的なエラー（リトライで直る可能性がある）
/// - Permanent: 構造的なエラー（リトライしても直らない）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("artifact not found: bucket={bucket} key={key}")]
    NotFound { bucket: String, key: String },

    #[error("local path does not exist: {0}")]
    LocalPathMissing(PathBuf),

    #[error("local path is a directory: {0}")]
    LocalPathIsDirectory(PathBuf),

    #[error("local path is a file: {0}")]
    LocalPathIsFile(PathBuf),

    #[error("parent directory does not exist: {0}")]
    ParentMissing(PathBuf),

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("invalid {provider} credentials: {reason}")]
    CredentialsInvalid { provider: Provider, reason: String },

    #[error("invalid artifact descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("{provider} artifacts do not support {operation}")]
    Unsupported {
        provider: Provider,
        operation: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no driver registered for provider {0}")]
    NoDriver(Provider),

    #[error("local I/O failed at {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("transient transfer failure: {message}")]
    Transient {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<TransferError>,
    },

    #[error("bulk transfer failed at key={key} after {completed} objects succeeded: {source}")]
    PartialBulkFailure {
        completed: usize,
        key: String,
        #[source]
        source: Box<TransferError>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl TransferError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            source: None,
        }
    }

    pub fn transient_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transient {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// Wrap a local filesystem error. `NotFound` becomes [`TransferError::LocalPathMissing`].
    pub fn local_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Self::LocalPathMissing(path.to_path_buf());
        }
        Self::LocalIo {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::Transient,
            Self::LocalIo { source, .. } => match source.kind() {
                // ローカルの構造・容量の問題はリトライしても直らない
                io::ErrorKind::PermissionDenied
                | io::ErrorKind::AlreadyExists
                | io::ErrorKind::NotADirectory
                | io::ErrorKind::IsADirectory
                | io::ErrorKind::InvalidInput
                | io::ErrorKind::ReadOnlyFilesystem
                | io::ErrorKind::StorageFull => ErrorKind::Permanent,
                _ => ErrorKind::Transient,
            },
            Self::PartialBulkFailure { source, .. } => source.kind(),
            _ => ErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_errors_are_permanent() {
        let errors = [
            TransferError::not_found("b", "k"),
            TransferError::LocalPathIsDirectory(PathBuf::from("/tmp/x")),
            TransferError::LocalPathIsFile(PathBuf::from("/tmp/x")),
            TransferError::CredentialsInvalid {
                provider: Provider::S3,
                reason: "empty".to_string(),
            },
            TransferError::RetriesExhausted {
                attempts: 3,
                last: Box::new(TransferError::transient("boom")),
            },
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::Permanent, "{err}");
        }
    }

    #[test]
    fn local_io_not_found_becomes_missing_path() {
        let err = TransferError::local_io(
            Path::new("/nope"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, TransferError::LocalPathMissing(p) if p == Path::new("/nope")));

        let err = TransferError::local_io(
            Path::new("/locked"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_transient());

        for kind in [
            io::ErrorKind::AlreadyExists,
            io::ErrorKind::NotADirectory,
            io::ErrorKind::IsADirectory,
            io::ErrorKind::InvalidInput,
            io::ErrorKind::ReadOnlyFilesystem,
            io::ErrorKind::StorageFull,
        ] {
            let err = TransferError::local_io(Path::new("/x"), io::Error::new(kind, "structural"));
            assert!(!err.is_transient(), "{kind:?}");
        }

        let err = TransferError::local_io(
            Path::new("/busy"),
            io::Error::new(io::ErrorKind::Interrupted, "again"),
        );
        assert!(err.is_transient());
    }

    #[test]
    fn partial_bulk_failure_inherits_kind_from_source() {
        let transient = TransferError::PartialBulkFailure {
            completed: 2,
            key: "runs/1/a".to_string(),
            source: Box::new(TransferError::transient("reset by peer")),
        };
        assert!(transient.is_transient());

        let permanent = TransferError::PartialBulkFailure {
            completed: 2,
            key: "runs/1/a".to_string(),
            source: Box::new(TransferError::not_found("b", "runs/1/a")),
        };
        assert!(!permanent.is_transient());
    }
}
