//! ClientFactory port - 呼び出しごとのクライアント生成
//!
//! Load / Save の呼び出しごとに新しい ObjectClient を作ります。
//! クライアントは共有・プールしません（認証情報の寿命を呼び出し内に閉じるため）。

use std::sync::Arc;

use crate::domain::{Artifact, TransferError};
use crate::ports::ObjectClient;

/// Builds an [`ObjectClient`] for one artifact.
///
/// Implementations must validate credentials before any network access and
/// report bad material as [`TransferError::CredentialsInvalid`].
pub trait ClientFactory: Send + Sync {
    fn connect(&self, artifact: &Artifact) -> Result<Arc<dyn ObjectClient>, TransferError>;
}
