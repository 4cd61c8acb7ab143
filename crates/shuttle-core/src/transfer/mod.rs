//! Transfer machinery below the drivers.
//!
//! - **backoff**: bounded exponential retry
//! - **classify**: file vs. prefix by listing
//! - **single** / **bulk**: one object, or a directory through a worker pool
//! - **local**: filesystem and key/path helpers

pub mod backoff;
pub mod bulk;
pub mod classify;
pub mod local;
pub mod single;

pub use self::backoff::{BackoffPolicy, Step, retry};
pub use self::bulk::BulkTransfer;
pub use self::classify::{ObjectKind, classify};
