//! Domain model (artifact descriptors, transfer tasks, ids, errors).

pub mod artifact;
pub mod errors;
pub mod ids;
pub mod task;

pub use self::artifact::{
    Artifact, ArtifactLocation, GcsCredentials, GcsLocation, ObjectRef, Provider, RawLocation,
    S3Credentials, S3Location, Secret,
};
pub use self::errors::{BoxError, ErrorKind, TransferError};
pub use self::ids::TransferId;
pub use self::task::TransferTask;
