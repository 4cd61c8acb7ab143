//! Artifact descriptors.
//!
//! An [`Artifact`] names one input or output of a pipeline step together with
//! where it lives. Descriptors arrive already resolved (credentials included)
//! and are immutable once constructed.
//!
//! The wire shape has one optional sub-object per provider:
//!
//! ```json
//! { "name": "results", "s3": { "bucket": "b", "key": "runs/42", "credentials": { ... } } }
//! ```
//!
//! Exactly one of `s3`, `gcs` or `raw` must be present; deserialization
//! enforces it.

use std::fmt;

use serde::Deserialize;

use super::errors::TransferError;

/// Storage provider behind an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    S3,
    Gcs,
    Raw,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::S3 => "s3",
            Provider::Gcs => "gcs",
            Provider::Raw => "raw",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret material. Never printed, never serialized.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: Secret,
    #[serde(default)]
    pub session_token: Option<Secret>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsCredentials {
    /// Service account key file contents (JSON).
    pub service_account_key: Secret,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
    /// Overrides the configured endpoint for this artifact only.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    pub credentials: S3Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsLocation {
    pub bucket: String,
    pub key: String,
    pub credentials: GcsCredentials,
}

/// Inline artifact content; nothing is stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawLocation {
    pub data: String,
}

/// Provider-specific part of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    S3(S3Location),
    Gcs(GcsLocation),
    Raw(RawLocation),
}

/// Borrowed view of a bucket/key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRef<'a> {
    pub provider: Provider,
    pub bucket: &'a str,
    pub key: &'a str,
}

/// A resolved artifact descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ArtifactSpec")]
pub struct Artifact {
    name: String,
    location: ArtifactLocation,
}

impl Artifact {
    /// Build and validate a descriptor.
    pub fn new(name: impl Into<String>, location: ArtifactLocation) -> Result<Self, TransferError> {
        let artifact = Self {
            name: name.into(),
            location,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn s3(
        name: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        credentials: S3Credentials,
    ) -> Result<Self, TransferError> {
        Self::new(
            name,
            ArtifactLocation::S3(S3Location {
                bucket: bucket.into(),
                key: key.into(),
                endpoint: None,
                region: None,
                credentials,
            }),
        )
    }

    pub fn gcs(
        name: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        credentials: GcsCredentials,
    ) -> Result<Self, TransferError> {
        Self::new(
            name,
            ArtifactLocation::Gcs(GcsLocation {
                bucket: bucket.into(),
                key: key.into(),
                credentials,
            }),
        )
    }

    pub fn raw(name: impl Into<String>, data: impl Into<String>) -> Result<Self, TransferError> {
        Self::new(name, ArtifactLocation::Raw(RawLocation { data: data.into() }))
    }

    pub fn from_json(json: &str) -> Result<Self, TransferError> {
        serde_json::from_str(json).map_err(|e| TransferError::InvalidDescriptor(e.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &ArtifactLocation {
        &self.location
    }

    pub fn provider(&self) -> Provider {
        match &self.location {
            ArtifactLocation::S3(_) => Provider::S3,
            ArtifactLocation::Gcs(_) => Provider::Gcs,
            ArtifactLocation::Raw(_) => Provider::Raw,
        }
    }

    /// Bucket and key, for providers backed by an object store.
    pub fn object(&self) -> Option<ObjectRef<'_>> {
        match &self.location {
            ArtifactLocation::S3(s3) => Some(ObjectRef {
                provider: Provider::S3,
                bucket: &s3.bucket,
                key: &s3.key,
            }),
            ArtifactLocation::Gcs(gcs) => Some(ObjectRef {
                provider: Provider::Gcs,
                bucket: &gcs.bucket,
                key: &gcs.key,
            }),
            ArtifactLocation::Raw(_) => None,
        }
    }

    /// Check credential material without touching the network.
    pub fn validate_credentials(&self) -> Result<(), TransferError> {
        match &self.location {
            ArtifactLocation::S3(s3) => {
                let invalid = |reason: &str| TransferError::CredentialsInvalid {
                    provider: Provider::S3,
                    reason: reason.to_string(),
                };
                if s3.credentials.access_key_id.trim().is_empty() {
                    return Err(invalid("access key id is empty"));
                }
                if s3.credentials.secret_access_key.is_empty() {
                    return Err(invalid("secret access key is empty"));
                }
                Ok(())
            }
            ArtifactLocation::Gcs(gcs) => {
                let invalid = |reason: String| TransferError::CredentialsInvalid {
                    provider: Provider::Gcs,
                    reason,
                };
                let key: serde_json::Value =
                    serde_json::from_str(gcs.credentials.service_account_key.expose())
                        .map_err(|e| invalid(format!("service account key is not JSON: {e}")))?;
                let has_email = key
                    .get("client_email")
                    .and_then(|v| v.as_str())
                    .is_some_and(|s| !s.is_empty());
                if !has_email {
                    return Err(invalid("service account key has no client_email".to_string()));
                }
                Ok(())
            }
            ArtifactLocation::Raw(_) => Ok(()),
        }
    }

    fn validate(&self) -> Result<(), TransferError> {
        if self.name.trim().is_empty() {
            return Err(TransferError::InvalidDescriptor(
                "artifact name is empty".to_string(),
            ));
        }
        if let Some(object) = self.object() {
            if object.bucket.trim().is_empty() {
                return Err(TransferError::InvalidDescriptor(format!(
                    "{} artifact '{}' has an empty bucket",
                    object.provider, self.name
                )));
            }
            if object.key.trim().is_empty() {
                return Err(TransferError::InvalidDescriptor(format!(
                    "{} artifact '{}' has an empty key",
                    object.provider, self.name
                )));
            }
        }
        Ok(())
    }
}

/// Wire form; converted into [`Artifact`] with validation.
#[derive(Deserialize)]
struct ArtifactSpec {
    name: String,
    #[serde(default)]
    s3: Option<S3Location>,
    #[serde(default)]
    gcs: Option<GcsLocation>,
    #[serde(default)]
    raw: Option<RawLocation>,
}

impl TryFrom<ArtifactSpec> for Artifact {
    type Error = TransferError;

    fn try_from(spec: ArtifactSpec) -> Result<Self, Self::Error> {
        let location = match (spec.s3, spec.gcs, spec.raw) {
            (Some(s3), None, None) => ArtifactLocation::S3(s3),
            (None, Some(gcs), None) => ArtifactLocation::Gcs(gcs),
            (None, None, Some(raw)) => ArtifactLocation::Raw(raw),
            (None, None, None) => {
                return Err(TransferError::InvalidDescriptor(format!(
                    "artifact '{}' has no location",
                    spec.name
                )));
            }
            _ => {
                return Err(TransferError::InvalidDescriptor(format!(
                    "artifact '{}' has more than one location",
                    spec.name
                )));
            }
        };
        Artifact::new(spec.name, location)
    }
}
