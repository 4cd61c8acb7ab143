use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::app::driver::ArtifactDriver;
use crate::domain::{Artifact, Provider, TransferError};
use crate::observability::TransferCounts;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("driver for provider '{0}' is already registered")]
    AlreadyRegistered(Provider),
}

/// Registry of drivers (provider -> driver).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable, shared through `Arc`).
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<Provider, Arc<dyn ArtifactDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        provider: Provider,
        driver: Arc<dyn ArtifactDriver>,
    ) -> Result<(), RegistryError> {
        if self.drivers.contains_key(&provider) {
            return Err(RegistryError::AlreadyRegistered(provider));
        }
        self.drivers.insert(provider, driver);
        Ok(())
    }

    pub fn get(&self, provider: Provider) -> Option<&Arc<dyn ArtifactDriver>> {
        self.drivers.get(&provider)
    }

    /// Registered providers, sorted.
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.drivers.keys().copied().collect();
        providers.sort();
        providers
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

/// ArtifactRuntime dispatches Load/Save to the driver for the descriptor's
/// provider.
#[derive(Clone)]
pub struct ArtifactRuntime {
    registry: Arc<DriverRegistry>,
}

impl ArtifactRuntime {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    fn driver(&self, artifact: &Artifact) -> Result<&Arc<dyn ArtifactDriver>, TransferError> {
        let provider = artifact.provider();
        self.registry
            .get(provider)
            .ok_or(TransferError::NoDriver(provider))
    }

    pub async fn load(&self, artifact: &Artifact, path: &Path) -> Result<TransferCounts, TransferError> {
        self.driver(artifact)?.load(artifact, path).await
    }

    pub async fn save(&self, path: &Path, artifact: &Artifact) -> Result<TransferCounts, TransferError> {
        self.driver(artifact)?.save(path, artifact).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::driver::RawDriver;
    use crate::domain::artifact::fixtures::s3_artifact;

    #[tokio::test]
    async fn runtime_dispatches_on_provider() {
        let mut reg = DriverRegistry::new();
        reg.register(Provider::Raw, Arc::new(RawDriver::default()))
            .unwrap();
        let rt = ArtifactRuntime::new(Arc::new(reg));

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("inline.txt");
        rt.load(&Artifact::raw("inline", "hi").unwrap(), &target)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hi");
    }

    #[tokio::test]
    async fn runtime_errors_when_driver_missing() {
        let rt = ArtifactRuntime::new(Arc::new(DriverRegistry::new()));
        let dir = tempfile::tempdir().unwrap();

        let err = rt
            .load(&s3_artifact("bucket", "k"), &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::NoDriver(Provider::S3)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = DriverRegistry::new();
        reg.register(Provider::Raw, Arc::new(RawDriver::default()))
            .unwrap();
        let err = reg
            .register(Provider::Raw, Arc::new(RawDriver::default()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(Provider::Raw)));
        assert_eq!(reg.len(), 1);
    }
}
