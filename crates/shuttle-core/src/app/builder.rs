//! RuntimeBuilder - ドライバのワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）

use std::sync::Arc;

use crate::app::driver::{ArtifactDriver, ObjectStoreDriver, RawDriver};
use crate::app::registry::{ArtifactRuntime, DriverRegistry, RegistryError};
use crate::config::ShuttleConfig;
use crate::domain::{Provider, TransferError};
use crate::ports::ClientFactory;

/// RuntimeBuilder は ArtifactRuntime を構築
///
/// # 使用例
/// ```ignore
/// let runtime = RuntimeBuilder::new()
///     .register(Provider::S3, Arc::new(ObjectStoreDriver::new(factory)))?
///     .expect_providers(&[Provider::S3])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_providers() で必要な provider を宣言
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
#[derive(Default)]
pub struct RuntimeBuilder {
    registry: DriverRegistry,
    expected: Option<Vec<Provider>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing providers: {0:?}. These providers were expected but have no driver.")]
    MissingProviders(Vec<Provider>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// S3 and GCS through `factory`, Raw inline, all tuned by `cfg`. Every
    /// provider is expected.
    pub fn from_config(
        cfg: &ShuttleConfig,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Self, BuildError> {
        let objects: Arc<dyn ArtifactDriver> = Arc::new(ObjectStoreDriver::from_config(cfg, factory)?);
        let raw = Arc::new(RawDriver::new(cfg.transfer.create_missing_parents));
        Ok(Self::new()
            .register(Provider::S3, Arc::clone(&objects))?
            .register(Provider::Gcs, objects)?
            .register(Provider::Raw, raw)?
            .expect_providers(&[Provider::S3, Provider::Gcs, Provider::Raw]))
    }

    pub fn register(
        mut self,
        provider: Provider,
        driver: Arc<dyn ArtifactDriver>,
    ) -> Result<Self, RegistryError> {
        self.registry.register(provider, driver)?;
        Ok(self)
    }

    pub fn expect_providers(mut self, providers: &[Provider]) -> Self {
        self.expected = Some(providers.to_vec());
        self
    }

    pub fn build(self) -> Result<ArtifactRuntime, BuildError> {
        if let Some(expected) = &self.expected {
            let missing: Vec<Provider> = expected
                .iter()
                .filter(|p| self.registry.get(**p).is_none())
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingProviders(missing));
            }
        }
        Ok(ArtifactRuntime::new(Arc::new(self.registry)))
    }
}
