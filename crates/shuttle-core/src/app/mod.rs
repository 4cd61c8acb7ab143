//! App - アプリケーション層
//!
//! ports と transfer を組み合わせて Load / Save を提供します。
//!
//! # 主要コンポーネント
//! - **ArtifactDriver**: provider ごとの Load / Save（ObjectStoreDriver, RawDriver）
//! - **ArtifactRuntime**: provider でドライバを選んで委譲
//! - **RuntimeBuilder**: ドライバの登録と起動時検証

pub mod builder;
pub mod driver;
pub mod registry;

pub use self::builder::{BuildError, RuntimeBuilder};
pub use self::driver::{ArtifactDriver, ObjectStoreDriver, RawDriver};
pub use self::registry::{ArtifactRuntime, DriverRegistry, RegistryError};
