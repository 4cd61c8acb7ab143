//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **OpendalClient**: S3 / GCS（OpenDAL）
//! - **InMemoryObjectStore**: 開発・テスト用のストア

pub mod inmem_store;
pub mod opendal_client;

pub use self::inmem_store::InMemoryObjectStore;
pub use self::opendal_client::{OpendalClient, OpendalClientFactory};
