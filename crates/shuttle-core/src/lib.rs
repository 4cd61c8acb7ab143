//! shuttle-core
//!
//! Moves workflow artifacts between a local scratch path and object storage.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（artifact, task, ids, errors）
//! - **ports**: 抽象化レイヤー（ObjectClient, ClientFactory）
//! - **transfer**: backoff, classifier, single / bulk transfer
//! - **impls**: 実装（OpendalClient, InMemoryObjectStore）
//! - **app**: ドライバ, レジストリ, RuntimeBuilder
//! - **config** / **logging** / **observability**: 設定・ログ・転送カウンタ

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod logging;
pub mod observability;
pub mod ports;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;
