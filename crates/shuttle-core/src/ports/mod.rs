//! Ports - 抽象化レイヤー
//!
//! 外部のオブジェクトストレージへのインターフェースを定義します。
//! 実装の詳細（OpenDAL, in-memory）は `impls` に置きます。

pub mod client_factory;
pub mod object_client;

pub use self::client_factory::ClientFactory;
pub use self::object_client::ObjectClient;
