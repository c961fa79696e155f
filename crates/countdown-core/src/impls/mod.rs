//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の in-memory 実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryLaunchStore**: launch の正本（version による compare-and-update）
//! - **InMemoryJobStore**: scheduled job の正本（条件付き claim）
//! - **InMemoryEventSource**: ack / nack 付きの配送キュー
//! - **InMemoryDeadLetterQueue**: dead letter の記録先
//!
//! # 本番用実装
//! 本番用の実装（Postgres, Kafka など）は別クレートに配置する想定です。
//! テーブル定義は `schema/rocket_launches.sql` を参照。

pub mod inmem_dead_letter;
pub mod inmem_event_source;
pub mod inmem_job_store;
pub mod inmem_launch_store;

// 主要な型を再エクスポート
pub use self::inmem_dead_letter::InMemoryDeadLetterQueue;
pub use self::inmem_event_source::InMemoryEventSource;
pub use self::inmem_job_store::InMemoryJobStore;
pub use self::inmem_launch_store::InMemoryLaunchStore;
