//! Scheduler - 時刻指定 job の永続化と実行
//!
//! # 主要コンポーネント
//! - **HandlerRegistry**: event_type → JobHandler
//! - **Scheduler**: schedule / withdraw / status と dispatch ループ
//! - **RetryPolicy**: 失敗時の指数 backoff（jitter 付き）
//! - **SchedulerBuilder**: 起動時検証付きの組み立て

pub mod builder;
pub mod dispatcher;
pub mod registry;
pub mod retry;

pub use self::builder::{BuildError, SchedulerBuilder};
pub use self::dispatcher::{ScheduleError, ScheduleRequest, Scheduler};
pub use self::registry::{HandlerError, HandlerRegistry, JobContext, JobHandler, RegistryError};
pub use self::retry::RetryPolicy;
