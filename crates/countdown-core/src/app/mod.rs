//! App - launch 側のアプリケーション層
//!
//! ports を組み合わせて launch lifecycle を動かします。
//!
//! # 主要コンポーネント
//! - **LaunchStateMachine**: event を launch record に適用（冪等、compare-and-update）
//! - **EventConsumer / ConsumerGroup**: broker から受信して適用、ack / nack / dead-letter
//! - **ReportEngine**: 期間クエリ、統計、顧客レポート

pub mod consumer;
pub mod report;
pub mod state_machine;

pub use self::consumer::{ConsumeOutcome, ConsumerError, ConsumerGroup, ConsumerReport, EventConsumer};
pub use self::report::{LaunchReport, LaunchStatistics, LaunchStream, ReportEngine, ReportError};
pub use self::state_machine::{ApplyError, LaunchStateMachine};
