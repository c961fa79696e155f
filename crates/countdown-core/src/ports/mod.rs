//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（DB, broker, 時刻）へのインターフェースを提供し、
//! 実装の詳細を隠蔽します。開発用・テスト用の実装は `impls` にあります。

pub mod clock;
pub mod dead_letter;
pub mod event_source;
pub mod id_generator;
pub mod job_store;
pub mod launch_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dead_letter::{DeadLetter, DeadLetterReason, DeadLetterSink};
pub use self::event_source::{Delivery, DeliveryId, EventSource, SourceError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::{JobStore, Withdrawal};
pub use self::launch_store::{LaunchFilter, LaunchStore, PageCursor};
