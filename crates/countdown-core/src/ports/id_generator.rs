//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）。Clock の時刻を timestamp 部に使う

use std::sync::Arc;

use ulid::Ulid;

use crate::domain::ids::{JobId, LaunchId};
use crate::ports::Clock;

/// Generates identifiers that can be minted on any node without coordination.
pub trait IdGenerator: Send + Sync {
    fn generate_launch_id(&self) -> LaunchId;

    fn generate_job_id(&self) -> JobId;
}

/// ULID-based generator.
///
/// The timestamp part comes from the injected `Clock`, so a `FixedClock`
/// gives IDs with a deterministic time prefix.
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl IdGenerator for UlidGenerator {
    fn generate_launch_id(&self) -> LaunchId {
        LaunchId::from(self.next_ulid())
    }

    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next_ulid())
    }
}
