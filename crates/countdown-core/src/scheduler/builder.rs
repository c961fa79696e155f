//! SchedulerBuilder - Scheduler の組み立てと起動時検証
//!
//! # 方針
//! - handler は起動時に全部登録する
//! - expect_event_types() で「必要な event_type」を宣言しておくと、
//!   build() 時に未登録があれば BuildError で止まる（Fail-fast）

use std::sync::Arc;

use super::dispatcher::Scheduler;
use super::registry::{HandlerRegistry, JobHandler, RegistryError};
use crate::config::SchedulerConfig;
use crate::ports::{Clock, IdGenerator, JobStore};

/// # 使用例
/// ```ignore
/// let scheduler = SchedulerBuilder::new(config.scheduler)
///     .register("video_render", Arc::new(VideoRender))?
///     .expect_event_types(&["video_render"])
///     .build(store, ids, clock)?;
/// ```
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    registry: HandlerRegistry,
    expected: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing handlers for event types: {0:?}")]
    MissingHandlers(Vec<String>),
}

impl SchedulerBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
            expected: None,
        }
    }

    pub fn register(
        mut self,
        event_type: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> Result<Self, RegistryError> {
        self.registry.register(event_type, handler)?;
        Ok(self)
    }

    pub fn expect_event_types(mut self, event_types: &[&str]) -> Self {
        self.expected = Some(event_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn build(
        self,
        store: Arc<dyn JobStore>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Scheduler, BuildError> {
        if let Some(expected) = &self.expected {
            let registered = self.registry.registered_types();
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !registered.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingHandlers(missing));
            }
        }

        Ok(Scheduler::new(store, self.registry, ids, clock, self.config))
    }
}
