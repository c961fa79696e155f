//! InMemoryDeadLetterQueue - 開発用・テスト用の DeadLetterSink

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::StoreError;
use crate::ports::{DeadLetter, DeadLetterReason, DeadLetterSink};

#[derive(Default)]
pub struct InMemoryDeadLetterQueue {
    entries: Mutex<Vec<DeadLetter>>,
    unavailable: AtomicBool,
}

impl InMemoryDeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn entries(&self) -> Vec<DeadLetter> {
        self.entries.lock().await.clone()
    }

    pub async fn count(&self, reason: DeadLetterReason) -> usize {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.reason == reason)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterQueue {
    async fn record(&self, letter: DeadLetter) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("dead letter queue offline".into()));
        }
        self.entries.lock().await.push(letter);
        Ok(())
    }
}
