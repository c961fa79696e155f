//! InMemoryEventSource - 開発用の at-least-once event source
//!
//! # 学習ポイント
//! - Mutex + Notify による async な待機（blocking スレッドを使わない）
//! - ack されるまで delivery は in-flight に残り、nack で ready に戻る
//! - close 後も in-flight が残っている間は None を返さない（nack で戻る可能性がある）

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::domain::LaunchEvent;
use crate::ports::{Delivery, DeliveryId, EventSource, SourceError};

#[derive(Default)]
struct SourceState {
    ready: VecDeque<Delivery>,
    in_flight: HashMap<DeliveryId, Delivery>,
    next_id: u64,
    acked: usize,
    closed: bool,
}

/// In-memory broker with explicit ack / nack.
///
/// Redelivered messages go to the back of the queue, so redelivery order is
/// not the publish order.
#[derive(Default)]
pub struct InMemoryEventSource {
    state: Mutex<SourceState>,
    notify: Notify,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a raw payload.
    pub async fn push(&self, payload: impl Into<Vec<u8>>) -> DeliveryId {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = DeliveryId(state.next_id);
        state.ready.push_back(Delivery {
            id,
            payload: payload.into(),
            delivery_count: 1,
        });
        drop(state);
        self.notify.notify_waiters();
        id
    }

    /// Publish an event as JSON.
    pub async fn push_event(&self, event: &LaunchEvent) -> Result<DeliveryId, SourceError> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| SourceError::Unavailable(format!("encode failed: {e}")))?;
        Ok(self.push(payload).await)
    }

    /// Mark the source closed. Receivers get `None` once everything
    /// outstanding has been acked.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    /// Messages not yet acked (ready or in flight).
    pub async fn outstanding(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.in_flight.len()
    }

    pub async fn acked(&self) -> usize {
        self.state.lock().await.acked
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn receive(&self) -> Result<Option<Delivery>, SourceError> {
        loop {
            // 通知を取りこぼさないよう、状態を見る前に待機者として登録しておく
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(delivery) = state.ready.pop_front() {
                    state.in_flight.insert(delivery.id, delivery.clone());
                    return Ok(Some(delivery));
                }
                if state.closed && state.in_flight.is_empty() {
                    return Ok(None);
                }
            }

            notified.await;
        }
    }

    async fn ack(&self, id: DeliveryId) -> Result<(), SourceError> {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&id).is_none() {
            return Err(SourceError::UnknownDelivery(id));
        }
        state.acked += 1;
        let drained = state.closed && state.in_flight.is_empty() && state.ready.is_empty();
        drop(state);
        if drained {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn nack(&self, id: DeliveryId) -> Result<(), SourceError> {
        let mut state = self.state.lock().await;
        let Some(mut delivery) = state.in_flight.remove(&id) else {
            return Err(SourceError::UnknownDelivery(id));
        };
        delivery.delivery_count += 1;
        state.ready.push_back(delivery);
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }
}
