//! EventSource port - at-least-once broker abstraction.
//!
//! Consumer groups, partitions and offsets are the adapter's business. The
//! core only relies on: a delivery stays outstanding until it is acked, and
//! anything not acked is delivered again eventually, in no particular order.

use async_trait::async_trait;

/// Opaque handle identifying one delivery (offset, receipt handle, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryId(pub u64);

/// One message handed to the consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: DeliveryId,
    pub payload: Vec<u8>,

    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("event source unavailable: {0}")]
    Unavailable(String),

    #[error("unknown delivery {0:?}")]
    UnknownDelivery(DeliveryId),
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Wait for the next delivery. `Ok(None)` means the source is closed and drained.
    async fn receive(&self) -> Result<Option<Delivery>, SourceError>;

    /// Commit: the delivery will not be seen again.
    async fn ack(&self, id: DeliveryId) -> Result<(), SourceError>;

    /// Release without committing, so the source redelivers it.
    async fn nack(&self, id: DeliveryId) -> Result<(), SourceError>;
}
