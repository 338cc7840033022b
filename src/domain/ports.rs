use super::payment::{Partition, PartitionTotals, PaymentRequest, ProcessorPayload, TimeWindow};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A message handed to one consumer of the payment stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: u64,
    pub subject: String,
    pub payload: Vec<u8>,
    /// 1-based count of how many times this message has been delivered.
    pub attempt: u32,
}

/// Durable, at-least-once work queue with one shared consumer group.
#[async_trait]
pub trait PaymentQueue: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()>;
    /// Waits for the next ready message. Returns `None` once the queue is closed.
    async fn fetch(&self) -> Result<Option<Delivery>>;
    async fn ack(&self, id: u64) -> Result<()>;
    async fn nack(&self, id: u64, delay: Duration) -> Result<()>;
    async fn close(&self);
}

/// Append-only store of settled payments, split into partitions.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn append(&self, partition: Partition, record: PaymentRequest) -> Result<()>;
    async fn aggregate(&self, partition: Partition, window: TimeWindow) -> Result<PartitionTotals>;
    async fn purge(&self) -> Result<()>;
}

/// Raw transport to one downstream payment processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn submit(&self, payload: &ProcessorPayload<'_>) -> Result<()>;
}

pub type QueueHandle = Arc<dyn PaymentQueue>;
pub type LedgerHandle = Arc<dyn Ledger>;
pub type ProcessorBox = Box<dyn PaymentProcessor>;
