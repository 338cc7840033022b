use super::dispatcher::Dispatcher;
use crate::domain::payment::{Partition, PaymentRequest};
use crate::domain::ports::{Delivery, LedgerHandle, QueueHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Back-off applied when a message is handed back to the queue.
///
/// The delay doubles with each prior delivery of the same message and is
/// capped at `max_delay`. There is no attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// What happened to a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Accepted downstream, appended to the ledger and acknowledged.
    Settled(Partition),
    /// Undecodable payload, acknowledged and discarded.
    Dropped,
    /// No processor accepted it; handed back to the queue.
    Retried,
    /// Accepted downstream but the ledger write failed; handed back to the queue.
    LedgerFailed,
}

/// Fixed set of competing consumers draining the payment stream.
///
/// Workers share nothing but the queue, the ledger and the dispatcher's
/// endpoint breakers.
pub struct WorkerPool {
    queue: QueueHandle,
    dispatcher: Arc<Dispatcher>,
    ledger: LedgerHandle,
    retry: RetryPolicy,
}

impl WorkerPool {
    pub fn new(
        queue: QueueHandle,
        dispatcher: Arc<Dispatcher>,
        ledger: LedgerHandle,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            ledger,
            retry,
        }
    }

    /// Spawns `workers` consumer loops. Each stops taking new messages once
    /// `shutdown` turns `true`, after finishing the message it holds.
    pub fn spawn(
        self: &Arc<Self>,
        workers: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        (0..workers)
            .map(|id| {
                let pool = Arc::clone(self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run_worker(id, shutdown).await })
            })
            .collect()
    }

    async fn run_worker(&self, id: usize, mut shutdown: watch::Receiver<bool>) {
        info!(worker = id, "Starting consumer");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let fetched = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                fetched = self.queue.fetch() => fetched,
            };
            match fetched {
                Ok(Some(delivery)) => {
                    self.process(delivery).await;
                }
                Ok(None) => break,
                Err(e) => {
                    error!(worker = id, error = %e, "Failed to fetch from queue");
                    tokio::time::sleep(self.retry.base_delay).await;
                }
            }
        }
        info!(worker = id, "Consumer stopped");
    }

    /// Handles one delivery end to end.
    ///
    /// The message is acknowledged only after the ledger append succeeded,
    /// or when the payload can never be decoded.
    pub async fn process(&self, delivery: Delivery) -> ProcessOutcome {
        let mut payment = match PaymentRequest::decode(&delivery.payload) {
            Ok(payment) => payment,
            Err(e) => {
                warn!(
                    delivery = delivery.id,
                    error = %e,
                    "Dropping undecodable message"
                );
                self.ack(delivery.id).await;
                return ProcessOutcome::Dropped;
            }
        };

        let partition = match self.dispatcher.dispatch(&mut payment).await {
            Ok(partition) => partition,
            Err(e) => {
                let delay = self.retry.delay_for(delivery.attempt);
                if e.is_transient() {
                    debug!(
                        correlation_id = %payment.correlation_id,
                        attempt = delivery.attempt,
                        error = %e,
                        "Payment unsettled, scheduling redelivery"
                    );
                } else {
                    warn!(
                        correlation_id = %payment.correlation_id,
                        attempt = delivery.attempt,
                        error = %e,
                        "Dispatch failed unexpectedly, scheduling redelivery"
                    );
                }
                self.nack(delivery.id, delay).await;
                return ProcessOutcome::Retried;
            }
        };

        let correlation_id = payment.correlation_id.clone();
        match self.ledger.append(partition, payment).await {
            Ok(()) => {
                self.ack(delivery.id).await;
                debug!(%correlation_id, %partition, "Payment settled");
                ProcessOutcome::Settled(partition)
            }
            Err(e) => {
                // Already accepted downstream; a redelivery may charge it twice.
                error!(
                    %correlation_id,
                    %partition,
                    error = %e,
                    "Ledger append failed for a settled payment"
                );
                self.nack(delivery.id, self.retry.delay_for(delivery.attempt))
                    .await;
                ProcessOutcome::LedgerFailed
            }
        }
    }

    async fn ack(&self, id: u64) {
        if let Err(e) = self.queue.ack(id).await {
            error!(delivery = id, error = %e, "Failed to ack message");
        }
    }

    async fn nack(&self, id: u64, delay: Duration) {
        if let Err(e) = self.queue.nack(id, delay).await {
            error!(delivery = id, error = %e, "Failed to nack message");
        }
    }
}

/// Waits for every worker spawned by [`WorkerPool::spawn`] to exit.
pub async fn join_workers(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker task panicked");
        }
    }
}
