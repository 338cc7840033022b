use crate::domain::payment::{Partition, PartitionTotals, PaymentRequest, TimeWindow};
use crate::domain::ports::{Delivery, Ledger, PaymentQueue};
use crate::error::{PaymentError, Result};
use crate::infrastructure::stream::{PAYMENT_SUBJECTS, subject_matches};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;

/// A thread-safe in-memory ledger.
///
/// Uses `Arc<RwLock<HashMap<Partition, Vec<PaymentRequest>>>>` so workers
/// append while the summary endpoint reads.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    partitions: Arc<RwLock<HashMap<Partition, Vec<PaymentRequest>>>>,
}

impl InMemoryLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record appended to `partition`, in append order.
    pub async fn records(&self, partition: Partition) -> Vec<PaymentRequest> {
        let partitions = self.partitions.read().await;
        partitions.get(&partition).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn append(&self, partition: Partition, record: PaymentRequest) -> Result<()> {
        if record.requested_at.is_none() {
            return Err(PaymentError::ValidationError(
                "ledger records must carry requestedAt".to_string(),
            ));
        }
        let mut partitions = self.partitions.write().await;
        partitions.entry(partition).or_default().push(record);
        Ok(())
    }

    async fn aggregate(&self, partition: Partition, window: TimeWindow) -> Result<PartitionTotals> {
        let partitions = self.partitions.read().await;
        let mut totals = PartitionTotals::default();
        for record in partitions.get(&partition).into_iter().flatten() {
            if record.requested_at.is_some_and(|at| window.contains(&at)) {
                totals.record(record.amount);
            }
        }
        Ok(totals)
    }

    async fn purge(&self) -> Result<()> {
        let mut partitions = self.partitions.write().await;
        partitions.clear();
        Ok(())
    }
}

struct Message {
    id: u64,
    subject: String,
    payload: Vec<u8>,
    deliveries: u32,
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    ready: VecDeque<Message>,
    delayed: Vec<(Instant, Message)>,
    in_flight: HashMap<u64, Message>,
    closed: bool,
}

impl QueueState {
    fn promote_due(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.delayed.len() {
            if self.delayed[i].0 <= now {
                let (_, message) = self.delayed.swap_remove(i);
                self.ready.push_back(message);
            } else {
                i += 1;
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.iter().map(|(at, _)| *at).min()
    }
}

/// In-process work queue with competing-consumer semantics.
///
/// Every message goes to exactly one fetcher and stays in flight until it is
/// acked (gone for good) or nacked (ready again after its delay). At most
/// `max_ack_pending` messages are in flight at once.
pub struct InMemoryQueue {
    subjects: String,
    max_ack_pending: usize,
    state: Mutex<QueueState>,
    changed: Notify,
}

impl InMemoryQueue {
    pub fn new(max_ack_pending: usize) -> Self {
        Self {
            subjects: PAYMENT_SUBJECTS.to_string(),
            max_ack_pending: max_ack_pending.max(1),
            state: Mutex::new(QueueState::default()),
            changed: Notify::new(),
        }
    }

    /// Messages waiting to be delivered, including those backing off.
    pub fn pending(&self) -> usize {
        let state = self.lock();
        state.ready.len() + state.delayed.len()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_in_flight(&self, id: u64) -> Result<(MutexGuard<'_, QueueState>, Message)> {
        let mut state = self.lock();
        match state.in_flight.remove(&id) {
            Some(message) => Ok((state, message)),
            None => Err(PaymentError::UnknownDelivery(id)),
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new(50)
    }
}

#[async_trait]
impl PaymentQueue for InMemoryQueue {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        if !subject_matches(&self.subjects, subject) {
            return Err(PaymentError::InvalidSubject(subject.to_string()));
        }
        {
            let mut state = self.lock();
            if state.closed {
                return Err(PaymentError::QueueClosed);
            }
            state.next_id += 1;
            let id = state.next_id;
            state.ready.push_back(Message {
                id,
                subject: subject.to_string(),
                payload,
                deliveries: 0,
            });
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn fetch(&self) -> Result<Option<Delivery>> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_due = {
                let mut state = self.lock();
                if state.closed {
                    return Ok(None);
                }
                state.promote_due(Instant::now());
                if state.in_flight.len() < self.max_ack_pending
                    && let Some(mut message) = state.ready.pop_front()
                {
                    message.deliveries += 1;
                    let delivery = Delivery {
                        id: message.id,
                        subject: message.subject.clone(),
                        payload: message.payload.clone(),
                        attempt: message.deliveries,
                    };
                    state.in_flight.insert(message.id, message);
                    return Ok(Some(delivery));
                }
                state.next_due()
            };

            match next_due {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn ack(&self, id: u64) -> Result<()> {
        let (state, _) = self.take_in_flight(id)?;
        drop(state);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn nack(&self, id: u64, delay: Duration) -> Result<()> {
        let (mut state, message) = self.take_in_flight(id)?;
        if delay.is_zero() {
            state.ready.push_back(message);
        } else {
            state.delayed.push((Instant::now() + delay, message));
        }
        drop(state);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_waiters();
    }
}
