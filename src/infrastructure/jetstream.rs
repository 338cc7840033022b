//! Durable payment queue on a NATS JetStream stream.
//!
//! Payments are stored in the `PAYMENT` stream (work-queue retention, so a
//! message disappears once acked) and consumed through the single durable
//! pull consumer `worker-group` with explicit acks. Everything the process
//! accepted but did not settle is still in the stream after a restart.

use crate::domain::ports::{Delivery, PaymentQueue};
use crate::error::{PaymentError, Result};
use crate::infrastructure::stream::{
    CONSUMER_GROUP, PAYMENT_STREAM, PAYMENT_SUBJECTS, subject_matches,
};
use async_nats::jetstream::consumer::pull::Config as PullConsumerConfig;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy};
use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy, StorageType};
use async_nats::jetstream::{self, AckKind, Message};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::{MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::info;

/// How long the server waits for an ack before redelivering on its own.
/// Longer than both processor timeouts together.
const ACK_WAIT: Duration = Duration::from_secs(30);

type MessageStream = BoxStream<'static, std::result::Result<Message, String>>;

pub struct JetStreamQueue {
    context: jetstream::Context,
    messages: Mutex<MessageStream>,
    in_flight: std::sync::Mutex<HashMap<u64, Message>>,
    closed: watch::Sender<bool>,
}

impl JetStreamQueue {
    /// Connects to `url`, creating the payment stream and the durable
    /// consumer when they do not exist yet.
    pub async fn connect(url: &str, max_ack_pending: usize) -> Result<Self> {
        let client = async_nats::connect(url).await.map_err(broker_error)?;
        let context = jetstream::new(client);

        let stream = context
            .get_or_create_stream(stream_config())
            .await
            .map_err(broker_error)?;
        let consumer = stream
            .get_or_create_consumer(CONSUMER_GROUP, consumer_config(max_ack_pending))
            .await
            .map_err(broker_error)?;
        let messages = consumer
            .messages()
            .await
            .map_err(broker_error)?
            .map(|item| item.map_err(|e| e.to_string()))
            .boxed();

        info!(
            url,
            stream = PAYMENT_STREAM,
            consumer = CONSUMER_GROUP,
            max_ack_pending,
            "Connected to JetStream"
        );

        let (closed, _) = watch::channel(false);
        Ok(Self {
            context,
            messages: Mutex::new(messages),
            in_flight: std::sync::Mutex::new(HashMap::new()),
            closed,
        })
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<u64, Message>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_in_flight(&self, id: u64) -> Result<Message> {
        self.lock_in_flight()
            .remove(&id)
            .ok_or(PaymentError::UnknownDelivery(id))
    }
}

#[async_trait]
impl PaymentQueue for JetStreamQueue {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        if !subject_matches(PAYMENT_SUBJECTS, subject) {
            return Err(PaymentError::InvalidSubject(subject.to_string()));
        }
        if *self.closed.borrow() {
            return Err(PaymentError::QueueClosed);
        }
        // Wait for the stream's ack so the caller only hears success once
        // the payment is stored.
        let ack = self
            .context
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(broker_error)?;
        ack.await.map_err(broker_error)?;
        Ok(())
    }

    async fn fetch(&self) -> Result<Option<Delivery>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Ok(None);
        }

        let next = async {
            let mut messages = self.messages.lock().await;
            messages.next().await
        };
        let message = tokio::select! {
            _ = closed.changed() => return Ok(None),
            item = next => match item {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(PaymentError::BrokerError(e)),
                None => {
                    return Err(PaymentError::BrokerError(
                        "consumer message stream ended".to_string(),
                    ));
                }
            },
        };

        let (id, attempt) = {
            let info = message.info().map_err(broker_error)?;
            (info.stream_sequence, delivery_attempt(info.delivered))
        };
        let delivery = Delivery {
            id,
            subject: message.subject.to_string(),
            payload: message.payload.to_vec(),
            attempt,
        };
        self.lock_in_flight().insert(id, message);
        Ok(Some(delivery))
    }

    async fn ack(&self, id: u64) -> Result<()> {
        let message = self.take_in_flight(id)?;
        message.ack().await.map_err(broker_error)
    }

    async fn nack(&self, id: u64, delay: Duration) -> Result<()> {
        let message = self.take_in_flight(id)?;
        message
            .ack_with(AckKind::Nak(nak_delay(delay)))
            .await
            .map_err(broker_error)
    }

    async fn close(&self) {
        self.closed.send_replace(true);
    }
}

fn stream_config() -> StreamConfig {
    StreamConfig {
        name: PAYMENT_STREAM.to_string(),
        subjects: vec![PAYMENT_SUBJECTS.to_string()],
        retention: RetentionPolicy::WorkQueue,
        storage: StorageType::File,
        ..Default::default()
    }
}

fn consumer_config(max_ack_pending: usize) -> PullConsumerConfig {
    PullConsumerConfig {
        durable_name: Some(CONSUMER_GROUP.to_string()),
        filter_subject: PAYMENT_SUBJECTS.to_string(),
        deliver_policy: DeliverPolicy::All,
        ack_policy: AckPolicy::Explicit,
        ack_wait: ACK_WAIT,
        max_ack_pending: i64::try_from(max_ack_pending).unwrap_or(i64::MAX),
        ..Default::default()
    }
}

/// JetStream counts deliveries from 1; anything lower is treated as the first.
fn delivery_attempt(delivered: i64) -> u32 {
    u32::try_from(delivered.max(1)).unwrap_or(u32::MAX)
}

fn nak_delay(delay: Duration) -> Option<Duration> {
    (!delay.is_zero()).then_some(delay)
}

fn broker_error(e: impl std::fmt::Display) -> PaymentError {
    PaymentError::BrokerError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_config_binds_payment_subjects() {
        let config = stream_config();
        assert_eq!(config.name, "PAYMENT");
        assert_eq!(config.subjects, vec!["PAYMENT.*".to_string()]);
        assert_eq!(config.retention, RetentionPolicy::WorkQueue);
        assert_eq!(config.storage, StorageType::File);
    }

    #[test]
    fn test_consumer_config_is_durable_with_explicit_acks() {
        let config = consumer_config(50);
        assert_eq!(config.durable_name.as_deref(), Some("worker-group"));
        assert_eq!(config.filter_subject, "PAYMENT.*");
        assert_eq!(config.ack_policy, AckPolicy::Explicit);
        assert_eq!(config.max_ack_pending, 50);
        assert_eq!(config.ack_wait, ACK_WAIT);
        assert_eq!(consumer_config(usize::MAX).max_ack_pending, i64::MAX);
    }

    #[test]
    fn test_delivery_attempt_is_one_based() {
        assert_eq!(delivery_attempt(1), 1);
        assert_eq!(delivery_attempt(4), 4);
        assert_eq!(delivery_attempt(0), 1);
        assert_eq!(delivery_attempt(-3), 1);
        assert_eq!(delivery_attempt(i64::MAX), u32::MAX);
    }

    #[test]
    fn test_zero_delay_naks_immediately() {
        assert_eq!(nak_delay(Duration::ZERO), None);
        assert_eq!(
            nak_delay(Duration::from_millis(250)),
            Some(Duration::from_millis(250))
        );
    }
}
