#![cfg(feature = "queue-nats")]

use paydispatch::domain::ports::{Delivery, PaymentQueue};
use paydispatch::error::PaymentError;
use paydispatch::infrastructure::jetstream::JetStreamQueue;
use paydispatch::infrastructure::stream::PAYMENT_CREATED;
use std::time::Duration;
use tokio::time::timeout;

fn broker_url() -> String {
    std::env::var("BROKER_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

/// Fetches until the message carrying `marker` shows up, acking anything else.
async fn fetch_marker(queue: &JetStreamQueue, marker: &[u8]) -> Delivery {
    timeout(Duration::from_secs(10), async {
        loop {
            let delivery = queue.fetch().await.unwrap().unwrap();
            if delivery.payload == marker {
                return delivery;
            }
            queue.ack(delivery.id).await.unwrap();
        }
    })
    .await
    .expect("message did not arrive")
}

#[tokio::test]
#[ignore = "requires a NATS server with JetStream at BROKER_URL"]
async fn test_unsettled_payment_survives_reconnect() {
    let marker = format!("restart-{}", rand::random::<u64>()).into_bytes();

    let queue = JetStreamQueue::connect(&broker_url(), 10).await.unwrap();
    queue.publish(PAYMENT_CREATED, marker.clone()).await.unwrap();
    let first = fetch_marker(&queue, &marker).await;
    assert_eq!(first.subject, PAYMENT_CREATED);
    assert_eq!(first.attempt, 1);
    // Delayed so the redelivery lands on the new connection.
    queue.nack(first.id, Duration::from_secs(2)).await.unwrap();
    queue.close().await;
    drop(queue);

    let queue = JetStreamQueue::connect(&broker_url(), 10).await.unwrap();
    let second = fetch_marker(&queue, &marker).await;
    assert_eq!(second.id, first.id);
    assert_eq!(second.attempt, 2);
    queue.ack(second.id).await.unwrap();
    assert!(matches!(
        queue.ack(second.id).await,
        Err(PaymentError::UnknownDelivery(_))
    ));
}

#[tokio::test]
#[ignore = "requires a NATS server with JetStream at BROKER_URL"]
async fn test_closed_queue_stops_fetching_and_publishing() {
    let queue = JetStreamQueue::connect(&broker_url(), 10).await.unwrap();
    queue.close().await;

    assert!(queue.fetch().await.unwrap().is_none());
    assert!(matches!(
        queue.publish(PAYMENT_CREATED, b"late".to_vec()).await,
        Err(PaymentError::QueueClosed)
    ));
}

#[tokio::test]
#[ignore = "requires a NATS server with JetStream at BROKER_URL"]
async fn test_publish_rejects_foreign_subject() {
    let queue = JetStreamQueue::connect(&broker_url(), 10).await.unwrap();
    assert!(matches!(
        queue.publish("ORDERS.created", b"x".to_vec()).await,
        Err(PaymentError::InvalidSubject(_))
    ));
}
