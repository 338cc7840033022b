//! Builds the long-lived pipeline components from a [`Config`].

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::dispatcher::Dispatcher;
use crate::application::endpoint::EndpointClient;
use crate::config::{Config, EndpointConfig};
use crate::domain::ports::{LedgerHandle, QueueHandle};
use crate::error::Result;
use crate::infrastructure::http_processor::HttpPaymentProcessor;
use crate::infrastructure::in_memory::{InMemoryLedger, InMemoryQueue};
use std::sync::Arc;
use tracing::{info, warn};

pub fn endpoint_client(endpoint: &EndpointConfig) -> Result<EndpointClient> {
    let processor = HttpPaymentProcessor::new(endpoint.name, &endpoint.url, endpoint.timeout)?;
    info!(
        endpoint = endpoint.name,
        url = %endpoint.url,
        timeout_ms = endpoint.timeout.as_millis() as u64,
        "Configured payment processor"
    );
    Ok(EndpointClient::new(
        Box::new(processor),
        CircuitBreaker::with_config(endpoint.name, endpoint.breaker),
    ))
}

pub fn dispatcher(config: &Config) -> Result<Dispatcher> {
    let (primary, secondary) = config.endpoints();
    Ok(Dispatcher::new(
        endpoint_client(&primary)?,
        endpoint_client(&secondary)?,
    ))
}

/// Opens the ledger selected by `--db-path`, in memory when absent.
pub fn ledger(config: &Config) -> Result<LedgerHandle> {
    match &config.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let ledger = crate::infrastructure::rocksdb::RocksDbLedger::open(path)?;
            info!(path = %path.display(), "Using RocksDB ledger");
            Ok(Arc::new(ledger))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "Persistent storage requested via --db-path, but the 'storage-rocksdb' feature is not enabled; falling back to in-memory storage"
            );
            Ok(Arc::new(InMemoryLedger::new()))
        }
        None => Ok(Arc::new(InMemoryLedger::new())),
    }
}

/// Connects the queue selected by `--broker-url`, in memory when absent.
pub async fn queue(config: &Config) -> Result<QueueHandle> {
    match &config.broker_url {
        #[cfg(feature = "queue-nats")]
        Some(url) => {
            let queue = crate::infrastructure::jetstream::JetStreamQueue::connect(
                url,
                config.max_ack_pending,
            )
            .await?;
            Ok(Arc::new(queue))
        }
        #[cfg(not(feature = "queue-nats"))]
        Some(_) => {
            warn!(
                "Broker requested via --broker-url, but the 'queue-nats' feature is not enabled; falling back to an in-memory queue"
            );
            Ok(Arc::new(InMemoryQueue::new(config.max_ack_pending)))
        }
        None => {
            warn!("No --broker-url given; queued payments will not survive a restart");
            Ok(Arc::new(InMemoryQueue::new(config.max_ack_pending)))
        }
    }
}
