//! Adapters for the domain ports.

pub mod http_processor;
pub mod in_memory;
#[cfg(feature = "queue-nats")]
pub mod jetstream;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod stream;
