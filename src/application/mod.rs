//! Application layer: the dispatch pipeline.
//!
//! A [`worker::WorkerPool`] drains the payment stream, hands each payment to
//! the [`dispatcher::Dispatcher`], which tries the primary and then the
//! secondary [`endpoint::EndpointClient`], each guarded by its own
//! [`circuit_breaker::CircuitBreaker`]. Settled payments land in the ledger;
//! the [`aggregator::Aggregator`] reads them back.

pub mod aggregator;
pub mod circuit_breaker;
pub mod dispatcher;
pub mod endpoint;
pub mod worker;
