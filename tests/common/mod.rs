#![allow(dead_code)]

use async_trait::async_trait;
use paydispatch::application::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use paydispatch::application::dispatcher::Dispatcher;
use paydispatch::application::endpoint::EndpointClient;
use paydispatch::application::worker::{RetryPolicy, WorkerPool};
use paydispatch::domain::payment::ProcessorPayload;
use paydispatch::domain::ports::{LedgerHandle, PaymentProcessor, QueueHandle};
use paydispatch::error::{PaymentError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Call-counting stand-in for a payment processor.
#[derive(Default)]
pub struct StubProcessor {
    failing: AtomicBool,
    calls: AtomicUsize,
    accepted: Mutex<Vec<String>>,
}

impl StubProcessor {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let stub = Self::default();
        stub.failing.store(true, Ordering::SeqCst);
        Arc::new(stub)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> Vec<String> {
        self.accepted.lock().unwrap().clone()
    }
}

struct SharedStub(Arc<StubProcessor>);

#[async_trait]
impl PaymentProcessor for SharedStub {
    async fn submit(&self, payload: &ProcessorPayload<'_>) -> Result<()> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        if self.0.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Downstream {
                endpoint: "stub".to_string(),
                reason: "HTTP 500".to_string(),
            });
        }
        self.0
            .accepted
            .lock()
            .unwrap()
            .push(payload.correlation_id.to_string());
        Ok(())
    }
}

pub fn endpoint(name: &str, stub: &Arc<StubProcessor>, config: CircuitBreakerConfig) -> EndpointClient {
    EndpointClient::new(
        Box::new(SharedStub(stub.clone())),
        CircuitBreaker::with_config(name, config),
    )
}

pub fn dispatcher(
    primary: &Arc<StubProcessor>,
    secondary: &Arc<StubProcessor>,
    config: CircuitBreakerConfig,
) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(
        endpoint("default", primary, config),
        endpoint("fallback", secondary, config),
    ))
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    }
}

pub fn pool(queue: QueueHandle, dispatcher: Arc<Dispatcher>, ledger: LedgerHandle) -> Arc<WorkerPool> {
    Arc::new(WorkerPool::new(queue, dispatcher, ledger, fast_retry()))
}

pub fn payment_body(correlation_id: &str, amount: &str) -> Vec<u8> {
    format!(r#"{{"correlationId":"{correlation_id}","amount":{amount}}}"#).into_bytes()
}

/// Polls `check` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
