use super::circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics};
use crate::domain::payment::{PaymentRequest, ProcessorPayload};
use crate::domain::ports::ProcessorBox;
use crate::error::Result;
use tracing::debug;

/// One downstream payment processor behind its own circuit breaker.
pub struct EndpointClient {
    processor: ProcessorBox,
    breaker: CircuitBreaker,
}

impl EndpointClient {
    pub fn new(processor: ProcessorBox, breaker: CircuitBreaker) -> Self {
        Self { processor, breaker }
    }

    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.breaker.metrics()
    }

    /// Forwards `payment` once.
    ///
    /// `requested_at` is re-stamped right before the request goes out. When
    /// the breaker rejects the call nothing is sent and the payment is left
    /// untouched.
    pub async fn attempt(&self, payment: &mut PaymentRequest) -> Result<()> {
        let processor = &self.processor;
        self.breaker
            .call(async {
                payment.stamp();
                let payload = ProcessorPayload::from_request(payment)?;
                processor.submit(&payload).await
            })
            .await?;
        debug!(
            endpoint = self.name(),
            correlation_id = %payment.correlation_id,
            "Payment accepted"
        );
        Ok(())
    }
}
