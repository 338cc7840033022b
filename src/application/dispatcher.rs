use super::endpoint::EndpointClient;
use crate::domain::payment::{Partition, PaymentRequest};
use crate::error::{PaymentError, Result};
use tracing::warn;

/// Forwards a payment to the primary processor, falling back to the secondary.
///
/// The order is fixed: the primary is always tried first. With its breaker
/// open the primary attempt is an immediate local rejection, so a sustained
/// primary outage costs one lock acquisition per payment.
pub struct Dispatcher {
    primary: EndpointClient,
    secondary: EndpointClient,
}

impl Dispatcher {
    pub fn new(primary: EndpointClient, secondary: EndpointClient) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &EndpointClient {
        &self.primary
    }

    pub fn secondary(&self) -> &EndpointClient {
        &self.secondary
    }

    /// Returns the partition the payment must be recorded in.
    ///
    /// On `Err` no processor accepted the payment.
    pub async fn dispatch(&self, payment: &mut PaymentRequest) -> Result<Partition> {
        let primary_err = match self.primary.attempt(payment).await {
            Ok(()) => return Ok(Partition::Default),
            Err(e) => e,
        };
        if !matches!(primary_err, PaymentError::BreakerOpen { .. }) {
            warn!(
                endpoint = self.primary.name(),
                correlation_id = %payment.correlation_id,
                error = %primary_err,
                "Primary attempt failed, trying fallback"
            );
        }

        match self.secondary.attempt(payment).await {
            Ok(()) => Ok(Partition::Fallback),
            Err(secondary_err) => Err(PaymentError::Unsettled {
                primary: Box::new(primary_err),
                secondary: Box::new(secondary_err),
            }),
        }
    }
}
