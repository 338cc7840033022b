use crate::domain::payment::ProcessorPayload;
use crate::domain::ports::PaymentProcessor;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Posts payments to a processor over HTTP.
///
/// Any 2xx within the timeout is success; the response body is never read.
pub struct HttpPaymentProcessor {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpPaymentProcessor {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let name = name.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::ConfigError(format!("HTTP client for '{name}': {e}")))?;
        Ok(Self {
            name,
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn failure(&self, reason: impl Into<String>) -> PaymentError {
        PaymentError::Downstream {
            endpoint: self.name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    async fn submit(&self, payload: &ProcessorPayload<'_>) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    self.failure("timed out")
                } else {
                    self.failure(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.failure(format!("HTTP {status}")))
        }
    }
}
