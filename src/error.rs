use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Circuit breaker for '{endpoint}' is open, request rejected")]
    BreakerOpen { endpoint: String },
    #[error("Endpoint '{endpoint}' failed: {reason}")]
    Downstream { endpoint: String, reason: String },
    #[error("Payment unsettled: primary: {primary}; secondary: {secondary}")]
    Unsettled {
        primary: Box<PaymentError>,
        secondary: Box<PaymentError>,
    },
    #[error("Subject '{0}' is not bound to the payment stream")]
    InvalidSubject(String),
    #[error("Broker error: {0}")]
    BrokerError(String),
    #[error("Queue is closed")]
    QueueClosed,
    #[error("Unknown delivery: {0}")]
    UnknownDelivery(u64),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Storage error: {0}")]
    StorageError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    /// Returns `true` for failures that a later redelivery may clear.
    pub fn is_transient(&self) -> bool {
        match self {
            PaymentError::BreakerOpen { .. } | PaymentError::Downstream { .. } => true,
            PaymentError::Unsettled { primary, secondary } => {
                primary.is_transient() && secondary.is_transient()
            }
            _ => false,
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(e: rocksdb::Error) -> Self {
        PaymentError::StorageError(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let open = PaymentError::BreakerOpen {
            endpoint: "default".to_string(),
        };
        let down = PaymentError::Downstream {
            endpoint: "fallback".to_string(),
            reason: "HTTP 500".to_string(),
        };
        assert!(open.is_transient());
        assert!(down.is_transient());
        assert!(
            PaymentError::Unsettled {
                primary: Box::new(open),
                secondary: Box::new(down),
            }
            .is_transient()
        );
        assert!(
            !PaymentError::Unsettled {
                primary: Box::new(PaymentError::BreakerOpen {
                    endpoint: "default".to_string(),
                }),
                secondary: Box::new(PaymentError::ValidationError("unstamped".to_string())),
            }
            .is_transient()
        );
        assert!(!PaymentError::ValidationError("bad".to_string()).is_transient());
        assert!(!PaymentError::QueueClosed.is_transient());
    }
}
