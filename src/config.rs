use crate::application::circuit_breaker::CircuitBreakerConfig;
use crate::application::worker::RetryPolicy;
use crate::error::{PaymentError, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration. Every flag can also come from the environment.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address the HTTP server binds to
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:9999")]
    pub listen: SocketAddr,

    /// URL of the primary (default) payment processor
    #[arg(long, env = "DEFAULT_URL", default_value = "http://localhost:8001/payments")]
    pub default_url: String,

    /// URL of the secondary (fallback) payment processor
    #[arg(long, env = "FALLBACK_URL", default_value = "http://localhost:8002/payments")]
    pub fallback_url: String,

    /// HTTP timeout for the primary processor, in milliseconds
    #[arg(long, env = "DEFAULT_TIMEOUT_MS", default_value_t = 1000)]
    pub default_timeout_ms: u64,

    /// HTTP timeout for the secondary processor, in milliseconds
    #[arg(long, env = "FALLBACK_TIMEOUT_MS", default_value_t = 5000)]
    pub fallback_timeout_ms: u64,

    /// Number of concurrent queue consumers
    #[arg(long, env = "MAX_WORKERS", default_value_t = 1)]
    pub max_workers: usize,

    /// Maximum messages delivered but not yet acknowledged
    #[arg(long, env = "MAX_ACK_PENDING", default_value_t = 50)]
    pub max_ack_pending: usize,

    /// Consecutive failures that open an endpoint's circuit
    #[arg(long, env = "BREAKER_FAILURE_THRESHOLD", default_value_t = 5)]
    pub breaker_failure_threshold: u32,

    /// How long an open circuit rejects calls, in milliseconds
    #[arg(long, env = "BREAKER_COOLDOWN_MS", default_value_t = 1000)]
    pub breaker_cooldown_ms: u64,

    /// Redelivery delay after a failed dispatch, in milliseconds
    #[arg(long, env = "NACK_DELAY_MS", default_value_t = 1000)]
    pub nack_delay_ms: u64,

    /// Upper bound for the growing redelivery delay, in milliseconds
    #[arg(long, env = "MAX_NACK_DELAY_MS", default_value_t = 10_000)]
    pub max_nack_delay_ms: u64,

    /// NATS server holding the payment stream (optional). If provided, uses
    /// JetStream; otherwise payments are queued in memory.
    #[arg(long, env = "BROKER_URL")]
    pub broker_url: Option<String>,

    /// Path to persistent ledger (optional). If provided, uses RocksDB.
    #[arg(long, env = "STORAGE_PATH")]
    pub db_path: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

/// Settings of one downstream processor, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub name: &'static str,
    pub url: String,
    pub timeout: Duration,
    pub breaker: CircuitBreakerConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(PaymentError::ConfigError(
                "max-workers must be at least 1".to_string(),
            ));
        }
        if self.max_ack_pending == 0 {
            return Err(PaymentError::ConfigError(
                "max-ack-pending must be at least 1".to_string(),
            ));
        }
        if self.breaker_failure_threshold == 0 {
            return Err(PaymentError::ConfigError(
                "breaker-failure-threshold must be at least 1".to_string(),
            ));
        }
        if self.max_nack_delay_ms < self.nack_delay_ms {
            return Err(PaymentError::ConfigError(
                "max-nack-delay-ms must not be below nack-delay-ms".to_string(),
            ));
        }
        Ok(())
    }

    fn breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            cooldown: Duration::from_millis(self.breaker_cooldown_ms),
        }
    }

    /// The primary and secondary endpoint settings, in that order.
    pub fn endpoints(&self) -> (EndpointConfig, EndpointConfig) {
        (
            EndpointConfig {
                name: "default",
                url: self.default_url.clone(),
                timeout: Duration::from_millis(self.default_timeout_ms),
                breaker: self.breaker(),
            },
            EndpointConfig {
                name: "fallback",
                url: self.fallback_url.clone(),
                timeout: Duration::from_millis(self.fallback_timeout_ms),
                breaker: self.breaker(),
            },
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.nack_delay_ms),
            max_delay: Duration::from_millis(self.max_nack_delay_ms),
        }
    }
}
