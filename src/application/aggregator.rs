use crate::domain::payment::{Partition, PaymentsSummary, TimeWindow};
use crate::domain::ports::LedgerHandle;
use crate::error::Result;
use tracing::info;

/// Read side of the ledger: per-partition totals and the administrative purge.
#[derive(Clone)]
pub struct Aggregator {
    ledger: LedgerHandle,
}

impl Aggregator {
    pub fn new(ledger: LedgerHandle) -> Self {
        Self { ledger }
    }

    /// Totals for both partitions over `window`, queried concurrently.
    pub async fn summarize(&self, window: TimeWindow) -> Result<PaymentsSummary> {
        let (default, fallback) = tokio::try_join!(
            self.ledger.aggregate(Partition::Default, window),
            self.ledger.aggregate(Partition::Fallback, window),
        )?;
        Ok(PaymentsSummary { default, fallback })
    }

    pub async fn purge(&self) -> Result<()> {
        self.ledger.purge().await?;
        info!("All payment partitions purged");
        Ok(())
    }
}
