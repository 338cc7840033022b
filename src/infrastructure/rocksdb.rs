use crate::domain::payment::{Partition, PartitionTotals, PaymentRequest, TimeWindow};
use crate::domain::ports::Ledger;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;

/// Column Family holding payments settled by the primary processor.
pub const CF_DEFAULT_PAYMENTS: &str = "payments_default";
/// Column Family holding payments settled by the secondary processor.
pub const CF_FALLBACK_PAYMENTS: &str = "payments_fallback";

/// A persistent ledger using RocksDB.
///
/// Each partition lives in its own Column Family. Keys are the big-endian,
/// order-preserving `requestedAt` nanoseconds followed by the correlation id,
/// so a time window is a single forward range scan.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbLedger {
    db: Arc<DB>,
}

impl RocksDbLedger {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that both partition column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_default = ColumnFamilyDescriptor::new(CF_DEFAULT_PAYMENTS, Options::default());
        let cf_fallback = ColumnFamilyDescriptor::new(CF_FALLBACK_PAYMENTS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_default, cf_fallback])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn handle(&self, partition: Partition) -> Result<&ColumnFamily> {
        let name = match partition {
            Partition::Default => CF_DEFAULT_PAYMENTS,
            Partition::Fallback => CF_FALLBACK_PAYMENTS,
        };
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::StorageError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }
}

/// Maps a timestamp onto 8 bytes whose lexicographic order matches time order.
fn time_key(at: &DateTime<Utc>) -> Result<[u8; 8]> {
    let nanos = at.timestamp_nanos_opt().ok_or_else(|| {
        PaymentError::ValidationError(format!("timestamp {at} is out of range"))
    })?;
    Ok(((nanos as u64) ^ (1 << 63)).to_be_bytes())
}

fn storage_error(e: impl std::fmt::Display, what: &str) -> PaymentError {
    PaymentError::StorageError(Box::new(std::io::Error::other(format!("{what}: {e}"))))
}

#[async_trait]
impl Ledger for RocksDbLedger {
    async fn append(&self, partition: Partition, record: PaymentRequest) -> Result<()> {
        let cf = self.handle(partition)?;
        let requested_at = record.requested_at.ok_or_else(|| {
            PaymentError::ValidationError("ledger records must carry requestedAt".to_string())
        })?;

        let mut key = time_key(&requested_at)?.to_vec();
        key.extend_from_slice(record.correlation_id.as_bytes());
        let value = serde_json::to_vec(&record).map_err(|e| storage_error(e, "Serialization error"))?;

        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    async fn aggregate(&self, partition: Partition, window: TimeWindow) -> Result<PartitionTotals> {
        let cf = self.handle(partition)?;
        let start = match &window.from {
            Some(from) => time_key(from)?,
            None => [0u8; 8],
        };
        let end = match &window.to {
            Some(to) => Some(time_key(to)?),
            None => None,
        };

        let mut totals = PartitionTotals::default();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| storage_error(e, "RocksDB iteration error"))?;
            if let Some(end) = &end
                && key.len() >= 8
                && key[..8] > end[..]
            {
                break;
            }
            let record: PaymentRequest = serde_json::from_slice(&value)
                .map_err(|e| storage_error(e, "Failed to deserialize payment"))?;
            totals.record(record.amount);
        }
        Ok(totals)
    }

    async fn purge(&self) -> Result<()> {
        let mut batch = WriteBatch::default();
        for partition in Partition::ALL {
            let cf = self.handle(partition)?;
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
                let (key, _) = item.map_err(|e| storage_error(e, "RocksDB iteration error"))?;
                batch.delete_cf(cf, key);
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}
