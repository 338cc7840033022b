use crate::error::{PaymentError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Represents a positive monetary amount for a payment.
///
/// Wraps `rust_decimal::Decimal` so a zero or negative amount can never reach
/// the queue, a processor, or the ledger.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// A payment travelling through the dispatch pipeline.
///
/// `requested_at` is empty until the first downstream attempt and is
/// re-stamped on every attempt, so a settled record carries the time of the
/// attempt that was accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub correlation_id: String,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<DateTime<Utc>>,
}

impl PaymentRequest {
    pub fn new(correlation_id: impl Into<String>, amount: Amount) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            amount,
            requested_at: None,
        }
    }

    /// Parses an ingress body of the form `{"correlationId": "...", "amount": 19.9}`.
    ///
    /// Any caller-supplied `requestedAt` is discarded; the pipeline owns that field.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut payment: PaymentRequest = serde_json::from_slice(body)?;
        if payment.correlation_id.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "correlationId must not be empty".to_string(),
            ));
        }
        payment.requested_at = None;
        Ok(payment)
    }

    /// Decodes a queue payload, keeping whatever timestamp it carries.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Sets `requested_at` to the current instant and returns it.
    pub fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.requested_at = Some(now);
        now
    }
}

/// One of the two independent ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// Settled by the primary processor.
    Default,
    /// Settled by the secondary processor after the primary failed.
    Fallback,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Default, Partition::Fallback];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Default => "default",
            Partition::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inclusive time range; a missing bound is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| *at >= from) && self.to.is_none_or(|to| *at <= to)
    }
}

/// Count and sum of the payments settled in one partition.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionTotals {
    pub total_requests: u64,
    #[serde(serialize_with = "serialize_money")]
    pub total_amount: Decimal,
}

impl PartitionTotals {
    pub fn record(&mut self, amount: Amount) {
        self.total_requests += 1;
        self.total_amount += amount.value();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PaymentsSummary {
    pub default: PartitionTotals,
    pub fallback: PartitionTotals,
}

/// The JSON body posted to a payment processor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorPayload<'a> {
    pub correlation_id: &'a str,
    /// Sent as accepted at ingress, digit for digit.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(serialize_with = "serialize_timestamp")]
    pub requested_at: DateTime<Utc>,
}

impl<'a> ProcessorPayload<'a> {
    pub fn from_request(payment: &'a PaymentRequest) -> Result<Self> {
        let requested_at = payment.requested_at.ok_or_else(|| {
            PaymentError::ValidationError("payment has not been stamped".to_string())
        })?;
        Ok(Self {
            correlation_id: &payment.correlation_id,
            amount: payment.amount.value(),
            requested_at,
        })
    }
}

/// Summary totals go out as a JSON number rounded to cents.
fn serialize_money<S>(value: &Decimal, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(value.round_dp(2).to_f64().unwrap_or_default())
}

fn serialize_timestamp<S>(
    value: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_must_be_positive() {
        assert!(Amount::new(dec!(0.01)).is_ok());
        assert!(Amount::new(dec!(0)).is_err());
        assert!(Amount::new(dec!(-5)).is_err());
    }

    #[test]
    fn test_parse_ingress_body() {
        let body = br#"{"correlationId":"4a7901b8-7d26-4d9d-aa19-4dc1c7cf60b3","amount":19.90}"#;
        let payment = PaymentRequest::parse(body).unwrap();
        assert_eq!(payment.correlation_id, "4a7901b8-7d26-4d9d-aa19-4dc1c7cf60b3");
        assert_eq!(payment.amount.value(), dec!(19.90));
        assert!(payment.requested_at.is_none());
    }

    #[test]
    fn test_parse_discards_caller_timestamp() {
        let body = br#"{"correlationId":"abc","amount":1,"requestedAt":"2025-07-15T12:34:56.000Z"}"#;
        let payment = PaymentRequest::parse(body).unwrap();
        assert!(payment.requested_at.is_none());
    }

    #[test]
    fn test_parse_rejects_malformed_bodies() {
        assert!(matches!(
            PaymentRequest::parse(b"not json"),
            Err(PaymentError::Malformed(_))
        ));
        assert!(PaymentRequest::parse(br#"{"correlationId":"abc"}"#).is_err());
        assert!(PaymentRequest::parse(br#"{"correlationId":"abc","amount":-1}"#).is_err());
        assert!(matches!(
            PaymentRequest::parse(br#"{"correlationId":"  ","amount":1}"#),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_queue_payload_keeps_exact_amount() {
        let mut payment = PaymentRequest::new("id-1", Amount::new(dec!(0.1)).unwrap());
        payment.stamp();
        let decoded = PaymentRequest::decode(&payment.encode().unwrap()).unwrap();
        assert_eq!(decoded, payment);
    }

    #[test]
    fn test_processor_payload_shape() {
        let mut payment = PaymentRequest::new("id-1", Amount::new(dec!(19.90)).unwrap());
        payment.requested_at = Some(Utc.with_ymd_and_hms(2025, 7, 15, 12, 34, 56).unwrap());
        let payload = ProcessorPayload::from_request(&payment).unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "correlationId": "id-1",
                "amount": 19.9,
                "requestedAt": "2025-07-15T12:34:56.000Z"
            })
        );
    }

    #[test]
    fn test_processor_payload_keeps_sub_cent_amounts() {
        for (amount, expected) in [
            (dec!(0.005), "0.005"),
            (dec!(19.999), "19.999"),
            (dec!(0.125), "0.125"),
            (dec!(1234.5678), "1234.5678"),
        ] {
            let mut payment = PaymentRequest::new("id-1", Amount::new(amount).unwrap());
            payment.stamp();
            let payload = ProcessorPayload::from_request(&payment).unwrap();
            let body = serde_json::to_string(&payload).unwrap();
            assert!(
                body.contains(&format!(r#""amount":{expected}"#)),
                "body: {body}"
            );
        }
    }

    #[test]
    fn test_processor_payload_requires_stamp() {
        let payment = PaymentRequest::new("id-1", Amount::new(dec!(1)).unwrap());
        assert!(ProcessorPayload::from_request(&payment).is_err());
    }

    #[test]
    fn test_time_window_is_inclusive() {
        let t1 = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 7, 10, 13, 0, 0).unwrap();
        let window = TimeWindow::new(Some(t1), Some(t2));
        assert!(window.contains(&t1));
        assert!(window.contains(&t2));
        assert!(!window.contains(&(t2 + chrono::Duration::milliseconds(1))));
        assert!(TimeWindow::unbounded().contains(&t1));
    }

    #[test]
    fn test_summary_serialization() {
        let mut summary = PaymentsSummary::default();
        summary.default.record(Amount::new(dec!(100)).unwrap());
        summary.default.record(Amount::new(dec!(200.001)).unwrap());
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "default": {"totalRequests": 2, "totalAmount": 300.0},
                "fallback": {"totalRequests": 0, "totalAmount": 0.0}
            })
        );
    }
}
