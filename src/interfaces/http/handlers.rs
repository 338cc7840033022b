use super::AppState;
use crate::domain::payment::{PaymentRequest, TimeWindow};
use crate::error::PaymentError;
use crate::infrastructure::stream::PAYMENT_CREATED;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, error, warn};

/// `POST /payments`
///
/// The payment is on the queue before the `204` goes out; nothing about its
/// settlement is reported back to the caller.
pub async fn create_payment(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let payment = match PaymentRequest::parse(&body) {
        Ok(payment) => payment,
        Err(e) => {
            debug!(error = %e, "Rejected payment body");
            return StatusCode::BAD_REQUEST;
        }
    };

    let payload = match payment.encode() {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "Failed to encode payment");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    match state.queue.publish(PAYMENT_CREATED, payload).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            warn!(correlation_id = %payment.correlation_id, error = %e, "Failed to publish payment");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub from: Option<String>,
    pub to: Option<String>,
}

fn parse_bound(raw: Option<&str>, field: &str) -> Result<Option<DateTime<Utc>>, PaymentError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|e| PaymentError::ValidationError(format!("invalid '{field}': {e}"))),
    }
}

/// `GET /payments-summary?from=..&to=..`
pub async fn payments_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Response {
    let window = match (
        parse_bound(params.from.as_deref(), "from"),
        parse_bound(params.to.as_deref(), "to"),
    ) {
        (Ok(from), Ok(to)) => TimeWindow::new(from, to),
        (Err(e), _) | (_, Err(e)) => {
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    match state.aggregator.summarize(window).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to aggregate payments");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `POST /purge-payments`
pub async fn purge_payments(State(state): State<AppState>) -> StatusCode {
    match state.aggregator.purge().await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            error!(error = %e, "Failed to purge payments");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
