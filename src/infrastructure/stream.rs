//! Names of the payment stream, shared by every queue adapter.

/// The JetStream stream holding accepted payments.
pub const PAYMENT_STREAM: &str = "PAYMENT";
/// Subject filter of the payment stream.
pub const PAYMENT_SUBJECTS: &str = "PAYMENT.*";
/// Subject ingress publishes new payments on.
pub const PAYMENT_CREATED: &str = "PAYMENT.created";
/// The single durable consumer group all workers share.
pub const CONSUMER_GROUP: &str = "worker-group";

/// Token-wise subject match: `*` matches one token, a trailing `>` matches the rest.
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    let mut subject_tokens = subject.split('.');
    for token in filter.split('.') {
        match (token, subject_tokens.next()) {
            (">", Some(rest)) => return !rest.is_empty(),
            ("*", Some(t)) if !t.is_empty() => {}
            (f, Some(t)) if f == t => {}
            _ => return false,
        }
    }
    subject_tokens.next().is_none()
}
