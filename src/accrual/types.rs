use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{MAX_LEDGER_AMOUNT, OrderTransition};

/// Settlement verdict of the accrual system for one order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualOutcome {
    /// Order not registered upstream yet
    Unregistered,
    /// Registered, accrual still being computed
    Pending,
    /// Final, with the amount to credit (zero allowed)
    Settled(Decimal),
    /// Rejected permanently
    Rejected,
}

impl AccrualOutcome {
    /// Order transition this verdict asks for; `None` leaves the order as is
    pub fn transition(&self) -> Option<OrderTransition> {
        match self {
            AccrualOutcome::Unregistered => None,
            AccrualOutcome::Pending => Some(OrderTransition::processing()),
            AccrualOutcome::Settled(amount) => Some(OrderTransition::processed(*amount)),
            AccrualOutcome::Rejected => Some(OrderTransition::invalid()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreReply {
    Scored(AccrualOutcome),
    /// Upstream asked us to slow down; not an error
    RateLimited,
}

#[derive(Debug, Error)]
pub enum AccrualError {
    #[error("Accrual request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Accrual system answered HTTP {0}")]
    UnexpectedStatus(u16),

    #[error("Unknown accrual status: {0}")]
    UnknownStatus(String),

    #[error("Accrual reply for order {got} while asking for {expected}")]
    OrderMismatch { expected: String, got: String },

    #[error("Accrual amount out of range: {0}")]
    AccrualOutOfRange(Decimal),

    #[error("Malformed accrual reply: {0}")]
    Decode(String),

    #[error("Invalid accrual system address: {0}")]
    InvalidAddress(String),

    #[error("Accrual request timed out")]
    Timeout,
}

impl From<tokio::time::error::Elapsed> for AccrualError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AccrualError::Timeout
    }
}

/// Source of settlement verdicts
#[async_trait]
pub trait AccrualSource: Send + Sync {
    async fn get_score(&self, order: &str) -> Result<ScoreReply, AccrualError>;
}

/// `GET /api/orders/{number}` response body
#[derive(Debug, Deserialize)]
pub struct AccrualReply {
    pub order: String,
    pub status: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub accrual: Option<Decimal>,
}

impl AccrualReply {
    pub fn outcome(&self) -> Result<AccrualOutcome, AccrualError> {
        match self.status.as_str() {
            "REGISTERED" | "PROCESSING" => Ok(AccrualOutcome::Pending),
            "PROCESSED" => {
                let accrual = self.accrual.unwrap_or(Decimal::ZERO);
                if accrual < Decimal::ZERO || accrual >= MAX_LEDGER_AMOUNT {
                    return Err(AccrualError::AccrualOutOfRange(accrual));
                }
                Ok(AccrualOutcome::Settled(accrual))
            }
            "INVALID" => Ok(AccrualOutcome::Rejected),
            other => Err(AccrualError::UnknownStatus(other.to_string())),
        }
    }
}

/// Decode a 200 body and check it answers for `order`
pub fn parse_reply(order: &str, body: &[u8]) -> Result<AccrualOutcome, AccrualError> {
    let reply: AccrualReply =
        serde_json::from_slice(body).map_err(|e| AccrualError::Decode(e.to_string()))?;
    if reply.order != order {
        return Err(AccrualError::OrderMismatch {
            expected: order.to_string(),
            got: reply.order,
        });
    }
    reply.outcome()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (r#"{"order":"1","status":"REGISTERED"}"#, AccrualOutcome::Pending),
            (r#"{"order":"1","status":"PROCESSING"}"#, AccrualOutcome::Pending),
            (r#"{"order":"1","status":"INVALID"}"#, AccrualOutcome::Rejected),
            (
                r#"{"order":"1","status":"PROCESSED","accrual":500.5}"#,
                AccrualOutcome::Settled(dec!(500.5)),
            ),
        ];
        for (body, expected) in cases {
            assert_eq!(parse_reply("1", body.as_bytes()).unwrap(), expected, "{}", body);
        }
    }

    #[test]
    fn test_processed_without_accrual_settles_zero() {
        let outcome = parse_reply("1", br#"{"order":"1","status":"PROCESSED"}"#).unwrap();
        assert_eq!(outcome, AccrualOutcome::Settled(Decimal::ZERO));
        let transition = outcome.transition().unwrap();
        assert_eq!(transition.status, OrderStatus::Processed);
        assert_eq!(transition.credit(), Decimal::ZERO);
    }

    #[test]
    fn test_settled_amount_must_fit_the_ledger() {
        let negative = parse_reply("1", br#"{"order":"1","status":"PROCESSED","accrual":-50}"#);
        assert!(matches!(negative, Err(AccrualError::AccrualOutOfRange(a)) if a == dec!(-50)));

        let huge = parse_reply("1", br#"{"order":"1","status":"PROCESSED","accrual":1e12}"#);
        assert!(matches!(huge, Err(AccrualError::AccrualOutOfRange(_))));

        let top = parse_reply(
            "1",
            br#"{"order":"1","status":"PROCESSED","accrual":999999999999.5}"#,
        )
        .unwrap();
        assert_eq!(top, AccrualOutcome::Settled(dec!(999999999999.5)));
    }

    #[test]
    fn test_unknown_status_is_protocol_error() {
        let err = parse_reply("1", br#"{"order":"1","status":"LOST"}"#).unwrap_err();
        assert!(matches!(err, AccrualError::UnknownStatus(s) if s == "LOST"));
    }

    #[test]
    fn test_mismatched_order_is_rejected() {
        let err = parse_reply("1", br#"{"order":"2","status":"INVALID"}"#).unwrap_err();
        assert!(matches!(err, AccrualError::OrderMismatch { .. }));
    }

    #[test]
    fn test_garbage_body_is_decode_error() {
        assert!(matches!(
            parse_reply("1", b"not json"),
            Err(AccrualError::Decode(_))
        ));
    }

    #[test]
    fn test_unregistered_leaves_order_alone() {
        assert!(AccrualOutcome::Unregistered.transition().is_none());
        assert_eq!(
            AccrualOutcome::Pending.transition().unwrap().status,
            OrderStatus::Processing
        );
    }
}
