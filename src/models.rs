//! Ledger domain types
//!
//! - [`OrderStatus`]: order lifecycle (`NEW → PROCESSING → PROCESSED | INVALID`)
//! - [`Order`], [`Balance`], [`Withdrawal`]: rows as rendered to the gateway
//! - [`OrderTransition`], [`OrderUpdate`]: settlement results applied by the reconciler

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal user identifier (`users.user_id`)
pub type UserId = i64;

/// Scale used for every persisted amount (`NUMERIC(14,2)`)
pub const AMOUNT_SCALE: u32 = 2;

/// Exclusive upper bound of a `NUMERIC(14,2)` amount (10^12)
pub const MAX_LEDGER_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Round an amount to the ledger's two-decimal granularity.
pub fn to_ledger_amount(amount: Decimal) -> Decimal {
    amount.round_dp(AMOUNT_SCALE)
}

/// Order lifecycle states
///
/// IDs are stored as SMALLINT in `orders.status`.
/// Terminal states: PROCESSED (3), INVALID (2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum OrderStatus {
    /// Submitted, accrual system not asked yet
    New = 0,

    /// Registered upstream, accrual still being computed
    Processing = 1,

    /// Terminal: rejected upstream, no balance effect
    Invalid = 2,

    /// Terminal: accrual computed and credited to the owner
    Processed = 3,
}

impl OrderStatus {
    /// Classes the reconciler drains, in pass order
    pub const PENDING: [OrderStatus; 2] = [OrderStatus::New, OrderStatus::Processing];

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(OrderStatus::New),
            1 => Some(OrderStatus::Processing),
            2 => Some(OrderStatus::Invalid),
            3 => Some(OrderStatus::Processed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order as listed to its owner
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub number: String,
    #[serde(skip)]
    pub user_id: UserId,
    pub status: OrderStatus,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

/// Spendable balance and lifetime withdrawals of one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Balance {
    #[serde(with = "rust_decimal::serde::float")]
    pub current: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub withdrawn: Decimal,
}

/// Recorded withdrawal (debit against the balance)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Withdrawal {
    pub order: String,
    #[serde(skip)]
    pub user_id: UserId,
    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

/// Status change reported by the accrual system for one order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTransition {
    pub status: OrderStatus,
    pub accrual: Option<Decimal>,
}

impl OrderTransition {
    pub fn processing() -> Self {
        Self {
            status: OrderStatus::Processing,
            accrual: None,
        }
    }

    pub fn invalid() -> Self {
        Self {
            status: OrderStatus::Invalid,
            accrual: None,
        }
    }

    pub fn processed(accrual: Decimal) -> Self {
        Self {
            status: OrderStatus::Processed,
            accrual: Some(to_ledger_amount(accrual)),
        }
    }

    /// Accrual to credit; zero when a PROCESSED result carries no amount
    pub fn credit(&self) -> Decimal {
        match self.status {
            OrderStatus::Processed => self.accrual.map(to_ledger_amount).unwrap_or(Decimal::ZERO),
            _ => Decimal::ZERO,
        }
    }
}

/// Transition addressed to a specific order number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
    pub number: String,
    pub transition: OrderTransition,
}

impl OrderUpdate {
    pub fn new(number: impl Into<String>, transition: OrderTransition) -> Self {
        Self {
            number: number.into(),
            transition,
        }
    }
}
