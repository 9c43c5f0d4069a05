//! Input validation for order numbers
//!
//! [`OrderNumber`] is the only way for a caller-supplied number to reach the
//! ledger: construction runs the format check and the Luhn (mod 10) checksum.

use std::fmt;

/// Longest digit string accepted as an order number
pub const MAX_ORDER_NUMBER_LEN: usize = 64;

/// Validation errors for order numbers and withdrawal references
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum OrderNumberError {
    #[error("Order number is empty")]
    Empty,

    #[error("Invalid length for order number: expected 1-{max}, got {actual}")]
    TooLong { max: usize, actual: usize },

    #[error("Order number must contain digits only: '{0}'")]
    NotNumeric(String),

    #[error("Order number fails the Luhn checksum: '{0}'")]
    ChecksumMismatch(String),
}

/// Validated order number (digits only, Luhn checksum verified)
///
/// Fields are private to force validation through `parse()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Validate a raw order number
    ///
    /// # Validation Rules
    /// - Surrounding whitespace is ignored
    /// - Length: 1-64 ASCII digits
    /// - The Luhn checksum over the digits must be 0 (mod 10)
    ///
    /// # Examples
    /// ```
    /// use loyalty_mart::validation::OrderNumber;
    ///
    /// let number = OrderNumber::parse("79927398713").unwrap();
    /// assert_eq!(number.as_str(), "79927398713");
    ///
    /// assert!(OrderNumber::parse("79927398710").is_err()); // bad check digit
    /// ```
    pub fn parse(raw: &str) -> Result<Self, OrderNumberError> {
        let raw = raw.trim();

        if raw.is_empty() {
            return Err(OrderNumberError::Empty);
        }

        if raw.len() > MAX_ORDER_NUMBER_LEN {
            return Err(OrderNumberError::TooLong {
                max: MAX_ORDER_NUMBER_LEN,
                actual: raw.len(),
            });
        }

        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OrderNumberError::NotNumeric(raw.to_string()));
        }

        if !luhn_valid(raw) {
            return Err(OrderNumberError::ChecksumMismatch(raw.to_string()));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Luhn checksum over an ASCII digit string
///
/// Every second digit counting from the right (check digit excluded) is
/// doubled; doubled values above 9 have 9 subtracted.
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, b) in digits.bytes().rev().enumerate() {
        if !b.is_ascii_digit() {
            return false;
        }
        let mut d = u32::from(b - b'0');
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    !digits.is_empty() && sum % 10 == 0
}
