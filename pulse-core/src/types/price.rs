//! Price type for representing quoted prices.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// Price type - a non-negative quoted price.
///
/// # Examples
///
/// ```
/// use pulse_core::types::Price;
/// use rust_decimal_macros::dec;
///
/// let price = Price::new(dec!(187.25)).unwrap();
/// assert_eq!(price.as_decimal(), dec!(187.25));
/// assert!(Price::new(dec!(-1)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Zero price constant.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Creates a new `Price` from a `Decimal` value.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NegativePrice` if the value is negative.
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value < Decimal::ZERO {
            return Err(ValidationError::NegativePrice(value));
        }
        Ok(Self(value))
    }

    /// Returns the inner `Decimal` value.
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Absolute change from `previous` to `self`.
    #[must_use]
    pub fn change_from(&self, previous: Self) -> Decimal {
        self.0 - previous.0
    }

    /// Percentage change from `previous` to `self`, rounded to two places.
    ///
    /// Returns zero when `previous` is zero.
    #[must_use]
    pub fn change_percent_from(&self, previous: Self) -> Decimal {
        if previous.0.is_zero() {
            return Decimal::ZERO;
        }
        ((self.0 - previous.0) / previous.0 * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
