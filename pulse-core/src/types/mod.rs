//! Core type definitions.
//!
//! `NewType` wrappers that validate on construction so invalid values never
//! reach the hub's registries.

mod price;
mod symbol;

pub use price::Price;
pub use symbol::{Market, Symbol};

/// Validation error for `NewType` construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Price value is negative
    #[error("price cannot be negative: {0}")]
    NegativePrice(rust_decimal::Decimal),

    /// Symbol does not match any supported market format
    #[error("invalid symbol format: {0}")]
    InvalidSymbol(String),

    /// Symbol is empty
    #[error("symbol cannot be empty")]
    EmptySymbol,
}
