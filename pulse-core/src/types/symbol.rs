//! Symbol type for representing market tickers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use super::ValidationError;

static A_SHARE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{6}$").unwrap());
static HONG_KONG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4,5})(\.HK)?$").unwrap());
static US: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{1,5}$").unwrap());

/// Market a ticker trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    /// Shanghai / Shenzhen A-shares (six digit codes)
    AShare,
    /// Hong Kong exchange (four or five digit codes, `.HK` suffix)
    HongKong,
    /// US exchanges (one to five letter tickers)
    Us,
}

impl Market {
    /// Returns the market as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AShare => "a_share",
            Self::HongKong => "hong_kong",
            Self::Us => "us",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbol type - a validated, normalized market ticker.
///
/// Input is trimmed and upper-cased before matching. Hong Kong codes always
/// carry the `.HK` suffix after normalization, so `"700"`-style inputs with
/// fewer than four digits are rejected rather than guessed at.
///
/// # Examples
///
/// ```
/// use pulse_core::types::{Market, Symbol};
///
/// let symbol = Symbol::new("aapl").unwrap();
/// assert_eq!(symbol.as_str(), "AAPL");
/// assert_eq!(symbol.market(), Market::Us);
///
/// let hk = Symbol::new("00700").unwrap();
/// assert_eq!(hk.as_str(), "00700.HK");
///
/// assert!(Symbol::new("").is_err());
/// assert!(Symbol::new("NOT-A-TICKER").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new `Symbol`, normalizing the input.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptySymbol` if the string is blank.
    /// Returns `ValidationError::InvalidSymbol` if no market format matches.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let raw = value.as_ref().trim();
        if raw.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        let upper = raw.to_ascii_uppercase();

        if A_SHARE.is_match(&upper) {
            return Ok(Self(upper));
        }
        if let Some(caps) = HONG_KONG.captures(&upper) {
            return Ok(Self(format!("{}.HK", &caps[1])));
        }
        if US.is_match(&upper) {
            return Ok(Self(upper));
        }

        Err(ValidationError::InvalidSymbol(raw.to_string()))
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the market this symbol belongs to.
    #[must_use]
    pub fn market(&self) -> Market {
        if self.0.ends_with(".HK") {
            Market::HongKong
        } else if self.0.bytes().all(|b| b.is_ascii_digit()) {
            Market::AShare
        } else {
            Market::Us
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}
