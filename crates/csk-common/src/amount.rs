//! CSK Amount
//!
//! Satoshi-denominated amounts carried on sweeps.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Amount Error
#[derive(Debug, Error)]
pub enum Error {
    /// Amount overflow
    #[error("Amount Overflow")]
    AmountOverflow,
    /// Invalid amount
    #[error("Invalid Amount: {0}")]
    InvalidAmount(String),
}

/// Amount in satoshis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Amount zero
    pub const ZERO: Amount = Amount(0);

    /// Checked addition. Returns [`None`] on overflow.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction. Returns [`None`] on underflow.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .parse::<u64>()
            .map_err(|_| Error::InvalidAmount(s.to_owned()))?;
        Ok(Amount(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(width) = f.width() {
            write!(f, "{:width$}", self.0, width = width)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Amount> for u64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_checked_add() {
        assert_eq!(
            Amount::from(600).checked_add(Amount::from(400)),
            Some(Amount::from(1000))
        );
        assert_eq!(Amount::from(u64::MAX).checked_add(Amount::from(1)), None);
    }

    #[test]
    fn test_amount_checked_sub() {
        assert_eq!(
            Amount::from(1000).checked_sub(Amount::from(600)),
            Some(Amount::from(400))
        );
        assert_eq!(Amount::ZERO.checked_sub(Amount::from(1)), None);
    }

    #[test]
    fn test_amount_from_str() {
        assert_eq!(Amount::from_str("40000").ok(), Some(Amount::from(40000)));
        assert!(Amount::from_str("sats").is_err());
    }
}
