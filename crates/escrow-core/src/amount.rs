//! # Asset Amounts
//!
//! Amounts of the single custody asset, always in its smallest unit
//! (e.g. micro-units for a 6-decimal stablecoin). Range checks against the
//! configured cap are the state machine's job; this type only guarantees
//! an unsigned integer.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// An amount of the custody asset in smallest units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw smallest-unit amount.
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// Build an amount from whole asset units, scaling by `decimals`.
    ///
    /// Returns `None` on overflow.
    pub fn from_whole(whole: u64, decimals: u8) -> Option<Self> {
        10u64
            .checked_pow(u32::from(decimals))
            .and_then(|scale| whole.checked_mul(scale))
            .map(Self)
    }

    /// Access the raw smallest-unit value.
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Whether the amount is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Amount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ValidationError::InvalidAmount(s.to_string()))
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_whole_scales_by_decimals() {
        assert_eq!(Amount::from_whole(100, 6), Some(Amount::new(100_000_000)));
        assert_eq!(Amount::from_whole(5, 0), Some(Amount::new(5)));
    }

    #[test]
    fn from_whole_detects_overflow() {
        assert_eq!(Amount::from_whole(u64::MAX, 1), None);
        assert_eq!(Amount::from_whole(1, 20), None);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("12.5".parse::<Amount>().is_err());
        assert!("-3".parse::<Amount>().is_err());
        assert!("".parse::<Amount>().is_err());
        assert_eq!("50".parse::<Amount>().unwrap(), Amount::new(50));
    }

    #[test]
    fn zero_is_zero() {
        assert!(Amount::ZERO.is_zero());
        assert!(!Amount::new(1).is_zero());
    }

    #[test]
    fn serializes_as_bare_integer() {
        assert_eq!(serde_json::to_string(&Amount::new(42)).unwrap(), "42");
    }
}
