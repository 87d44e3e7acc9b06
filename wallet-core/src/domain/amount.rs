//! Amount domain model - money in integer minor units

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Number of fractional digits carried by one major unit (cents)
pub const MINOR_UNIT_SCALE: u32 = 2;

/// A monetary amount stored as a count of minor units
///
/// Balances and transfer amounts never pass through binary floating point.
/// Text input is parsed with `rust_decimal` and scaled to cents; anything
/// finer than a cent is rejected rather than rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Create an amount from minor units (e.g. `1234` = 12.34)
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Raw minor units
    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Convert a decimal major-unit value to minor units
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        let normalized = value.normalize();
        if normalized.scale() > MINOR_UNIT_SCALE {
            return Err(Error::InvalidAmount(format!(
                "{} has more than {} decimal places",
                value, MINOR_UNIT_SCALE
            )));
        }

        let scaled = normalized
            .checked_mul(Decimal::from(10i64.pow(MINOR_UNIT_SCALE)))
            .and_then(|d| d.to_i64())
            .ok_or_else(|| Error::InvalidAmount(format!("{} is out of range", value)))?;

        Ok(Self(scaled))
    }

    /// Decimal major-unit representation
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, MINOR_UNIT_SCALE)
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or_else(|| Error::InvalidAmount("balance would overflow".to_string()))
    }

    pub fn checked_sub(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or_else(|| Error::InvalidAmount("balance would overflow".to_string()))
    }

    /// Reject zero and negative amounts
    pub fn ensure_positive(self) -> Result<Amount> {
        if self.is_positive() {
            Ok(self)
        } else {
            Err(Error::InvalidAmount(format!("{} must be greater than zero", self)))
        }
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let value = Decimal::from_str(trimmed)
            .map_err(|_| Error::InvalidAmount(format!("'{}' is not a number", trimmed)))?;
        Self::from_decimal(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}
