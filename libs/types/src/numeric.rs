//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point
//! errors). Both types reject negative values at construction; rounding
//! to a market's declared scale uses HALF-UP.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use thiserror::Error;

/// Error parsing a decimal value from a string.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("Invalid decimal literal: {0}")]
    InvalidLiteral(String),

    #[error("Negative value not allowed: {0}")]
    Negative(Decimal),
}

/// A non-negative price expressed as a fixed-point decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Zero price.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Create from an unsigned integer.
    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Parse from a decimal string literal.
    pub fn from_str(s: &str) -> Result<Self, NumericError> {
        let d = Decimal::from_str_exact(s)
            .map_err(|_| NumericError::InvalidLiteral(s.to_string()))?;
        Self::try_new(d).ok_or(NumericError::Negative(d))
    }

    /// Create from a Decimal, returning None if negative.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Get the inner Decimal.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whether the price is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Round to `scale` decimal places, HALF-UP.
    pub fn quantize(&self, scale: u32) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero),
        )
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative quantity of base asset expressed as a fixed-point decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Zero quantity.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Create from an unsigned integer.
    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Parse from a decimal string literal.
    pub fn from_str(s: &str) -> Result<Self, NumericError> {
        let d = Decimal::from_str_exact(s)
            .map_err(|_| NumericError::InvalidLiteral(s.to_string()))?;
        Self::try_new(d).ok_or(NumericError::Negative(d))
    }

    /// Create from a Decimal, returning None if negative.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Get the inner Decimal.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whether the quantity is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Round to `scale` decimal places, HALF-UP.
    pub fn quantize(&self, scale: u32) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// The smaller of two quantities.
    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Subtract, saturating at zero.
    pub fn saturating_sub(self, other: Self) -> Self {
        Self::try_new(self.0 - other.0).unwrap_or_else(Self::zero)
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
