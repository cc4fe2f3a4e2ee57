#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::ops::Neg;
use std::ops::Sub;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

/// A decimal-2 monetary amount stored as integer minor units (cents).
///
/// Every amount crossing a service boundary is a JSON number with at most
/// two fractional digits; this type is the single place that rounding and
/// (de)serialization happen so no call site reimplements cent math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

/// Totals compared with this many minor units of slack are still "equal".
///
/// Line amounts are always rounded to the nearest cent before storage, so
/// in practice this only matters for sums computed from externally supplied
/// floating point input.
pub const BALANCE_EPSILON_MINOR: i64 = 0;

#[derive(Debug, Error)]
pub enum MoneyError {
    #[error("amount must be a finite number")]
    NotFinite,
    #[error("amount must be greater than zero")]
    NotPositive,
}

impl Money {
    pub const ZERO: Money = Money(0);

    #[must_use]
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Rounds a floating point decimal amount to the nearest cent.
    pub fn round2(value: f64) -> Result<Self, MoneyError> {
        if !value.is_finite() {
            return Err(MoneyError::NotFinite);
        }
        Ok(Self((value * 100.0).round() as i64))
    }

    #[must_use]
    pub fn minor(self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn require_positive(self) -> Result<Self, MoneyError> {
        if self.is_positive() {
            Ok(self)
        } else {
            Err(MoneyError::NotPositive)
        }
    }

    /// True when `self` and `other` differ by no more than
    /// [`BALANCE_EPSILON_MINOR`] minor units.
    #[must_use]
    pub fn approx_eq(self, other: Money) -> bool {
        (self.0 - other.0).abs() <= BALANCE_EPSILON_MINOR
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Money::round2(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round2_rounds_to_nearest_cent() {
        assert_eq!(Money::round2(100.004).unwrap().minor(), 10_000);
        assert_eq!(Money::round2(100.005).unwrap().minor(), 10_001);
    }

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(Money::from_minor(11_400).to_string(), "114.00");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-150).to_string(), "-1.50");
    }

    #[test]
    fn approx_eq_requires_exact_match_at_zero_epsilon() {
        let a = Money::from_minor(10_000);
        let b = Money::from_minor(9_999);
        assert!(!a.approx_eq(b));
        assert!(a.approx_eq(Money::from_minor(10_000)));
    }

    #[test]
    fn serde_round_trips_through_json_number() {
        let money = Money::from_minor(11_400);
        let json = serde_json::to_string(&money).expect("serialize");
        let back: Money = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(money, back);
    }

    #[test]
    fn require_positive_rejects_zero_and_negative() {
        assert!(Money::ZERO.require_positive().is_err());
        assert!(Money::from_minor(-1).require_positive().is_err());
        assert!(Money::from_minor(1).require_positive().is_ok());
    }
}
