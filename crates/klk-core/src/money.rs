//! # Fixed-Point Money
//!
//! [`Money`] is an amount of Kenyan shillings held as integer cents.
//! Parsing accepts up to two decimal places (extra digits are truncated);
//! formatting always renders exactly two, e.g. `"1000.00"`.
//!
//! On the wire an amount is a string. Deserialization also accepts a JSON
//! number so that clients posting `1000` or `1000.5` are not rejected.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// An amount of money in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    /// Zero shillings.
    pub const ZERO: Money = Money(0);

    /// Construct from a cent count.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Construct from whole shillings.
    pub const fn from_shillings(shillings: i64) -> Self {
        Self(shillings * 100)
    }

    /// The amount in cents.
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// True when the amount is strictly greater than zero.
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Checked addition. `None` on overflow.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// `self` as a percentage of `total`, or 0 when `total` is not positive.
    pub fn percent_of(self, total: Money) -> f64 {
        if total.0 <= 0 {
            return 0.0;
        }
        self.0 as f64 / total.0 as f64 * 100.0
    }

    /// Floating-point shillings, for reporting only.
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Parse a decimal string into cents.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        parse_cents(s)
            .map(Money)
            .ok_or_else(|| ValidationError::InvalidAmount(s.to_string()))
    }

    /// Parse and require a strictly positive amount.
    pub fn parse_positive(s: &str) -> Result<Self, ValidationError> {
        let m = Self::parse(s)?;
        if !m.is_positive() {
            return Err(ValidationError::NonPositiveAmount);
        }
        Ok(m)
    }
}

fn parse_cents(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac_cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac[..2].parse().ok()?,
    };
    let cents = whole.checked_mul(100)?.checked_add(frac_cents)?;
    Some(if negative { -cents } else { cents })
}

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Money(cents)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MoneyVisitor;

        impl Visitor<'_> for MoneyVisitor {
            type Value = Money;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal amount as a string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
                Money::parse(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
                v.checked_mul(100)
                    .map(Money)
                    .ok_or_else(|| E::custom("amount overflows"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
                i64::try_from(v)
                    .ok()
                    .and_then(|v| v.checked_mul(100))
                    .map(Money)
                    .ok_or_else(|| E::custom("amount overflows"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
                Money::parse(&format!("{v:.2}")).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(MoneyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_whole_and_decimal() {
        assert_eq!(Money::parse("1000").unwrap().cents(), 100_000);
        assert_eq!(Money::parse("1000.5").unwrap().cents(), 100_050);
        assert_eq!(Money::parse("0.01").unwrap().cents(), 1);
        assert_eq!(Money::parse(" 12.345 ").unwrap().cents(), 1234);
        assert_eq!(Money::parse(".5").unwrap().cents(), 50);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Money::parse("").is_err());
        assert!(Money::parse("abc").is_err());
        assert!(Money::parse("1,000").is_err());
        assert!(Money::parse("1.2.3").is_err());
        assert!(Money::parse(".").is_err());
    }

    #[test]
    fn parse_positive_rejects_zero() {
        assert_eq!(
            Money::parse_positive("0"),
            Err(ValidationError::NonPositiveAmount)
        );
        assert!(Money::parse_positive("-5").is_err());
    }

    #[test]
    fn display_two_decimals() {
        assert_eq!(Money::from_cents(100_000).to_string(), "1000.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-150).to_string(), "-1.50");
    }

    #[test]
    fn percent_of_zero_total() {
        assert_eq!(Money::from_shillings(10).percent_of(Money::ZERO), 0.0);
        assert_eq!(
            Money::from_shillings(400).percent_of(Money::from_shillings(1000)),
            40.0
        );
    }

    #[test]
    fn serde_accepts_string_and_number() {
        let m: Money = serde_json::from_str("\"250.75\"").unwrap();
        assert_eq!(m.cents(), 25_075);
        let m: Money = serde_json::from_str("400").unwrap();
        assert_eq!(m.cents(), 40_000);
        let m: Money = serde_json::from_str("12.5").unwrap();
        assert_eq!(m.cents(), 1250);
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"12.50\"");
    }

    #[test]
    fn sum_of_amounts() {
        let total: Money = [Money::from_shillings(400), Money::from_shillings(600)]
            .iter()
            .sum();
        assert_eq!(total, Money::from_shillings(1000));
    }

    proptest! {
        #[test]
        fn display_then_parse_is_identity(cents in -1_000_000_000i64..1_000_000_000i64) {
            let m = Money::from_cents(cents);
            prop_assert_eq!(Money::parse(&m.to_string()).unwrap(), m);
        }
    }
}
