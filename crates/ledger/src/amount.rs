//! Currency amounts in the ledger's smallest unit.

use core::fmt;
use core::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use jobportal_core::{DomainError, ValueObject};

/// Highest decimal count whose scale factor still fits in a `u128`.
const MAX_DECIMALS: u32 = 38;

/// Non-negative amount in the smallest currency unit (wei-like).
///
/// Serialized as a decimal string so values beyond `u64` survive JSON. Plain
/// integers are accepted when deserializing (TOML settings, hand-written
/// scripts).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

impl ValueObject for Amount {}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(units: u128) -> Self {
        Self(units)
    }

    pub const fn units(self) -> u128 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    pub fn saturating_add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }

    /// Render as a fixed-point string with `decimals` fractional digits.
    ///
    /// Trailing zeros are trimmed but at least one fractional digit is kept,
    /// so `10^18` with 18 decimals renders as `"1.0"`. Decimals above 38 are
    /// clamped.
    pub fn format_units(self, decimals: u32) -> String {
        let decimals = decimals.min(MAX_DECIMALS);
        if decimals == 0 {
            return self.0.to_string();
        }

        let scale = 10u128.pow(decimals);
        let whole = self.0 / scale;
        let frac = format!("{:0width$}", self.0 % scale, width = decimals as usize);
        let frac = frac.trim_end_matches('0');

        if frac.is_empty() {
            format!("{whole}.0")
        } else {
            format!("{whole}.{frac}")
        }
    }

    /// Parse a fixed-point string such as `"0.01"` into smallest units.
    pub fn parse_units(input: &str, decimals: u32) -> Result<Amount, DomainError> {
        let decimals = decimals.min(MAX_DECIMALS);
        let input = input.trim();
        let (whole, frac) = input.split_once('.').unwrap_or((input, ""));

        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
            return Err(DomainError::validation(format!("malformed amount '{input}'")));
        }
        if frac.len() > decimals as usize {
            return Err(DomainError::validation(format!(
                "amount '{input}' has more than {decimals} decimals"
            )));
        }

        let overflow = || DomainError::validation(format!("amount '{input}' is too large"));
        let scale = 10u128.pow(decimals);
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let frac_units: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = decimals as usize);
            padded.parse().map_err(|_| overflow())?
        };

        whole
            .checked_mul(scale)
            .and_then(|w| w.checked_add(frac_units))
            .map(Amount)
            .ok_or_else(overflow)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Amount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u128>()
            .map(Amount)
            .map_err(|e| DomainError::validation(format!("invalid amount '{s}': {e}")))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative integer or a decimal string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount::from(v))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
                Ok(Amount(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                u64::try_from(v)
                    .map(Amount::from)
                    .map_err(|_| E::custom(format!("amount cannot be negative: {v}")))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn formats_like_ether() {
        assert_eq!(Amount::ZERO.format_units(18), "0.0");
        assert_eq!(Amount::new(WEI_PER_ETHER).format_units(18), "1.0");
        assert_eq!(Amount::new(WEI_PER_ETHER / 100).format_units(18), "0.01");
        assert_eq!(Amount::new(10).format_units(18), "0.00000000000000001");
        assert_eq!(Amount::new(1_500).format_units(3), "1.5");
        assert_eq!(Amount::new(42).format_units(0), "42");
    }

    #[test]
    fn parses_fixed_point() {
        assert_eq!(
            Amount::parse_units("0.01", 18).unwrap(),
            Amount::new(WEI_PER_ETHER / 100)
        );
        assert_eq!(Amount::parse_units("2", 3).unwrap(), Amount::new(2_000));
        assert_eq!(Amount::parse_units(".5", 1).unwrap(), Amount::new(5));
        assert!(Amount::parse_units("1.2345", 3).is_err());
        assert!(Amount::parse_units("-1", 3).is_err());
        assert!(Amount::parse_units(".", 3).is_err());
    }

    #[test]
    fn checked_arithmetic_does_not_wrap() {
        let max = Amount::new(u128::MAX);
        assert_eq!(max.checked_add(Amount::new(1)), None);
        assert_eq!(Amount::ZERO.checked_sub(Amount::new(1)), None);
        assert_eq!(Amount::new(5).saturating_sub(Amount::new(9)), Amount::ZERO);
    }

    #[test]
    fn serializes_as_string_and_accepts_integers() {
        let big = Amount::new(u128::MAX);
        let json = serde_json::to_string(&big).unwrap();
        assert_eq!(json, format!("\"{}\"", u128::MAX));
        assert_eq!(serde_json::from_str::<Amount>(&json).unwrap(), big);

        assert_eq!(serde_json::from_str::<Amount>("10").unwrap(), Amount::new(10));
        assert!(serde_json::from_str::<Amount>("-3").is_err());
    }
}
