//! Order numbers as issued by the merchant: decimal digits carrying a Luhn
//! check digit.
//!
//! Numbers are kept as strings end to end. They routinely exceed `u64`
//! (loyalty cards, long receipt ids), so the checksum walks the digits
//! instead of parsing an integer.

use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A Luhn-valid order number.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Validate and wrap `raw`. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let s = raw.trim();
        if s.is_empty() {
            bail!("order number is empty");
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            bail!("order number must contain only digits: {s:?}");
        }
        if !luhn_valid(s) {
            bail!("order number fails Luhn checksum: {s}");
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for OrderNumber {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OrderNumber {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        OrderNumber::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Luhn mod-10 check over an ASCII digit string.
///
/// Returns `false` for empty input or any non-digit byte.
pub fn luhn_valid(digits: &str) -> bool {
    if digits.is_empty() {
        return false;
    }
    let mut sum = 0u32;
    for (i, b) in digits.bytes().rev().enumerate() {
        if !b.is_ascii_digit() {
            return false;
        }
        let mut d = u32::from(b - b'0');
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_valid_numbers() {
        for n in ["1234567890123452", "7376351891", "6512136380", "79927398713", "0"] {
            assert!(luhn_valid(n), "{n} should pass");
            assert!(OrderNumber::parse(n).is_ok());
        }
    }

    #[test]
    fn rejects_bad_checksum() {
        assert!(!luhn_valid("1234567890123456"));
        assert!(!luhn_valid("1234567890"));
        assert!(OrderNumber::parse("1234567890").is_err());
    }

    #[test]
    fn rejects_non_digits_and_empty() {
        assert!(OrderNumber::parse("").is_err());
        assert!(OrderNumber::parse("   ").is_err());
        assert!(OrderNumber::parse("12a4").is_err());
        assert!(OrderNumber::parse("-79927398713").is_err());
    }

    #[test]
    fn handles_numbers_longer_than_u64() {
        // 40 digits; valid check digit computed for the 39-digit prefix.
        let prefix = "123456789012345678901234567890123456789";
        let check = (0..10)
            .map(|d| format!("{prefix}{d}"))
            .find(|s| luhn_valid(s))
            .unwrap();
        assert_eq!(OrderNumber::parse(&check).unwrap().as_str(), check);
    }

    #[test]
    fn trims_whitespace() {
        let n = OrderNumber::parse(" 79927398713\n").unwrap();
        assert_eq!(n.as_str(), "79927398713");
    }

    #[test]
    fn serde_rejects_invalid_numbers() {
        let ok: OrderNumber = serde_json::from_str("\"79927398713\"").unwrap();
        assert_eq!(ok.to_string(), "79927398713");
        assert!(serde_json::from_str::<OrderNumber>("\"79927398710\"").is_err());
    }
}
