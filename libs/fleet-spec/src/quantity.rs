//! Resource quantities (`500m`, `0.5`, `512Mi`, `2G`).
//!
//! Quantities are normalised to thousandths of the base unit so CPU and
//! memory can be compared without floating point. Fractional results are
//! rounded up, matching how the orchestrator treats sub-unit requests.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::QuantityError;

/// A parsed resource quantity.
///
/// Equality and ordering are by normalised value, so `1Gi == 1024Mi`.
/// The original spelling is kept for emission.
#[derive(Debug, Clone)]
pub struct Quantity {
    raw: String,
    millis: u128,
}

impl Quantity {
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(QuantityError::Empty);
        }

        let split = raw
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(raw.len());
        let (number, suffix) = raw.split_at(split);

        let multiplier = suffix_millis(suffix).ok_or_else(|| QuantityError::UnknownSuffix {
            input: raw.to_string(),
            suffix: suffix.to_string(),
        })?;

        let (whole, fraction) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(QuantityError::InvalidNumber(raw.to_string()));
        }
        if fraction.contains('.') {
            return Err(QuantityError::InvalidNumber(raw.to_string()));
        }

        let overflow = || QuantityError::Overflow(raw.to_string());
        let digits = format!("{whole}{fraction}");
        let mantissa: u128 = digits.parse().map_err(|_| overflow())?;
        let scale = 10u128
            .checked_pow(fraction.len() as u32)
            .ok_or_else(overflow)?;

        let scaled = mantissa.checked_mul(multiplier).ok_or_else(overflow)?;
        let millis = scaled.div_ceil(scale);

        Ok(Self {
            raw: raw.to_string(),
            millis,
        })
    }

    /// Value in thousandths of the base unit (millicores, millibytes).
    pub fn millis(&self) -> u128 {
        self.millis
    }

    /// The quantity as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn suffix_millis(suffix: &str) -> Option<u128> {
    const KI: u128 = 1 << 10;
    let millis = match suffix {
        "" => 1_000,
        "m" => 1,
        "k" => 1_000_000,
        "M" => 1_000_000_000,
        "G" => 1_000_000_000_000,
        "T" => 1_000_000_000_000_000,
        "P" => 1_000_000_000_000_000_000,
        "E" => 1_000_000_000_000_000_000_000,
        "Ki" => KI * 1_000,
        "Mi" => KI.pow(2) * 1_000,
        "Gi" => KI.pow(3) * 1_000,
        "Ti" => KI.pow(4) * 1_000,
        "Pi" => KI.pow(5) * 1_000,
        "Ei" => KI.pow(6) * 1_000,
        _ => return None,
    };
    Some(millis)
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.millis == other.millis
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millis.cmp(&other.millis)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        Quantity::parse(s).unwrap()
    }

    #[test]
    fn cpu_units_normalise_to_millicores() {
        assert_eq!(q("500m").millis(), 500);
        assert_eq!(q("0.5").millis(), 500);
        assert_eq!(q("2").millis(), 2_000);
        assert_eq!(q("1.25").millis(), 1_250);
        assert_eq!(q("0.5"), q("500m"));
    }

    #[test]
    fn memory_units_compare_across_suffixes() {
        assert_eq!(q("1Gi"), q("1024Mi"));
        assert!(q("1G") < q("1Gi"));
        assert!(q("512Mi") < q("1Gi"));
        assert_eq!(q("1.5Gi"), q("1536Mi"));
        assert_eq!(q("1k").millis(), 1_000_000);
    }

    #[test]
    fn fractional_millis_round_up() {
        assert_eq!(q("0.0005").millis(), 1);
    }

    #[test]
    fn keeps_original_spelling() {
        assert_eq!(q(" 250m ").to_string(), "250m");
    }

    #[test]
    fn rejects_malformed_quantities() {
        assert_eq!(Quantity::parse(""), Err(QuantityError::Empty));
        assert!(matches!(
            Quantity::parse("12Qi"),
            Err(QuantityError::UnknownSuffix { .. })
        ));
        assert!(matches!(
            Quantity::parse("-1"),
            Err(QuantityError::UnknownSuffix { .. })
        ));
        assert!(matches!(
            Quantity::parse("Mi"),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            Quantity::parse("1.2.3"),
            Err(QuantityError::InvalidNumber(_))
        ));
    }
}
