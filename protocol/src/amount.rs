//! # Amounts & Input Guards
//!
//! The ledger counts everything in stroops: signed 64-bit integers with an
//! implied seven decimal places. Floats are fine for *reading* a request
//! body, but they never reach a signed transaction. Every monetary value
//! passes through [`to_fixed_amount`] or [`Amount::parse`] first, and after
//! that it's integers all the way down.
//!
//! Request bodies are loose: a bottle count may arrive as `5000` or as
//! `"5000"`. [`AmountInput`] accepts both and the guards here turn them into
//! properly typed values, or a [`AmountError`] naming the offending field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AMOUNT_DECIMALS, STROOPS_PER_UNIT};

/// Highest precision `to_fixed_amount` will render. Keeps the scaled
/// mantissa comfortably inside a `u128`.
const MAX_DECIMALS: u32 = 18;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// A monetary value that can't be represented on the ledger.
    #[error("invalid amount for {field}: {reason}")]
    InvalidAmount { field: String, reason: String },

    /// A non-monetary numeric input that failed its guard.
    #[error("{field} {reason}")]
    Validation { field: String, reason: String },
}

impl AmountError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        AmountError::InvalidAmount {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    fn validation(field: &str, reason: impl Into<String>) -> Self {
        AmountError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// The field the error is about.
    pub fn field(&self) -> &str {
        match self {
            AmountError::InvalidAmount { field, .. } | AmountError::Validation { field, .. } => {
                field
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AmountInput
// ---------------------------------------------------------------------------

/// A number as it arrives over the wire: JSON number or numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

impl From<f64> for AmountInput {
    fn from(v: f64) -> Self {
        AmountInput::Number(v)
    }
}

impl From<u64> for AmountInput {
    fn from(v: u64) -> Self {
        AmountInput::Number(v as f64)
    }
}

impl From<&str> for AmountInput {
    fn from(v: &str) -> Self {
        AmountInput::Text(v.to_string())
    }
}

impl From<String> for AmountInput {
    fn from(v: String) -> Self {
        AmountInput::Text(v)
    }
}

impl AmountInput {
    /// Lossy float view. Strings must be a complete number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AmountInput::Number(v) => Some(*v),
            AmountInput::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return None;
                }
                t.parse::<f64>().ok()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Decimal parsing
// ---------------------------------------------------------------------------

/// Split a plain decimal literal into (negative, integer digits, fraction
/// digits). Exponent forms return `None` and take the float path.
fn split_decimal(s: &str) -> Option<(bool, &str, &str)> {
    let (negative, body) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let (int, frac) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int.is_empty() && frac.is_empty() {
        return None;
    }
    let digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if !digits(int) || !digits(frac) {
        return None;
    }
    Some((negative, int, frac))
}

/// Scale a decimal literal to `decimals` places, rounding half-up on the
/// first dropped digit. Exact: no binary floating point involved.
fn scale_decimal(int: &str, frac: &str, decimals: u32) -> Option<u128> {
    let mut value: u128 = 0;
    for b in int.bytes() {
        value = value.checked_mul(10)?.checked_add(u128::from(b - b'0'))?;
    }
    let frac_bytes = frac.as_bytes();
    for i in 0..decimals as usize {
        let d = frac_bytes.get(i).map(|b| b - b'0').unwrap_or(0);
        value = value.checked_mul(10)?.checked_add(u128::from(d))?;
    }
    if let Some(next) = frac_bytes.get(decimals as usize) {
        if *next >= b'5' {
            value = value.checked_add(1)?;
        }
    }
    Some(value)
}

fn render_scaled(value: u128, decimals: u32) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let unit = 10u128.pow(decimals);
    format!(
        "{}.{:0width$}",
        value / unit,
        value % unit,
        width = decimals as usize
    )
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Render a monetary value with exactly `decimals` places.
///
/// Numeric strings without an exponent are scaled exactly. JSON numbers and
/// exponent forms go through Rust's correctly rounded float formatting.
/// Negative, non-finite or unparseable input is an
/// [`AmountError::InvalidAmount`].
pub fn to_fixed_amount(
    value: &AmountInput,
    decimals: u32,
    field: &str,
) -> Result<String, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::invalid(
            field,
            format!("precision {decimals} exceeds {MAX_DECIMALS} decimals"),
        ));
    }

    let text = match value {
        AmountInput::Number(v) => return fixed_from_f64(*v, decimals, field),
        AmountInput::Text(s) => s.trim(),
    };
    if text.is_empty() {
        return Err(AmountError::invalid(field, "value is empty"));
    }

    match split_decimal(text) {
        Some((negative, int, frac)) => {
            // Checked on the digits, so a tiny negative can't round to zero.
            if negative && int.bytes().chain(frac.bytes()).any(|b| b != b'0') {
                return Err(AmountError::invalid(field, "must be non-negative"));
            }
            let scaled = scale_decimal(int, frac, decimals)
                .ok_or_else(|| AmountError::invalid(field, "value is too large"))?;
            Ok(render_scaled(scaled, decimals))
        }
        None => {
            let parsed: f64 = text
                .parse()
                .map_err(|_| AmountError::invalid(field, format!("'{text}' is not a number")))?;
            fixed_from_f64(parsed, decimals, field)
        }
    }
}

fn fixed_from_f64(v: f64, decimals: u32, field: &str) -> Result<String, AmountError> {
    if !v.is_finite() {
        return Err(AmountError::invalid(field, "must be a finite number"));
    }
    if v < 0.0 {
        return Err(AmountError::invalid(field, "must be non-negative"));
    }
    // `-0.0` formats with a sign; normalise it away.
    let v = if v == 0.0 { 0.0 } else { v };
    Ok(format!("{:.*}", decimals as usize, v))
}

/// Require a whole number greater than zero.
pub fn ensure_positive_integer(value: &AmountInput, field: &str) -> Result<u64, AmountError> {
    let parsed = value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AmountError::validation(field, "must be a positive number"))?;
    if parsed <= 0.0 {
        return Err(AmountError::validation(field, "must be a positive number"));
    }
    if parsed.fract() != 0.0 {
        return Err(AmountError::validation(field, "must be a whole number"));
    }
    if parsed > u64::MAX as f64 {
        return Err(AmountError::validation(field, "is too large"));
    }
    Ok(parsed as u64)
}

/// Require a finite number, optionally at or above `min`.
pub fn ensure_number(
    value: &AmountInput,
    field: &str,
    min: Option<f64>,
) -> Result<f64, AmountError> {
    let parsed = value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AmountError::validation(field, "must be a valid number"))?;
    if let Some(min) = min {
        if parsed < min {
            return Err(AmountError::validation(field, format!("must be >= {min}")));
        }
    }
    Ok(parsed)
}

/// Total token supply for a lot: `bottle_count × units_per_bottle`, rendered
/// at ledger precision.
pub fn derive_token_supply(bottle_count: u64, units_per_bottle: f64) -> Result<String, AmountError> {
    let total = bottle_count as f64 * units_per_bottle;
    if !total.is_finite() || total <= 0.0 {
        return Err(AmountError::validation(
            "tokenSupply",
            "must be positive (bottleCount × unitsPerBottle)",
        ));
    }
    to_fixed_amount(&AmountInput::Number(total), AMOUNT_DECIMALS, "tokenSupply")
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A non-negative ledger amount in stroops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_stroops(stroops: i64) -> Self {
        Amount(stroops)
    }

    /// Whole units. `None` on overflow.
    pub fn from_units(units: i64) -> Option<Self> {
        units.checked_mul(STROOPS_PER_UNIT).map(Amount)
    }

    pub const fn stroops(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Parse a decimal amount (`"1000"`, `"12.5"`, `"0.0000001"`).
    /// Precision beyond seven places is rounded half-up.
    pub fn parse(s: &str) -> Result<Self, AmountError> {
        Self::parse_field(s, "amount")
    }

    /// [`Amount::parse`] with a field name for the error.
    pub fn parse_field(s: &str, field: &str) -> Result<Self, AmountError> {
        let fixed = to_fixed_amount(&AmountInput::Text(s.to_string()), AMOUNT_DECIMALS, field)?;
        let (int, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
        let scaled = scale_decimal(int, frac, AMOUNT_DECIMALS)
            .ok_or_else(|| AmountError::invalid(field, "value is too large"))?;
        i64::try_from(scaled)
            .map(Amount)
            .map_err(|_| AmountError::invalid(field, "exceeds the ledger maximum"))
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount((self.0 - other.0.min(self.0)).max(0))
    }

    /// `self × bps / 10_000`, rounded down to the stroop.
    pub fn mul_bps(self, bps: u32) -> Amount {
        let scaled = i128::from(self.0) * i128::from(bps) / 10_000;
        Amount(scaled as i64)
    }

    /// `"0"` for zero, the 7-place rendering otherwise.
    pub fn to_compact_string(self) -> String {
        if self.is_zero() {
            "0".to_string()
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let unit = STROOPS_PER_UNIT as u64;
        write!(f, "{sign}{}.{:07}", abs / unit, abs % unit)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_fixed_amount_number() {
        let out = to_fixed_amount(&AmountInput::Number(5000.0), 7, "supply").unwrap();
        assert_eq!(out, "5000.0000000");
        let out = to_fixed_amount(&AmountInput::Number(0.1), 2, "price").unwrap();
        assert_eq!(out, "0.10");
    }

    #[test]
    fn test_to_fixed_amount_string_is_exact() {
        let out = to_fixed_amount(&"1000.12345678".into(), 7, "supply").unwrap();
        assert_eq!(out, "1000.1234568");
        let out = to_fixed_amount(&"922337203685.4775807".into(), 7, "supply").unwrap();
        assert_eq!(out, "922337203685.4775807");
        let out = to_fixed_amount(&".5".into(), 3, "x").unwrap();
        assert_eq!(out, "0.500");
    }

    #[test]
    fn test_to_fixed_amount_exponent_form() {
        let out = to_fixed_amount(&"1e3".into(), 7, "supply").unwrap();
        assert_eq!(out, "1000.0000000");
    }

    #[test]
    fn test_to_fixed_amount_rejects_bad_input() {
        for bad in ["-1", "abc", "", "12abc", "NaN", "inf", "1.2.3"] {
            let err = to_fixed_amount(&bad.into(), 7, "supply").unwrap_err();
            assert!(
                matches!(err, AmountError::InvalidAmount { ref field, .. } if field == "supply"),
                "{bad} -> {err:?}"
            );
        }
        assert!(to_fixed_amount(&AmountInput::Number(f64::NAN), 7, "x").is_err());
        assert!(to_fixed_amount(&AmountInput::Number(-0.5), 7, "x").is_err());
    }

    #[test]
    fn test_negative_zero_is_zero() {
        assert_eq!(
            to_fixed_amount(&AmountInput::Number(-0.0), 7, "x").unwrap(),
            "0.0000000"
        );
        assert_eq!(to_fixed_amount(&"-0".into(), 2, "x").unwrap(), "0.00");
    }

    #[test]
    fn test_tiny_negative_does_not_round_to_zero() {
        assert!(matches!(
            to_fixed_amount(&"-0.00000001".into(), 7, "x"),
            Err(AmountError::InvalidAmount { .. })
        ));
        assert!(to_fixed_amount(&AmountInput::Number(-1e-9), 7, "x").is_err());
    }

    #[test]
    fn test_ensure_positive_integer() {
        assert_eq!(ensure_positive_integer(&5000u64.into(), "bottleCount").unwrap(), 5000);
        assert_eq!(ensure_positive_integer(&"2019".into(), "vintage").unwrap(), 2019);

        let err = ensure_positive_integer(&AmountInput::Number(0.0), "bottleCount").unwrap_err();
        assert_eq!(err.field(), "bottleCount");
        assert!(err.to_string().contains("bottleCount"));

        assert!(ensure_positive_integer(&AmountInput::Number(-3.0), "n").is_err());
        assert!(ensure_positive_integer(&AmountInput::Number(2.5), "n").is_err());
        assert!(ensure_positive_integer(&"12abc".into(), "n").is_err());
        assert!(ensure_positive_integer(&"".into(), "n").is_err());
    }

    #[test]
    fn test_ensure_number_min() {
        assert_eq!(
            ensure_number(&"12.5".into(), "pricePerBottle", Some(0.01)).unwrap(),
            12.5
        );
        let err = ensure_number(&AmountInput::Number(0.001), "pricePerBottle", Some(0.01))
            .unwrap_err();
        assert!(err.to_string().contains(">= 0.01"));
        assert!(ensure_number(&AmountInput::Number(-5.0), "x", None).is_ok());
        assert!(ensure_number(&"nope".into(), "x", None).is_err());
    }

    #[test]
    fn test_derive_token_supply() {
        assert_eq!(derive_token_supply(5000, 1.0).unwrap(), "5000.0000000");
        assert_eq!(derive_token_supply(3, 0.5).unwrap(), "1.5000000");
        assert!(derive_token_supply(0, 1.0).is_err());
        assert!(derive_token_supply(10, 0.0).is_err());
    }

    #[test]
    fn test_derive_token_supply_matches_to_fixed() {
        for (count, units) in [(1u64, 1.0), (12, 0.25), (750, 3.0), (99, 0.0000001)] {
            let expected =
                to_fixed_amount(&AmountInput::Number(count as f64 * units), 7, "x").unwrap();
            assert_eq!(derive_token_supply(count, units).unwrap(), expected);
        }
    }

    #[test]
    fn test_amount_parse_and_display() {
        let a = Amount::parse("1000").unwrap();
        assert_eq!(a.stroops(), 1000 * STROOPS_PER_UNIT);
        assert_eq!(a.to_string(), "1000.0000000");
        assert_eq!(Amount::parse("0.0000001").unwrap().stroops(), 1);
        assert_eq!(Amount::parse("2.0").unwrap().to_string(), "2.0000000");
        assert!(Amount::parse("922337203686").is_err());
        assert!(Amount::parse("-1").is_err());
    }

    #[test]
    fn test_amount_mul_bps_floors() {
        let supply = Amount::parse("1000").unwrap();
        assert_eq!(supply.mul_bps(1000).to_string(), "100.0000000");
        assert_eq!(supply.mul_bps(0), Amount::ZERO);
        assert_eq!(supply.mul_bps(10_000), supply);
        // 3 stroops at 50% floors to 1.
        assert_eq!(Amount::from_stroops(3).mul_bps(5000).stroops(), 1);
    }

    #[test]
    fn test_amount_compact_and_saturating() {
        assert_eq!(Amount::ZERO.to_compact_string(), "0");
        assert_eq!(Amount::from_stroops(1).to_compact_string(), "0.0000001");
        let a = Amount::from_stroops(5);
        assert_eq!(a.saturating_sub(Amount::from_stroops(9)), Amount::ZERO);
        assert_eq!(a.saturating_sub(Amount::from_stroops(2)).stroops(), 3);
    }

    #[test]
    fn test_amount_input_deserializes_both_shapes() {
        let n: AmountInput = serde_json::from_str("5000").unwrap();
        assert_eq!(n, AmountInput::Number(5000.0));
        let s: AmountInput = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(s, AmountInput::Text("12.50".into()));
    }
}
