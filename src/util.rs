// Numeric helpers shared by the aggregation, conversion and output code.
use crate::error::{ReportError, Result};
use num_format::{Locale, ToFormattedString};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

/// Round to two decimal places, the precision every percentage is shown at.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `allocated / expected * 100`, rounded to two decimals.
///
/// Fails with `DivisionUndefined` when nothing is expected; callers decide
/// which sentinel to show instead.
pub fn percentage_of(allocated: i64, expected: i64) -> Result<f64> {
    if expected == 0 {
        return Err(ReportError::DivisionUndefined { allocated });
    }
    Ok(round2(allocated as f64 / expected as f64 * 100.0))
}

/// Parse a spreadsheet count cell.
///
/// Exports sometimes write whole numbers as `12.0`, so a zero fractional
/// part is accepted. Anything else returns `None`.
pub fn parse_count_safe(s: Option<&str>) -> Option<i64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    whole_number(s.parse::<f64>().ok()?)
}

/// `f` as an integer when it has no fractional part and fits in `i64`.
pub fn whole_number(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Deserialize a count written either as an integer or a whole float (`8.0`).
pub fn de_count<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Int(i64),
        Float(f64),
    }
    match Count::deserialize(deserializer)? {
        Count::Int(n) => Ok(n),
        Count::Float(f) => whole_number(f)
            .ok_or_else(|| D::Error::custom(format!("expected a whole count, found {}", f))),
    }
}

/// Format a count with pt-BR thousands separators (e.g. `12.345`).
pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::pt)
}
