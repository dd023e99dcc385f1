//! Free-text cell value to hours.
//!
//! Anything typed into a cell is accepted. Text that does not start with a
//! number counts as zero hours rather than being rejected.

use crate::models::hours::Marker;

/// Parses a raw cell value into hours.
///
/// * absent, empty or a sentinel marker: `0`
/// * `"7,5"`: the first comma acts as the decimal point, `7.5`
/// * `"2:30"`: hours and minutes, `2.5`. Minutes are not capped at 59, so
///   `"2:90"` is `3.5`.
/// * `"7.5h"`: the longest numeric prefix, `7.5`
///
/// Negative amounts pass through unchanged. Only decimal literals are read:
/// `"Infinity"` and `"NaN"` are not numbers here and count as zero.
pub fn parse_hours(value: Option<&str>) -> f64 {
    let Some(raw) = value else {
        return 0.0;
    };

    if raw.is_empty() || Marker::from_glyph(raw).is_some() {
        return 0.0;
    }

    let normalized = raw.replacen(',', ".", 1);

    if normalized.contains(':') {
        let mut parts = normalized.split(':');
        let hours = parts.next().and_then(float_prefix).unwrap_or(0.0);
        let minutes = parts.next().and_then(integer_prefix).unwrap_or(0);
        return hours + minutes as f64 / 60.0;
    }

    float_prefix(&normalized).unwrap_or(0.0)
}

/// Longest leading decimal literal (optional sign, digits, fraction,
/// exponent) after leading whitespace.
fn float_prefix(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }

    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;

    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if digits > 0 || frac_end > frac_start {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }

    if digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    text[..end].parse::<f64>().ok().filter(|hours| hours.is_finite())
}

/// Longest leading integer (optional sign, digits) after leading whitespace.
fn integer_prefix(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }

    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }

    if end == digits_start {
        return None;
    }

    text[..end].parse::<i64>().ok()
}
