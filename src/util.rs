// Coercion and text helpers.
//
// This module centralizes all the "dirty" cell handling (decimal conventions,
// day-first dates, legacy encodings, fuzzy name scoring) so the normalizers
// can assume clean, typed values.

use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};

/// Decimal/thousands convention of a numeric column.
///
/// Electricity extracts use `1,234.56`; the gas extracts and the wide gas
/// reports use `1.234,56`. The convention is fixed per source kind by the
/// sniffer, never re-guessed per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalConvention {
    /// `.` decimal separator, `,` thousands separator.
    PointDecimal,
    /// `,` decimal separator, `.` thousands separator.
    CommaDecimal,
}

/// Parse a numeric cell under the given convention while being forgiving
/// about the formatting issues common in billing exports.
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Trims whitespace, strips the thousands separator, normalizes the
///   decimal separator to `.`.
/// - Rejects values containing alphabetic characters.
/// - Returns `None` for anything that cannot be safely parsed; the
///   normalizers decide whether that means "zero" (the canonical lenient
///   policy) or "drop".
pub fn parse_decimal(s: Option<&str>, convention: DecimalConvention) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let normalized = match convention {
        DecimalConvention::PointDecimal => s.replace(',', ""),
        DecimalConvention::CommaDecimal => s.replace('.', "").replace(',', "."),
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a day-first invoice date (`31/01/2024`, also `31-01-2024`).
pub fn parse_date_dayfirst(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d-%m-%Y"))
        .ok()
}

/// Decode raw source bytes to text.
///
/// Tries strict UTF-8 first and falls back to Windows-1252, which the
/// Spanish utility portals still emit. A leading UTF-8 BOM is stripped.
pub fn decode_text(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    };
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}

/// Edit distance of `pattern` against the best-matching substring of `text`
/// (semi-global alignment: deletions at either end of `text` are free).
fn substring_edit_distance(pattern: &[char], text: &[char]) -> usize {
    if pattern.is_empty() {
        return 0;
    }
    if text.is_empty() {
        return pattern.len();
    }
    // First row is all zeros: the match may start anywhere in `text`.
    let mut prev: Vec<usize> = vec![0; text.len() + 1];
    for (i, pc) in pattern.iter().enumerate() {
        let mut cur = vec![0usize; text.len() + 1];
        cur[0] = i + 1;
        for (j, tc) in text.iter().enumerate() {
            let subst = prev[j] + usize::from(pc != tc);
            cur[j + 1] = subst.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        prev = cur;
    }
    // The match may end anywhere in `text`.
    prev.into_iter().min().unwrap_or(pattern.len())
}

/// Similarity of two names in [0, 100].
///
/// Comparison is case-insensitive on trimmed input. The shorter string is
/// aligned against the best window of the longer one, so "Pais Vasco" scores
/// high against "País Vasco / Euskadi" even though the full strings differ
/// wildly in length. 100 means the shorter string occurs verbatim.
pub fn similarity_score(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.trim().to_lowercase().chars().collect();
    let b: Vec<char> = b.trim().to_lowercase().chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (pattern, text) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let dist = substring_edit_distance(pattern, text);
    (100.0 * (1.0 - dist as f64 / pattern.len() as f64)).max(0.0)
}

/// Format a floating-point value with fixed decimals and locale-aware
/// thousands separators (e.g. `1,234,567.89`). Used for console diagnostics
/// and table previews, never for data the engine consumes.
pub fn format_number(n: f64, decimals: usize) -> String {
    let neg = n.is_sign_negative();
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if decimals > 0 {
        res.push('.');
        match frac_part {
            Some(frac) => res.push_str(frac),
            None => res.push_str(&"0".repeat(decimals)),
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

/// Thousands-separated integer formatting for counts in console messages
/// (e.g. `9,855 rows loaded`).
pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}
