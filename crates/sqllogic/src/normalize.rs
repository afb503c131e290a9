//! Canonicalization of raw backend values for comparison.
//!
//! Normalization is backend-aware, not type-only: the same typed boolean
//! renders as `1` on the MySQL-protocol backend and `true` on the HTTP
//! backend. Textual values are canonicalized but never cross-mapped between
//! the two boolean vocabularies.

use crate::handlers::BackendKind;
use crate::value::RawValue;
use crate::DefaultColumnType;

/// Sentinel for SQL NULL, distinct from the empty string.
pub const NULL_SENTINEL: &str = "NULL";

/// Sentinel for an empty string, so it stays distinguishable from NULL and
/// survives whitespace-delimited row comparison.
pub const EMPTY_SENTINEL: &str = "(empty)";

/// Canonicalize one cell per its declared type tag and the backend it came
/// from.
pub fn normalize_value(value: &RawValue, ty: DefaultColumnType, backend: BackendKind) -> String {
    match value {
        RawValue::Null => NULL_SENTINEL.to_string(),
        RawValue::Bool(b) => bool_literal(*b, backend),
        RawValue::Int(i) => i.to_string(),
        RawValue::UInt(u) => u.to_string(),
        RawValue::Float(v) => float_to_string(*v),
        RawValue::Text(s) => normalize_text(s, ty),
    }
}

/// Canonicalize a whole row. When the backend returns more columns than the
/// type spec declares, the extra cells fall back to text normalization; the
/// validator reports the column count mismatch separately.
pub fn normalize_row(
    values: &[RawValue],
    types: &[DefaultColumnType],
    backend: BackendKind,
) -> Vec<String> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let ty = types.get(i).copied().unwrap_or(DefaultColumnType::Text);
            normalize_value(value, ty, backend)
        })
        .collect()
}

/// The backend's native boolean literal.
fn bool_literal(b: bool, backend: BackendKind) -> String {
    match backend {
        BackendKind::Mysql => if b { "1" } else { "0" }.to_string(),
        BackendKind::Http => if b { "true" } else { "false" }.to_string(),
    }
}

fn normalize_text(s: &str, ty: DefaultColumnType) -> String {
    if s.is_empty() {
        return EMPTY_SENTINEL.to_string();
    }
    match ty {
        // Timestamps and dates ride on T: formatting is already canonical in
        // the adapters, so the text passes through verbatim.
        DefaultColumnType::Text | DefaultColumnType::Boolean => s.to_string(),
        DefaultColumnType::Integer => canonical_decimal(s),
    }
}

/// Canonical decimal form: no `+` sign, no leading zeros, `-0` collapses to
/// `0`. Unparseable text is kept verbatim so the mismatch is visible.
fn canonical_decimal(s: &str) -> String {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return s.to_string();
    }
    let stripped = digits.trim_start_matches('0');
    let stripped = if stripped.is_empty() { "0" } else { stripped };
    if negative && stripped != "0" {
        format!("-{stripped}")
    } else {
        stripped.to_string()
    }
}

fn float_to_string(v: f64) -> String {
    if v == v.trunc() && v.is_finite() {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefaultColumnType::{Boolean, Integer, Text};

    #[test]
    fn null_and_empty_are_distinct() {
        assert_eq!(normalize_value(&RawValue::Null, Text, BackendKind::Mysql), "NULL");
        assert_eq!(
            normalize_value(&RawValue::Text(String::new()), Text, BackendKind::Mysql),
            "(empty)"
        );
    }

    #[test]
    fn typed_boolean_renders_per_backend() {
        let v = RawValue::Bool(true);
        assert_eq!(normalize_value(&v, Boolean, BackendKind::Mysql), "1");
        assert_eq!(normalize_value(&v, Boolean, BackendKind::Http), "true");

        let v = RawValue::Bool(false);
        assert_eq!(normalize_value(&v, Boolean, BackendKind::Mysql), "0");
        assert_eq!(normalize_value(&v, Boolean, BackendKind::Http), "false");
    }

    #[test]
    fn textual_boolean_is_never_cross_mapped() {
        // An HTTP backend answering `1` for a boolean must stay `1` so it
        // fails against an expected `true`.
        let v = RawValue::Int(1);
        assert_eq!(normalize_value(&v, Boolean, BackendKind::Http), "1");
        let v = RawValue::Text("1".to_string());
        assert_eq!(normalize_value(&v, Boolean, BackendKind::Http), "1");
    }

    #[test]
    fn integer_text_is_canonicalized() {
        assert_eq!(normalize_value(&"007".into(), Integer, BackendKind::Mysql), "7");
        assert_eq!(normalize_value(&"+42".into(), Integer, BackendKind::Mysql), "42");
        assert_eq!(normalize_value(&"-0".into(), Integer, BackendKind::Mysql), "0");
        assert_eq!(normalize_value(&"-012".into(), Integer, BackendKind::Mysql), "-12");
        // Unparseable stays verbatim.
        assert_eq!(normalize_value(&"12abc".into(), Integer, BackendKind::Mysql), "12abc");
    }

    #[test]
    fn timestamps_pass_through_verbatim() {
        let micro = RawValue::Text("2024-03-01 08:00:00.123456".to_string());
        let plain = RawValue::Text("2024-03-01 08:00:00".to_string());
        assert_eq!(
            normalize_value(&micro, Text, BackendKind::Http),
            "2024-03-01 08:00:00.123456"
        );
        assert_eq!(normalize_value(&plain, Text, BackendKind::Mysql), "2024-03-01 08:00:00");
    }

    #[test]
    fn row_normalization_uses_column_types() {
        let row = vec![RawValue::Int(1), RawValue::Bool(true), RawValue::Text("x".into())];
        let types = vec![Integer, Boolean, Text];
        assert_eq!(
            normalize_row(&row, &types, BackendKind::Http),
            vec!["1", "true", "x"]
        );
        assert_eq!(
            normalize_row(&row, &types, BackendKind::Mysql),
            vec!["1", "1", "x"]
        );
    }
}
