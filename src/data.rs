//! Raw cell values, typed values, and the coercion primitives used by the
//! spec compiler.
//!
//! Coercion is deliberately lenient in one direction only: anything that
//! cannot be understood is handed back (or degraded to [`RawValue::Null`]) so
//! the downstream check can report it as a normal violation instead of
//! aborting the scan.

use std::{fmt, sync::LazyLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A value as it arrives from a parsed file or a JSON record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    #[default]
    Null,
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Null or the empty string. Whitespace-only text is a value.
    pub fn is_empty(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    /// String form of the value, formatted the way a spreadsheet user would
    /// read it back (`5` rather than `5.0`).
    pub fn as_text(&self) -> String {
        match self {
            RawValue::Null => String::new(),
            RawValue::Boolean(b) => b.to_string(),
            RawValue::Number(n) => format_number(*n),
            RawValue::Text(text) => text.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Boolean(_) => "boolean",
            RawValue::Number(_) => "number",
            RawValue::Text(_) => "string",
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Boolean(value)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

/// A value that passed its field check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    Date(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Date(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

// `[0-9]` rather than `\d`: only ASCII digits count as numeric.
static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\(?[-+\x{2212}]?(?:[0-9]{1,3}(?:,[0-9]{3})+|[0-9]+)(?:\.[0-9]+)?(?:e[-+]?[0-9]+)?\)?",
    )
    .expect("leading number pattern")
});

static THOUSANDS_GROUPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[-+]?(?:[0-9]{1,3}(?:,[0-9]{3})+|[0-9]+)(?:\.[0-9]+)?(?:e[-+]?[0-9]+)?$")
        .expect("thousands pattern")
});

static PLAIN_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[-+]?[0-9]+(?:\.[0-9]+)?(?:e[-+]?[0-9]+)?$").expect("plain number pattern")
});

/// Parses a numeric string using the lenient rules described on
/// [`coerce_number`]. Returns `None` when the text is not a number at all.
/// The result may be non-finite for literals that overflow `f64`.
pub fn parse_numeric_text(text: &str, unit_tool: bool) -> Option<f64> {
    let mut token = text.trim();
    if token.is_empty() {
        return None;
    }
    if unit_tool && let Some(found) = LEADING_NUMBER.find(token) {
        token = found.as_str();
    }

    let (body, accounting_negative) =
        if token.len() >= 2 && token.starts_with('(') && token.ends_with(')') {
            (token[1..token.len() - 1].trim(), true)
        } else {
            (token, false)
        };

    let normalized = body.replace('\u{2212}', "-");
    let candidate = if THOUSANDS_GROUPED.is_match(&normalized) {
        normalized.replace(',', "")
    } else {
        let compact = normalized.replace([' ', '_'], "");
        if !PLAIN_NUMBER.is_match(&compact) {
            return None;
        }
        compact
    };

    let parsed: f64 = candidate.parse().ok()?;
    Some(if accounting_negative { -parsed } else { parsed })
}

/// Numeric coercion.
///
/// - `Null`, numbers, booleans and the empty string pass through unchanged.
/// - Strings are trimmed; with `unit_tool` only the leading numeric token is
///   kept so `"12.5 kg"` reads as `12.5`.
/// - `(1,234.56)` is an accounting negative, U+2212 is read as `-`, and
///   thousands separators are dropped.
/// - Spaces and underscores are tolerated as accidental groupers.
/// - Anything else becomes `Null`; literals that overflow to infinity are
///   returned unchanged so the number check rejects them.
pub fn coerce_number(raw: &RawValue, unit_tool: bool) -> RawValue {
    let RawValue::Text(text) = raw else {
        return raw.clone();
    };
    if text.trim().is_empty() {
        return raw.clone();
    }
    match parse_numeric_text(text, unit_tool) {
        Some(n) if n.is_finite() => RawValue::Number(n),
        Some(_) => raw.clone(),
        None => RawValue::Null,
    }
}

/// Boolean coercion: maps the usual spellings, leaves everything else alone
/// so the boolean check can reject it.
pub fn coerce_boolean(raw: &RawValue) -> RawValue {
    match raw {
        RawValue::Null | RawValue::Boolean(_) => raw.clone(),
        RawValue::Number(n) => RawValue::Boolean(*n != 0.0),
        RawValue::Text(text) if text.is_empty() => raw.clone(),
        RawValue::Text(text) => match text.trim().to_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" => RawValue::Boolean(true),
            "false" | "f" | "0" | "no" | "n" => RawValue::Boolean(false),
            _ => raw.clone(),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCoercion {
    Empty,
    Valid(NaiveDateTime),
    Invalid,
}

/// Date coercion: empty values become [`DateCoercion::Empty`], everything
/// else is parsed from its string form.
pub fn coerce_date(raw: &RawValue) -> DateCoercion {
    match raw {
        RawValue::Null => DateCoercion::Empty,
        RawValue::Text(text) if text.is_empty() => DateCoercion::Empty,
        other => match parse_date_time(other.as_text().trim()) {
            Some(parsed) => DateCoercion::Valid(parsed),
            None => DateCoercion::Invalid,
        },
    }
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y", "%d %B %Y"];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// RFC 3339 first (normalised to UTC), then naive date-times, then plain
/// dates at midnight.
pub fn parse_date_time(value: &str) -> Option<NaiveDateTime> {
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }
    parse_naive_datetime(value).or_else(|| parse_naive_date(value).and_then(|d| d.and_hms_opt(0, 0, 0)))
}
