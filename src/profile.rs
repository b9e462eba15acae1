//! Column type inference, unit detection, and dataset profiling.
//!
//! Profiles are summaries of sampled data. They are cached by callers under
//! [`sample_hash`], which only covers the row count and column names, so a
//! caller must recompute whenever that hash changes.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::LazyLock,
};

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::data::RawValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferredType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Unknown,
}

impl InferredType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferredType::String => "string",
            InferredType::Number => "number",
            InferredType::Integer => "integer",
            InferredType::Boolean => "boolean",
            InferredType::Date => "date",
            InferredType::DateTime => "datetime",
            InferredType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    pub inferred_type: InferredType,
    pub null_rate: f64,
    pub distinct_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_candidates: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_hits: Option<BTreeMap<String, usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetProfileResult {
    pub row_count: usize,
    pub columns: Vec<ColumnProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_hash: Option<String>,
}

impl DatasetProfileResult {
    pub fn new(row_count: usize, columns: Vec<ColumnProfile>) -> Self {
        let names = columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>();
        let hash = sample_hash(row_count, &names);
        Self {
            row_count,
            columns,
            sample_hash: Some(hash),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether this profile still describes a dataset snapshot with the given
    /// hash. Profiles loaded without a hash are never fresh.
    pub fn is_fresh(&self, current_hash: &str) -> bool {
        self.sample_hash.as_deref() == Some(current_hash)
    }
}

#[derive(Serialize)]
struct HashKey<'a> {
    rc: usize,
    cols: &'a [String],
}

/// Cache key for a profile: SHA-256 over `{"rc": rows, "cols": [names]}`.
pub fn sample_hash(row_count: usize, column_names: &[String]) -> String {
    let key = HashKey {
        rc: row_count,
        cols: column_names,
    };
    let encoded = serde_json::to_vec(&key).unwrap_or_default();
    format!("{:x}", Sha256::digest(&encoded))
}

static DATE_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}(?:[ T][0-9]{2}:[0-9]{2}:[0-9]{2})?$")
        .expect("date pattern")
});
static NUMBER_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+(?:\.[0-9]+)?$").expect("number pattern"));
static DIGITS_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("digits pattern"));

/// Infers a column type from sampled values.
///
/// Each non-empty sample lands in at most one bucket: dates, numbers (native
/// or numeric-looking text) or native booleans. Ties resolve toward date,
/// then number, then boolean, then string. A column with no non-empty
/// samples is `unknown`.
pub fn infer_type(samples: &[RawValue]) -> InferredType {
    let (mut numbers, mut booleans, mut dates) = (0usize, 0usize, 0usize);
    let mut non_empty = Vec::with_capacity(samples.len());
    for sample in samples {
        match sample {
            RawValue::Null => continue,
            RawValue::Text(text) if text.is_empty() => continue,
            RawValue::Number(_) => numbers += 1,
            RawValue::Boolean(_) => booleans += 1,
            RawValue::Text(text) => {
                let trimmed = text.trim();
                if DATE_LIKE.is_match(trimmed) {
                    dates += 1;
                } else if NUMBER_LIKE.is_match(trimmed) {
                    numbers += 1;
                }
            }
        }
        non_empty.push(sample.as_text());
    }

    if non_empty.is_empty() {
        InferredType::Unknown
    } else if dates > 0 && dates >= numbers && dates >= booleans {
        if non_empty.iter().any(|s| s.contains(':')) {
            InferredType::DateTime
        } else {
            InferredType::Date
        }
    } else if numbers > 0 && numbers >= booleans {
        if non_empty.iter().all(|s| DIGITS_ONLY.is_match(s)) {
            InferredType::Integer
        } else {
            InferredType::Number
        }
    } else if booleans > 0 {
        InferredType::Boolean
    } else {
        InferredType::String
    }
}

struct UnitHint {
    unit: &'static str,
    header: Regex,
    value: Option<Regex>,
}

static UNIT_HINTS: LazyLock<Vec<UnitHint>> = LazyLock::new(|| {
    let hint = |unit, header: &str, value: Option<&str>| UnitHint {
        unit,
        header: Regex::new(header).expect("unit header pattern"),
        value: value.map(|v| Regex::new(v).expect("unit value pattern")),
    };
    vec![
        hint("kg", r"\bkg\b", Some(r"[0-9]\s?kg\b")),
        hint("g", r"\b(?:g|gram)s?\b", Some(r"[0-9]\s?g\b")),
        hint("cm", r"\bcm\b", Some(r"[0-9]\s?cm\b")),
        hint("mm", r"\bmm\b", Some(r"[0-9]\s?mm\b")),
        hint("MYR", r"\bmyr|rm\b", Some(r"(?:myr|rm)\s?[0-9]")),
        hint("USD", r"\busd\b", None),
        hint("%", r"%|percent", Some(r"%\s*$")),
    ]
});

static BARE_CURRENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\$?\s?[0-9]").expect("bare currency pattern"));

const MAX_UNIT_CANDIDATES: usize = 3;

/// Default number of non-empty values per column sampled for detection.
pub const DEFAULT_SAMPLE_ROWS: usize = 200;

/// Ranks up to three unit candidates for a column, header hints first, then
/// value hints, in insertion order. A `$` or bare leading digit counts as USD
/// only when MYR was not already seen.
pub fn detect_units(column_name: &str, samples: &[RawValue]) -> Vec<String> {
    let header = column_name.to_lowercase();
    let mut candidates: Vec<&'static str> = Vec::new();
    let add = |unit: &'static str, candidates: &mut Vec<&'static str>| {
        if !candidates.contains(&unit) {
            candidates.push(unit);
        }
    };

    for hint in UNIT_HINTS.iter() {
        if hint.header.is_match(&header) {
            add(hint.unit, &mut candidates);
        }
    }

    for sample in samples {
        if matches!(sample, RawValue::Null) {
            continue;
        }
        let text = sample.as_text().to_lowercase();
        for hint in UNIT_HINTS.iter() {
            if hint.unit == "USD" {
                if BARE_CURRENCY.is_match(&text) && !candidates.contains(&"MYR") {
                    add("USD", &mut candidates);
                }
                continue;
            }
            if hint.value.as_ref().is_some_and(|re| re.is_match(&text)) {
                add(hint.unit, &mut candidates);
            }
        }
    }

    candidates
        .into_iter()
        .take(MAX_UNIT_CANDIDATES)
        .map(str::to_string)
        .collect()
}

/// Share of `values` that are null or exactly `""`, over `total` rows.
/// Whitespace-only text counts as a value.
pub fn compute_null_rate(values: &[RawValue], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let nulls = values.iter().filter(|v| v.is_empty()).count();
    nulls as f64 / total as f64
}

/// Profiles a parsed table. Null rate and distinct count cover every row;
/// type and unit detection look at the first `sample_rows` non-empty values
/// of each column (`0` means all of them).
pub fn profile_rows(header: &[String], rows: &[Vec<String>], sample_rows: usize) -> DatasetProfileResult {
    let columns = header
        .iter()
        .enumerate()
        .map(|(col_idx, name)| {
            let values = rows
                .iter()
                .map(|row| RawValue::from(row.get(col_idx).map(String::as_str).unwrap_or("")))
                .collect::<Vec<_>>();
            let non_empty = values
                .iter()
                .filter(|v| !v.is_empty())
                .cloned()
                .collect::<Vec<_>>();
            let distinct = non_empty
                .iter()
                .map(RawValue::as_text)
                .collect::<HashSet<_>>()
                .len();
            let sampled = if sample_rows > 0 && non_empty.len() > sample_rows {
                &non_empty[..sample_rows]
            } else {
                &non_empty[..]
            };
            let units = detect_units(name, sampled);
            let null_rate = if values.is_empty() {
                1.0
            } else {
                compute_null_rate(&values, values.len())
            };
            ColumnProfile {
                name: name.clone(),
                inferred_type: infer_type(sampled),
                null_rate,
                distinct_count: distinct,
                unit_candidates: (!units.is_empty()).then_some(units),
                regex_hits: None,
            }
        })
        .collect::<Vec<_>>();
    debug!(
        "Profiled {} column(s) across {} row(s)",
        columns.len(),
        rows.len()
    );
    DatasetProfileResult::new(rows.len(), columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(values: &[&str]) -> Vec<RawValue> {
        values.iter().map(|v| RawValue::from(*v)).collect()
    }

    #[test]
    fn date_wins_ties_against_number() {
        assert_eq!(infer_type(&texts(&["2024-01-01", "5"])), InferredType::Date);
        assert_eq!(
            infer_type(&texts(&["5", "2024-01-01", "6"])),
            InferredType::Number
        );
    }

    #[test]
    fn datetime_requires_a_time_component() {
        assert_eq!(
            infer_type(&texts(&["2024-01-01 08:30:00", "2024-01-02"])),
            InferredType::DateTime
        );
    }

    #[test]
    fn integer_needs_every_sample_to_be_digits() {
        assert_eq!(infer_type(&texts(&["1", "22", "333"])), InferredType::Integer);
        assert_eq!(infer_type(&texts(&["1", "-2"])), InferredType::Number);
        assert_eq!(infer_type(&texts(&["1.5", "2"])), InferredType::Number);
    }

    #[test]
    fn native_values_are_counted() {
        let samples = vec![RawValue::Boolean(true), RawValue::Boolean(false)];
        assert_eq!(infer_type(&samples), InferredType::Boolean);
        let samples = vec![RawValue::Number(1.5), RawValue::Boolean(true)];
        assert_eq!(infer_type(&samples), InferredType::Number);
    }

    #[test]
    fn boolean_words_stay_strings() {
        assert_eq!(infer_type(&texts(&["yes", "no"])), InferredType::String);
        assert_eq!(infer_type(&texts(&["", ""])), InferredType::Unknown);
    }

    #[test]
    fn detect_units_reads_headers_and_values() {
        assert_eq!(detect_units("weight_kg", &[]), Vec::<String>::new());
        assert_eq!(detect_units("weight kg", &[]), vec!["kg"]);
        assert_eq!(detect_units("discount %", &[]), vec!["%"]);
        assert_eq!(
            detect_units("price", &texts(&["RM 12.00", "RM 5"])),
            vec!["MYR"]
        );
        assert_eq!(
            detect_units("price", &texts(&["$12.00"])),
            vec!["USD"]
        );
        assert_eq!(
            detect_units("mass", &texts(&["12 kg", "3g", "40 cm", "5 mm"])),
            vec!["kg", "USD", "g"]
        );
    }

    #[test]
    fn profile_rows_computes_rates_and_hash() {
        let header = vec!["id".to_string(), "note".to_string()];
        let rows = vec![
            vec!["1".to_string(), "".to_string()],
            vec!["2".to_string(), "x".to_string()],
            vec!["2".to_string()],
        ];
        let profile = profile_rows(&header, &rows, 0);
        assert_eq!(profile.row_count, 3);
        let id = profile.column("id").unwrap();
        assert_eq!(id.inferred_type, InferredType::Integer);
        assert_eq!(id.distinct_count, 2);
        assert_eq!(id.null_rate, 0.0);
        let note = profile.column("note").unwrap();
        assert!((note.null_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(profile.is_fresh(&sample_hash(3, &header)));
        assert!(!profile.is_fresh(&sample_hash(4, &header)));
    }

    #[test]
    fn compute_null_rate_counts_null_and_empty_only() {
        let values = vec![
            RawValue::Null,
            RawValue::from(""),
            RawValue::from("a"),
            RawValue::from("  "),
        ];
        assert!((compute_null_rate(&values, 4) - 0.5).abs() < 1e-9);
        assert_eq!(compute_null_rate(&values, 0), 0.0);
    }
}
