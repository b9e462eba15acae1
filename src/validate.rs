//! Row-set validation: header presence, schema-match score, per-row checks
//! and optional profile drift, folded into one [`ValidationResult`].
//!
//! Two header strategies share the same machinery. [`validate_rows`] matches
//! header names exactly. [`validate_rows_tolerant`] resolves them through
//! lowercase lookup maps and reports case-only matches and undeclared keys
//! as warnings.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    compiler::{CompileOptions, CompiledSpec, FieldViolation, RawRecord, ViolationKind, compile},
    data::RawValue,
    drift::{DEFAULT_NULL_RATE_THRESHOLD, ProfileDrift, compute_profile_drift},
    issue::{IssueCode, ValidationIssue},
    profile::DatasetProfileResult,
    scoring::SchemaMatch,
    spec::SpecDoc,
};

#[derive(Debug, Clone, Copy)]
pub struct ValidationOptions<'a> {
    pub unit_tool: bool,
    pub profile: Option<&'a DatasetProfileResult>,
    pub null_rate_threshold: f64,
}

impl Default for ValidationOptions<'_> {
    fn default() -> Self {
        Self {
            unit_tool: false,
            profile: None,
            null_rate_threshold: DEFAULT_NULL_RATE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationMetrics {
    pub schema_match: SchemaMatch,
    pub valid_rows: usize,
    pub total_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_drift: Option<ProfileDrift>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub metrics: ValidationMetrics,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.len() - self.error_count()
    }
}

/// A persisted validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub spec_name: String,
    pub spec_version: String,
    pub unit_tool: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_hash: Option<String>,
    pub result: ValidationResult,
}

impl ValidationReport {
    pub fn new(spec: &SpecDoc, options: &ValidationOptions<'_>, result: ValidationResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            spec_name: spec.name.clone(),
            spec_version: spec.version.clone(),
            unit_tool: options.unit_tool,
            profile_hash: options.profile.and_then(|p| p.sample_hash.clone()),
            result,
        }
    }
}

fn cell(row: &[String], index: Option<usize>) -> RawValue {
    index
        .and_then(|i| row.get(i))
        .map(|value| RawValue::from(value.as_str()))
        .unwrap_or_default()
}

fn mismatch_issue(violation: FieldViolation, row_number: usize) -> ValidationIssue {
    ValidationIssue::error(IssueCode::TypeOrRuleMismatch, violation.message)
        .column(violation.field)
        .row(row_number)
        .value(violation.value)
        .expected(violation.expected)
}

fn finish(
    spec: &SpecDoc,
    options: &ValidationOptions<'_>,
    schema_match: SchemaMatch,
    valid_rows: usize,
    total_rows: usize,
    mut issues: Vec<ValidationIssue>,
) -> ValidationResult {
    let profile_drift = options
        .profile
        .map(|profile| compute_profile_drift(spec, profile, options.null_rate_threshold));
    if let Some(drift) = &profile_drift {
        issues.extend(drift.issues());
    }
    let passed = !issues.iter().any(ValidationIssue::is_error);
    debug!(
        "Validated {total_rows} row(s) against '{}': {valid_rows} valid, {} issue(s), passed={passed}",
        spec.name,
        issues.len()
    );
    ValidationResult {
        passed,
        metrics: ValidationMetrics {
            schema_match,
            valid_rows,
            total_rows,
            profile_drift,
        },
        issues,
    }
}

fn compiled_for(spec: &SpecDoc, options: &ValidationOptions<'_>) -> CompiledSpec {
    compile(
        spec,
        CompileOptions {
            unit_tool: options.unit_tool,
            strict: true,
        },
    )
}

/// Validates a parsed table against `spec`, matching header names exactly.
pub fn validate_rows(
    header: &[String],
    rows: &[Vec<String>],
    spec: &SpecDoc,
    options: &ValidationOptions<'_>,
) -> ValidationResult {
    let compiled = compiled_for(spec, options);
    let expected: HashSet<&str> = spec.fields.iter().map(|f| f.name.as_str()).collect();
    let found: HashSet<&str> = header.iter().map(String::as_str).collect();

    let missing = spec
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .filter(|name| !found.contains(name))
        .unique()
        .collect::<Vec<_>>();
    let extra = header
        .iter()
        .map(String::as_str)
        .filter(|name| !expected.contains(name))
        .unique()
        .collect::<Vec<_>>();

    let mut issues = Vec::new();
    issues.extend(missing.iter().map(|name| {
        ValidationIssue::error(IssueCode::MissingColumn, format!("Column {name} not found"))
            .column(*name)
    }));
    issues.extend(extra.iter().map(|name| {
        ValidationIssue::warn(IssueCode::ExtraColumn, format!("Unexpected column {name}"))
            .column(*name)
    }));

    let true_positives = spec
        .fields
        .iter()
        .filter(|f| found.contains(f.name.as_str()))
        .count();
    let schema_match = SchemaMatch::from_counts(true_positives, extra.len(), missing.len());

    // A repeated header name resolves to its last occurrence.
    let column_index: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();
    let mut valid_rows = 0;
    for (row_idx, row) in rows.iter().enumerate() {
        let record = spec
            .fields
            .iter()
            .map(|field| {
                let index = column_index.get(field.name.as_str()).copied();
                (field.name.as_str(), cell(row, index))
            })
            .collect::<RawRecord>();
        match compiled.validate(&record) {
            Ok(_) => valid_rows += 1,
            Err(violations) => {
                issues.extend(violations.into_iter().map(|v| mismatch_issue(v, row_idx + 1)))
            }
        }
    }

    finish(spec, options, schema_match, valid_rows, rows.len(), issues)
}

/// Validates with case-insensitive header resolution.
///
/// A header equal to a spec field except for case counts as present and
/// raises `CAPITAL_MISMATCH`. Headers that match nothing stay in each row
/// record under their own name, so the strict compiled spec reports them as
/// `UNRECOGNIZED_KEY` once per row. Neither warning invalidates a row.
pub fn validate_rows_tolerant(
    header: &[String],
    rows: &[Vec<String>],
    spec: &SpecDoc,
    options: &ValidationOptions<'_>,
) -> ValidationResult {
    let compiled = compiled_for(spec, options);
    let spec_by_lower: HashMap<String, &str> = spec
        .fields
        .iter()
        .map(|f| (f.name.to_lowercase(), f.name.as_str()))
        .collect();
    let header_by_lower: HashMap<String, &str> = header
        .iter()
        .map(|h| (h.to_lowercase(), h.as_str()))
        .collect();

    let mut issues = Vec::new();
    // Record key for each header position: the canonical spec name when the
    // header resolves to a field, else the header itself.
    let mut keys = Vec::with_capacity(header.len());
    let mut extra = Vec::new();
    for name in header {
        if compiled.recognizes(name) {
            keys.push(name.clone());
        } else if let Some(canonical) = spec_by_lower.get(&name.to_lowercase()) {
            issues.push(
                ValidationIssue::warn(
                    IssueCode::CapitalMismatch,
                    format!("Column {name} matches field {canonical} only by case"),
                )
                .column(name)
                .expected(Some(canonical.to_string())),
            );
            keys.push(canonical.to_string());
        } else {
            if !extra.contains(&name.as_str()) {
                extra.push(name.as_str());
            }
            keys.push(name.clone());
        }
    }

    let missing = spec
        .fields
        .iter()
        .filter(|f| !header_by_lower.contains_key(&f.name.to_lowercase()))
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>();
    let present = spec.fields.len() - missing.len();
    issues.extend(missing.iter().map(|name| {
        ValidationIssue::error(IssueCode::MissingColumn, format!("Column {name} not found"))
            .column(*name)
    }));
    issues.extend(extra.iter().map(|name| {
        ValidationIssue::warn(IssueCode::ExtraColumn, format!("Unexpected column {name}"))
            .column(*name)
    }));
    let schema_match = SchemaMatch::from_counts(present, extra.len(), missing.len());

    let mut valid_rows = 0;
    for (row_idx, row) in rows.iter().enumerate() {
        let record = keys
            .iter()
            .enumerate()
            .map(|(idx, key)| (key.as_str(), cell(row, Some(idx))))
            .collect::<RawRecord>();
        let violations = match compiled.validate(&record) {
            Ok(_) => {
                valid_rows += 1;
                continue;
            }
            Err(violations) => violations,
        };
        let mut row_valid = true;
        for violation in violations {
            if violation.kind == ViolationKind::UnrecognizedKey {
                issues.push(
                    ValidationIssue::warn(IssueCode::UnrecognizedKey, violation.message)
                        .column(violation.field)
                        .row(row_idx + 1)
                        .value(violation.value),
                );
            } else {
                row_valid = false;
                issues.push(mismatch_issue(violation, row_idx + 1));
            }
        }
        if row_valid {
            valid_rows += 1;
        }
    }

    finish(spec, options, schema_match, valid_rows, rows.len(), issues)
}
