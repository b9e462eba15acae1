//! Profile drift: how a dataset's computed profile disagrees with the spec it
//! is validated against. Drift findings are advisory and only ever surface as
//! warnings.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    issue::{IssueCode, ValidationIssue},
    profile::{DatasetProfileResult, InferredType},
    spec::{FieldType, SpecDoc},
};

pub const DEFAULT_NULL_RATE_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDisagreement {
    pub column: String,
    pub spec: String,
    pub profile: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighNull {
    pub column: String,
    pub null_rate: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDrift {
    pub missing_in_profile: Vec<String>,
    pub new_in_profile: Vec<String>,
    pub type_disagreements: Vec<TypeDisagreement>,
    pub high_nulls: Vec<HighNull>,
}

impl ProfileDrift {
    /// Warning issues for every type disagreement and high null rate.
    pub fn issues(&self) -> Vec<ValidationIssue> {
        let types = self.type_disagreements.iter().map(|d| {
            ValidationIssue::warn(
                IssueCode::ProfileTypeDrift,
                format!("Spec type {} vs profile type {}", d.spec, d.profile),
            )
            .column(&d.column)
            .value(Some(d.profile.clone()))
            .expected(Some(d.spec.clone()))
        });
        let nulls = self.high_nulls.iter().map(|n| {
            ValidationIssue::warn(
                IssueCode::ProfileHighNullRate,
                format!(
                    "Null-rate {:.2} exceeds threshold {}",
                    n.null_rate, n.threshold
                ),
            )
            .column(&n.column)
        });
        types.chain(nulls).collect()
    }
}

/// Exact matches agree, and a `number` field tolerates a `string` profile
/// (numeric-looking text). The reverse does not hold.
pub fn types_agree(spec: FieldType, inferred: InferredType) -> bool {
    spec.as_str() == inferred.as_str()
        || (spec == FieldType::Number && inferred == InferredType::String)
}

pub fn compute_profile_drift(
    spec: &SpecDoc,
    profile: &DatasetProfileResult,
    null_rate_threshold: f64,
) -> ProfileDrift {
    let spec_types: HashMap<&str, FieldType> = spec
        .fields
        .iter()
        .map(|f| (f.name.as_str(), f.field_type))
        .collect();
    let profile_columns: HashSet<&str> = profile.columns.iter().map(|c| c.name.as_str()).collect();

    let missing_in_profile = spec
        .fields
        .iter()
        .filter(|f| !profile_columns.contains(f.name.as_str()))
        .map(|f| f.name.clone())
        .collect();
    let new_in_profile = profile
        .columns
        .iter()
        .filter(|c| !spec_types.contains_key(c.name.as_str()))
        .map(|c| c.name.clone())
        .collect();

    let type_disagreements = profile
        .columns
        .iter()
        .filter_map(|column| {
            let declared = *spec_types.get(column.name.as_str())?;
            (!types_agree(declared, column.inferred_type)).then(|| TypeDisagreement {
                column: column.name.clone(),
                spec: declared.as_str().to_string(),
                profile: column.inferred_type.as_str().to_string(),
            })
        })
        .collect();

    let high_nulls = profile
        .columns
        .iter()
        .filter(|c| c.null_rate > null_rate_threshold)
        .map(|c| HighNull {
            column: c.name.clone(),
            null_rate: c.null_rate,
            threshold: null_rate_threshold,
        })
        .collect();

    ProfileDrift {
        missing_in_profile,
        new_in_profile,
        type_disagreements,
        high_nulls,
    }
}
