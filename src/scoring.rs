//! Grading a predicted spec against ground truth.
//!
//! Field names compare case-insensitively throughout. Every rate with an
//! empty denominator is `0.0` rather than `NaN`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::spec::{FieldType, PredictedSpec, SpecDoc};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaMatch {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl SchemaMatch {
    /// Header-vs-spec score used by the row validator. Denominators floor at
    /// one, so an empty header against an empty spec scores zero.
    pub fn from_counts(true_positives: usize, extra: usize, missing: usize) -> Self {
        let tp = true_positives as f64;
        let precision = tp / (true_positives + extra).max(1) as f64;
        let recall = tp / (true_positives + missing).max(1) as f64;
        Self::from_rates(precision, recall)
    }

    fn from_rates(precision: f64, recall: f64) -> Self {
        let sum = precision + recall;
        let f1 = if sum > 0.0 {
            2.0 * precision * recall / sum
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionScore {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub type_acc: f64,
    pub unit_acc: f64,
}

fn rate(ok: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        ok as f64 / total as f64
    }
}

fn lowercase_names<'a, I>(names: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().map(str::to_lowercase).collect()
}

pub fn compare_field_sets(truth: &SpecDoc, predicted: &PredictedSpec) -> SchemaMatch {
    let truth_names = lowercase_names(truth.fields.iter().map(|f| f.name.as_str()));
    let predicted_names = lowercase_names(predicted.fields.iter().map(|f| f.name.as_str()));
    let tp = predicted_names.intersection(&truth_names).count();
    SchemaMatch::from_rates(
        rate(tp, predicted_names.len()),
        rate(tp, truth_names.len()),
    )
}

/// Share of overlapping predicted fields whose type equals the truth type.
/// Predicted fields unknown to the truth spec are not counted.
pub fn type_match_rate(truth: &SpecDoc, predicted: &PredictedSpec) -> f64 {
    let truth_types: HashMap<String, FieldType> = truth
        .fields
        .iter()
        .map(|f| (f.name.to_lowercase(), f.field_type))
        .collect();
    let (ok, total) = predicted
        .fields
        .iter()
        .filter_map(|f| {
            truth_types
                .get(&f.name.to_lowercase())
                .map(|t| *t == f.field_type)
        })
        .fold((0, 0), |(ok, total), hit| (ok + usize::from(hit), total + 1));
    rate(ok, total)
}

/// Like [`type_match_rate`] but over units, and only for fields whose truth
/// declares one.
pub fn unit_match_rate(truth: &SpecDoc, predicted: &PredictedSpec) -> f64 {
    let truth_units: HashMap<String, &str> = truth
        .fields
        .iter()
        .filter_map(|f| Some((f.name.to_lowercase(), f.unit.as_deref()?)))
        .collect();
    let (ok, total) = predicted
        .fields
        .iter()
        .filter_map(|f| {
            truth_units
                .get(&f.name.to_lowercase())
                .map(|unit| f.unit.as_deref() == Some(*unit))
        })
        .fold((0, 0), |(ok, total), hit| (ok + usize::from(hit), total + 1));
    rate(ok, total)
}

pub fn score_prediction(truth: &SpecDoc, predicted: &PredictedSpec) -> PredictionScore {
    let fields = compare_field_sets(truth, predicted);
    PredictionScore {
        precision: fields.precision,
        recall: fields.recall,
        f1: fields.f1,
        type_acc: type_match_rate(truth, predicted),
        unit_acc: unit_match_rate(truth, predicted),
    }
}
