//! Robustness deltas: how much each drift case moves a scenario's metrics
//! away from its no-drift baseline.
//!
//! A scenario is `(modelId, promptMode, unitTool)`. Baselines come from the
//! full trial list; drift groups come from the reported subset. Every mean
//! ignores missing and non-finite values, and a mean with no contributing
//! values stays `None` all the way into the summary.

use std::{collections::HashMap, hash::Hash, sync::LazyLock};

use chrono::{DateTime, Utc};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const NO_DRIFT: &str = "none";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRow {
    pub model_id: String,
    #[serde(default)]
    pub prompt_mode: String,
    #[serde(default)]
    pub unit_tool: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_case: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_acc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_acc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_rows_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_rows: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriftCase {
    pub kind: String,
    pub level: Option<u8>,
}

impl DriftCase {
    pub fn none() -> Self {
        Self {
            kind: NO_DRIFT.to_string(),
            level: None,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.kind == NO_DRIFT
    }
}

static LEVEL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[:_\-])l(?:evel)?\s*([1-3])$").expect("level marker pattern")
});
static BARE_LEVEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([1-3])$").expect("bare level pattern"));
static DANGLING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[:_\-\s]+l(?:evel)?\s*$").expect("dangling marker pattern")
});

fn trim_separator(text: &str) -> &str {
    text.strip_suffix([':', '_', '-', ' ', '\t']).unwrap_or(text)
}

/// Splits a drift label such as `header_noise:L2`, `unit_change_level3` or
/// `type_shift2` into kind and level. Missing or `none` labels are the
/// baseline. A label that is nothing but a level marker keeps the whole
/// label as its kind.
pub fn parse_drift(raw: Option<&str>) -> DriftCase {
    let label = match raw {
        Some(label) if !label.is_empty() && !label.eq_ignore_ascii_case(NO_DRIFT) => label,
        _ => return DriftCase::none(),
    };

    let (kind, level): (&str, Option<u8>) = if let Some(caps) = LEVEL_MARKER.captures(label) {
        let start = caps.get(0).map_or(label.len(), |m| m.start());
        (trim_separator(&label[..start]), caps[1].parse().ok())
    } else if let Some(digit) = BARE_LEVEL.find(label) {
        let prefix = &label[..digit.start()];
        let prefix = DANGLING_MARKER
            .find(prefix)
            .map_or(prefix, |m| &prefix[..m.start()]);
        (trim_separator(prefix), digit.as_str().parse().ok())
    } else {
        (label, None)
    };

    DriftCase {
        kind: (if kind.is_empty() { label } else { kind }).to_string(),
        level,
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// The trial's valid-row share, derived from the counts when not recorded.
pub fn valid_pct_of(trial: &TrialRow) -> Option<f64> {
    if let Some(pct) = finite(trial.valid_rows_pct) {
        return Some(pct);
    }
    match (finite(trial.valid_rows), finite(trial.total_rows)) {
        (Some(valid), Some(total)) if total > 0.0 => Some(valid / total),
        _ => None,
    }
}

fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .filter_map(finite)
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct MetricMeans {
    f1: Option<f64>,
    precision: Option<f64>,
    recall: Option<f64>,
    type_acc: Option<f64>,
    unit_acc: Option<f64>,
    valid_rows_pct: Option<f64>,
}

impl MetricMeans {
    fn of(trials: &[&TrialRow]) -> Self {
        let field = |get: fn(&TrialRow) -> Option<f64>| mean(trials.iter().map(|t| get(t)));
        Self {
            f1: field(|t| t.f1),
            precision: field(|t| t.precision),
            recall: field(|t| t.recall),
            type_acc: field(|t| t.type_acc),
            unit_acc: field(|t| t.unit_acc),
            valid_rows_pct: field(valid_pct_of),
        }
    }

    fn minus(&self, baseline: &MetricMeans) -> MetricDeltas {
        let diff = |a: Option<f64>, b: Option<f64>| Some(a? - b?);
        MetricDeltas {
            d_f1: diff(self.f1, baseline.f1),
            d_precision: diff(self.precision, baseline.precision),
            d_recall: diff(self.recall, baseline.recall),
            d_type_acc: diff(self.type_acc, baseline.type_acc),
            d_unit_acc: diff(self.unit_acc, baseline.unit_acc),
            d_valid_rows_pct: diff(self.valid_rows_pct, baseline.valid_rows_pct),
        }
    }
}

/// Per-metric differences from baseline. `None` means at least one side had
/// no defined values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricDeltas {
    #[serde(rename = "dF1", default, skip_serializing_if = "Option::is_none")]
    pub d_f1: Option<f64>,
    #[serde(rename = "dPrecision", default, skip_serializing_if = "Option::is_none")]
    pub d_precision: Option<f64>,
    #[serde(rename = "dRecall", default, skip_serializing_if = "Option::is_none")]
    pub d_recall: Option<f64>,
    #[serde(rename = "dTypeAcc", default, skip_serializing_if = "Option::is_none")]
    pub d_type_acc: Option<f64>,
    #[serde(rename = "dUnitAcc", default, skip_serializing_if = "Option::is_none")]
    pub d_unit_acc: Option<f64>,
    #[serde(rename = "dValidRowsPct", default, skip_serializing_if = "Option::is_none")]
    pub d_valid_rows_pct: Option<f64>,
}

impl MetricDeltas {
    fn mean_of<'a, I>(rows: I) -> Self
    where
        I: Iterator<Item = &'a MetricDeltas> + Clone,
    {
        let field = |get: fn(&MetricDeltas) -> Option<f64>| mean(rows.clone().map(get));
        Self {
            d_f1: field(|d| d.d_f1),
            d_precision: field(|d| d.d_precision),
            d_recall: field(|d| d.d_recall),
            d_type_acc: field(|d| d.d_type_acc),
            d_unit_acc: field(|d| d.d_unit_acc),
            d_valid_rows_pct: field(|d| d.d_valid_rows_pct),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaRow {
    pub model_id: String,
    pub prompt_mode: String,
    pub unit_tool: bool,
    pub drift_kind: String,
    pub drift_level: Option<u8>,
    pub n: usize,
    #[serde(flatten)]
    pub deltas: MetricDeltas,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftSummary {
    pub drift_kind: String,
    pub drift_level: Option<u8>,
    pub n: usize,
    #[serde(flatten)]
    pub deltas: MetricDeltas,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftDeltaReport {
    pub delta_rows: Vec<DeltaRow>,
    pub delta_summary: Vec<DriftSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScenarioKey<'a> {
    model_id: &'a str,
    prompt_mode: &'a str,
    unit_tool: bool,
}

impl<'a> From<&'a TrialRow> for ScenarioKey<'a> {
    fn from(trial: &'a TrialRow) -> Self {
        Self {
            model_id: &trial.model_id,
            prompt_mode: &trial.prompt_mode,
            unit_tool: trial.unit_tool,
        }
    }
}

/// Groups in first-seen key order.
fn group_ordered<K, V, I>(items: I) -> Vec<(K, Vec<V>)>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = (K, V)>,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<V>)> = Vec::new();
    for (key, value) in items {
        match positions.get(&key) {
            Some(&pos) => groups[pos].1.push(value),
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push((key, vec![value]));
            }
        }
    }
    groups
}

/// Computes drift deltas for `filtered` (or every trial when `filtered` is
/// absent or empty) against baselines drawn from `all`. Drift groups without
/// a baseline for their scenario are skipped.
pub fn compute_drift_deltas(all: &[TrialRow], filtered: Option<&[TrialRow]>) -> DriftDeltaReport {
    let working = match filtered {
        Some(subset) if !subset.is_empty() => subset,
        _ => all,
    };

    let baselines: HashMap<ScenarioKey<'_>, MetricMeans> = group_ordered(
        all.iter()
            .filter(|t| parse_drift(t.drift_case.as_deref()).is_baseline())
            .map(|t| (ScenarioKey::from(t), t)),
    )
    .into_iter()
    .map(|(key, trials)| (key, MetricMeans::of(&trials)))
    .collect();

    let groups = group_ordered(working.iter().filter_map(|t| {
        let case = parse_drift(t.drift_case.as_deref());
        (!case.is_baseline()).then(|| ((ScenarioKey::from(t), case), t))
    }));

    let delta_rows = groups
        .into_iter()
        .filter_map(|((scenario, case), trials)| {
            let baseline = baselines.get(&scenario)?;
            Some(DeltaRow {
                model_id: scenario.model_id.to_string(),
                prompt_mode: if scenario.prompt_mode.is_empty() {
                    "baseline".to_string()
                } else {
                    scenario.prompt_mode.to_string()
                },
                unit_tool: scenario.unit_tool,
                drift_kind: case.kind,
                drift_level: case.level,
                n: trials.len(),
                deltas: MetricMeans::of(&trials).minus(baseline),
            })
        })
        .collect::<Vec<_>>();

    let delta_summary = group_ordered(
        delta_rows
            .iter()
            .map(|row| ((row.drift_kind.as_str(), row.drift_level), row)),
    )
    .into_iter()
    .map(|((kind, level), rows)| DriftSummary {
        drift_kind: kind.to_string(),
        drift_level: level,
        n: rows.iter().map(|r| r.n).sum(),
        deltas: MetricDeltas::mean_of(rows.iter().map(|r| &r.deltas)),
    })
    .collect::<Vec<_>>();

    debug!(
        "Computed {} delta row(s) and {} summary group(s) from {} trial(s)",
        delta_rows.len(),
        delta_summary.len(),
        working.len()
    );
    DriftDeltaReport {
        delta_rows,
        delta_summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(model: &str, drift: Option<&str>, f1: Option<f64>) -> TrialRow {
        TrialRow {
            model_id: model.to_string(),
            prompt_mode: "baseline".to_string(),
            drift_case: drift.map(str::to_string),
            f1,
            ..TrialRow::default()
        }
    }

    #[test]
    fn parses_level_markers() {
        let cases = [
            (None, NO_DRIFT, None),
            (Some("NONE"), NO_DRIFT, None),
            (Some("header_noise:L2"), "header_noise", Some(2)),
            (Some("unit_change_level3"), "unit_change", Some(3)),
            (Some("type_shift-l1"), "type_shift", Some(1)),
            (Some("type_shift2"), "type_shift", Some(2)),
            (Some("missing_field2"), "missing_field", Some(2)),
            (Some("missing_field_3"), "missing_field", Some(3)),
            (Some("missing_field"), "missing_field", None),
            (Some("header_noise4"), "header_noise4", None),
            (Some("L2"), "L2", Some(2)),
        ];
        for (raw, kind, level) in cases {
            let parsed = parse_drift(raw);
            assert_eq!(parsed.kind, kind, "kind of {raw:?}");
            assert_eq!(parsed.level, level, "level of {raw:?}");
        }
    }

    #[test]
    fn valid_pct_falls_back_to_counts() {
        let mut t = TrialRow {
            valid_rows: Some(3.0),
            total_rows: Some(4.0),
            ..TrialRow::default()
        };
        assert_eq!(valid_pct_of(&t), Some(0.75));
        t.total_rows = Some(0.0);
        assert_eq!(valid_pct_of(&t), None);
        t.valid_rows_pct = Some(0.5);
        assert_eq!(valid_pct_of(&t), Some(0.5));
    }

    #[test]
    fn delta_is_group_mean_minus_baseline_mean() {
        let all = vec![
            trial("m", None, Some(0.9)),
            trial("m", Some("none"), Some(0.7)),
            trial("m", Some("header_noise:L1"), Some(0.5)),
            trial("m", Some("header_noise_l1"), Some(0.6)),
            trial("m", Some("type_shift"), None),
        ];
        let report = compute_drift_deltas(&all, None);
        assert_eq!(report.delta_rows.len(), 2);

        let noise = &report.delta_rows[0];
        assert_eq!(noise.drift_kind, "header_noise");
        assert_eq!(noise.drift_level, Some(1));
        assert_eq!(noise.n, 2);
        let d_f1 = noise.deltas.d_f1.expect("defined delta");
        assert!((d_f1 - (0.55 - 0.8)).abs() < 1e-9);

        let shift = &report.delta_rows[1];
        assert_eq!(shift.drift_kind, "type_shift");
        assert_eq!(shift.deltas.d_f1, None);
    }

    #[test]
    fn scenarios_without_baseline_are_skipped() {
        let all = vec![
            trial("a", None, Some(1.0)),
            trial("b", Some("missing_field"), Some(0.2)),
        ];
        let report = compute_drift_deltas(&all, None);
        assert!(report.delta_rows.is_empty());
        assert!(report.delta_summary.is_empty());
    }

    #[test]
    fn summary_averages_defined_deltas_across_models() {
        let all = vec![
            trial("a", None, Some(1.0)),
            trial("b", None, Some(0.8)),
            trial("c", None, None),
            trial("a", Some("unit_change2"), Some(0.6)),
            trial("b", Some("unit_change_L2"), Some(0.6)),
            trial("c", Some("unit_change:2"), Some(0.6)),
        ];
        let report = compute_drift_deltas(&all, None);
        assert_eq!(report.delta_rows.len(), 3);
        assert_eq!(report.delta_summary.len(), 1);
        let summary = &report.delta_summary[0];
        assert_eq!(summary.drift_kind, "unit_change");
        assert_eq!(summary.drift_level, Some(2));
        assert_eq!(summary.n, 3);
        let d_f1 = summary.deltas.d_f1.expect("defined mean");
        assert!((d_f1 - (-0.3)).abs() < 1e-9);
        assert_eq!(summary.deltas.d_precision, None);
    }

    #[test]
    fn filtered_subset_reports_against_full_baselines() {
        let all = vec![
            trial("a", None, Some(1.0)),
            trial("a", Some("missing_field"), Some(0.5)),
            trial("b", None, Some(1.0)),
            trial("b", Some("missing_field"), Some(0.9)),
        ];
        let subset = vec![all[3].clone()];
        let report = compute_drift_deltas(&all, Some(subset.as_slice()));
        assert_eq!(report.delta_rows.len(), 1);
        assert_eq!(report.delta_rows[0].model_id, "b");

        let report = compute_drift_deltas(&all, Some(&[][..]));
        assert_eq!(report.delta_rows.len(), 2);
    }

    #[test]
    fn delta_rows_serialize_with_short_metric_names() {
        let all = vec![
            trial("a", None, Some(1.0)),
            trial("a", Some("missing_field"), Some(0.5)),
        ];
        let report = compute_drift_deltas(&all, None);
        let json = serde_json::to_value(&report).unwrap();
        let row = &json["deltaRows"][0];
        assert_eq!(row["dF1"], -0.5);
        assert_eq!(row["driftLevel"], serde_json::Value::Null);
        assert!(row.get("dPrecision").is_none());
    }
}
