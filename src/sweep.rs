//! Experiment sweeps: the cartesian matrix of trial settings, and the
//! synthetic drift applied to a dataset before a trial sees it.

use std::{fmt, path::Path, str::FromStr};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{
    deltas::{DriftCase, NO_DRIFT, parse_drift},
    io_utils::{self, Table},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SweepError {
    #[error("Sweep axis '{0}' must list at least one value")]
    EmptyAxis(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sweep {
    pub models: Vec<String>,
    pub prompt_modes: Vec<String>,
    pub unit_tool: Vec<bool>,
    pub drift_cases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combination {
    pub model_id: String,
    pub prompt_mode: String,
    pub unit_tool: bool,
    pub drift_case: String,
}

impl Sweep {
    pub fn check(&self) -> Result<(), SweepError> {
        let axes = [
            ("models", self.models.is_empty()),
            ("promptModes", self.prompt_modes.is_empty()),
            ("unitTool", self.unit_tool.is_empty()),
            ("driftCases", self.drift_cases.is_empty()),
        ];
        match axes.into_iter().find(|(_, empty)| *empty) {
            Some((axis, _)) => Err(SweepError::EmptyAxis(axis)),
            None => Ok(()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let sweep: Sweep = io_utils::read_document(path)
            .with_context(|| format!("Loading sweep matrix from {path:?}"))?;
        sweep.check()?;
        Ok(sweep)
    }

    /// Every setting combination, models outermost and drift cases innermost.
    pub fn combinations(&self) -> Vec<Combination> {
        let mut out = Vec::with_capacity(
            self.models.len() * self.prompt_modes.len() * self.unit_tool.len() * self.drift_cases.len(),
        );
        for model_id in &self.models {
            for prompt_mode in &self.prompt_modes {
                for &unit_tool in &self.unit_tool {
                    for drift_case in &self.drift_cases {
                        out.push(Combination {
                            model_id: model_id.clone(),
                            prompt_mode: prompt_mode.clone(),
                            unit_tool,
                            drift_case: drift_case.clone(),
                        });
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftKind {
    HeaderNoise,
    UnitChange,
    TypeShift,
    MissingField,
    None,
}

impl DriftKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftKind::HeaderNoise => "header_noise",
            DriftKind::UnitChange => "unit_change",
            DriftKind::TypeShift => "type_shift",
            DriftKind::MissingField => "missing_field",
            DriftKind::None => NO_DRIFT,
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["header_noise", "unit_change", "type_shift", "missing_field", NO_DRIFT]
    }
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&DriftCase> for DriftKind {
    fn from(case: &DriftCase) -> Self {
        match case.kind.to_ascii_lowercase().as_str() {
            "header_noise" => DriftKind::HeaderNoise,
            "unit_change" => DriftKind::UnitChange,
            "type_shift" => DriftKind::TypeShift,
            "missing_field" => DriftKind::MissingField,
            _ => DriftKind::None,
        }
    }
}

impl FromStr for DriftKind {
    type Err = std::convert::Infallible;

    /// Accepts full drift labels (`type_shift:L2`); unknown kinds map to
    /// [`DriftKind::None`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DriftKind::from(&parse_drift(Some(s))))
    }
}

const HEADER_NOISE_RATE: f64 = 0.4;
const TYPE_SHIFT_RATE: f64 = 0.2;
const UNIT_COLUMNS: [&str; 3] = ["amount", "price", "total"];

/// Deterministic coin flip: the first two digest bytes of `seed` as a
/// fraction of 2^16.
fn selected(seed: &str, rate: f64) -> bool {
    let digest = Sha256::digest(seed.as_bytes());
    let draw = f64::from(u16::from_be_bytes([digest[0], digest[1]])) / 65536.0;
    draw < rate
}

/// Returns a drifted copy of `table`. The same input always drifts the same
/// way.
pub fn apply_drift(table: &Table, kind: &DriftKind) -> Table {
    let mut drifted = table.clone();
    match kind {
        DriftKind::HeaderNoise => {
            for (idx, name) in drifted.header.iter_mut().enumerate() {
                if selected(&format!("header:{idx}:{name}"), HEADER_NOISE_RATE) {
                    *name = name.replace('_', " ").to_uppercase();
                }
            }
        }
        DriftKind::UnitChange => {
            for name in drifted.header.iter_mut() {
                let lower = name.to_lowercase();
                if UNIT_COLUMNS.iter().any(|token| lower.contains(token)) {
                    name.push_str(" (USD)");
                }
            }
        }
        DriftKind::TypeShift => {
            for (row_idx, row) in drifted.rows.iter_mut().enumerate() {
                for (col_idx, value) in row.iter_mut().enumerate() {
                    if selected(&format!("cell:{row_idx}:{col_idx}:{value}"), TYPE_SHIFT_RATE) {
                        *value = format!("\"{value}\"");
                    }
                }
            }
        }
        DriftKind::MissingField => {
            drifted.header.pop();
            let width = drifted.header.len();
            for row in drifted.rows.iter_mut() {
                row.truncate(width);
            }
        }
        DriftKind::None => {}
    }
    debug!(
        "Applied drift '{kind}' to {} column(s) and {} row(s)",
        table.header.len(),
        table.rows.len()
    );
    drifted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table {
            header: vec![
                "order_id".to_string(),
                "unit_price".to_string(),
                "Total".to_string(),
                "placed_on".to_string(),
            ],
            rows: vec![
                vec!["1".into(), "9.50".into(), "19.00".into(), "2024-01-02".into()],
                vec!["2".into(), "3".into()],
            ],
        }
    }

    #[test]
    fn combinations_follow_axis_order() {
        let sweep = Sweep {
            models: vec!["m1".into(), "m2".into()],
            prompt_modes: vec!["baseline".into()],
            unit_tool: vec![false, true],
            drift_cases: vec!["none".into(), "header_noise".into()],
        };
        let combos = sweep.combinations();
        assert_eq!(combos.len(), 8);
        assert_eq!(combos[0].model_id, "m1");
        assert!(!combos[0].unit_tool);
        assert_eq!(combos[1].drift_case, "header_noise");
        assert!(combos[2].unit_tool);
        assert_eq!(combos[4].model_id, "m2");
    }

    #[test]
    fn empty_axis_is_rejected() {
        let sweep = Sweep {
            models: vec!["m".into()],
            prompt_modes: Vec::new(),
            unit_tool: vec![false],
            drift_cases: vec!["none".into()],
        };
        assert_eq!(sweep.check(), Err(SweepError::EmptyAxis("promptModes")));
    }

    #[test]
    fn drift_labels_map_to_kinds() {
        assert_eq!("type_shift:L2".parse::<DriftKind>(), Ok(DriftKind::TypeShift));
        assert_eq!("MISSING_FIELD".parse::<DriftKind>(), Ok(DriftKind::MissingField));
        assert_eq!("reorder".parse::<DriftKind>(), Ok(DriftKind::None));
    }

    #[test]
    fn unit_change_tags_money_columns() {
        let drifted = apply_drift(&table(), &DriftKind::UnitChange);
        assert_eq!(
            drifted.header,
            vec!["order_id", "unit_price (USD)", "Total (USD)", "placed_on"]
        );
        assert_eq!(drifted.rows, table().rows);
    }

    #[test]
    fn missing_field_drops_last_column() {
        let drifted = apply_drift(&table(), &DriftKind::MissingField);
        assert_eq!(drifted.header.len(), 3);
        assert_eq!(drifted.rows[0].len(), 3);
        assert_eq!(drifted.rows[1], vec!["2", "3"]);
    }

    #[test]
    fn noisy_drift_is_deterministic_and_shaped() {
        let wide = Table {
            header: (0..40).map(|i| format!("col_{i}")).collect(),
            rows: vec![(0..40).map(|i| i.to_string()).collect()],
        };
        let noisy = apply_drift(&wide, &DriftKind::HeaderNoise);
        assert_eq!(noisy, apply_drift(&wide, &DriftKind::HeaderNoise));
        let changed = noisy
            .header
            .iter()
            .zip(&wide.header)
            .filter(|(after, before)| after != before)
            .inspect(|(after, before)| {
                assert_eq!(**after, before.replace('_', " ").to_uppercase())
            })
            .count();
        assert!(changed > 0 && changed < wide.header.len());

        let shifted = apply_drift(&wide, &DriftKind::TypeShift);
        for (after, before) in shifted.rows[0].iter().zip(&wide.rows[0]) {
            assert!(after == before || *after == format!("\"{before}\""));
        }
        assert_eq!(apply_drift(&wide, &DriftKind::None), wide);
    }
}
