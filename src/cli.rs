use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{drift::DEFAULT_NULL_RATE_THRESHOLD, sweep::DriftKind};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Validate datasets against versioned specs and score predicted schemas",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Profile a CSV file: inferred types, null rates, distinct counts and units
    Profile(ProfileArgs),
    /// Validate a CSV file against a spec and report metrics and issues
    Validate(ValidateArgs),
    /// Score a predicted spec against a ground-truth spec
    Score(ScoreArgs),
    /// Aggregate trial results into drift deltas against no-drift baselines
    Drift(DriftArgs),
    /// Expand a sweep matrix into its trial combinations
    Sweep(SweepArgs),
    /// Write a copy of a CSV file with synthetic drift applied
    Inject(InjectArgs),
}

#[derive(Debug, Args)]
pub struct CsvInputArgs {
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    /// Input CSV file to profile
    #[arg(short, long)]
    pub input: PathBuf,
    /// Destination profile document (.json, .yaml)
    #[arg(short, long)]
    pub output: PathBuf,
    /// Non-empty values per column used for type and unit detection (0 means all)
    #[arg(long, default_value_t = 200)]
    pub sample_rows: usize,
    #[command(flatten)]
    pub csv: CsvInputArgs,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Input CSV file to validate
    #[arg(short, long)]
    pub input: PathBuf,
    /// Spec document (.json, .yaml)
    #[arg(short, long)]
    pub spec: PathBuf,
    /// Strip unit text trailing numbers (e.g. `12 kg`) before parsing
    #[arg(long)]
    pub unit_tool: bool,
    /// Previously written profile to check for drift against the spec
    #[arg(long, conflicts_with = "auto_profile")]
    pub profile: Option<PathBuf>,
    /// Profile the input on the fly and check it for drift
    #[arg(long)]
    pub auto_profile: bool,
    /// Null rate above which a profiled column is reported
    #[arg(long, default_value_t = DEFAULT_NULL_RATE_THRESHOLD)]
    pub null_rate_threshold: f64,
    /// Match headers case-insensitively and report undeclared keys per row
    #[arg(long)]
    pub tolerant_headers: bool,
    /// Write the full validation report to this document (.json, .yaml)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub csv: CsvInputArgs,
}

#[derive(Debug, Args)]
pub struct ScoreArgs {
    /// Ground-truth spec document
    #[arg(long)]
    pub truth: PathBuf,
    /// Predicted spec document
    #[arg(long)]
    pub predicted: PathBuf,
    /// Print the score as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DriftArgs {
    /// Trial list document (JSON or YAML array of trial rows)
    #[arg(short, long)]
    pub trials: PathBuf,
    /// Report only these models; baselines still come from every trial
    #[arg(long = "model", action = clap::ArgAction::Append)]
    pub models: Vec<String>,
    /// Print the report as JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Sweep matrix document with models, promptModes, unitTool and driftCases
    #[arg(short, long)]
    pub matrix: PathBuf,
}

#[derive(Debug, Args)]
pub struct InjectArgs {
    /// Input CSV file
    #[arg(short, long)]
    pub input: PathBuf,
    /// Drift to apply: header_noise, unit_change, type_shift, missing_field
    #[arg(long, value_parser = parse_drift_kind)]
    pub drift: DriftKind,
    /// Output CSV file (stdout if omitted or '-')
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub csv: CsvInputArgs,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

/// Drift labels may carry a level (`type_shift:L2`); the kind must be known.
pub fn parse_drift_kind(value: &str) -> Result<DriftKind, String> {
    match value.parse::<DriftKind>() {
        Ok(DriftKind::None) if !value.eq_ignore_ascii_case("none") => Err(format!(
            "Unknown drift '{value}'. Expected one of: {}",
            DriftKind::variants().join(", ")
        )),
        Ok(kind) => Ok(kind),
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_aliases() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("semicolon"), Ok(b';'));
        assert_eq!(parse_delimiter(":"), Ok(b':'));
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn drift_kind_rejects_unknown_labels() {
        assert_eq!(parse_drift_kind("header_noise:L1"), Ok(DriftKind::HeaderNoise));
        assert_eq!(parse_drift_kind("none"), Ok(DriftKind::None));
        assert!(parse_drift_kind("reorder").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
