pub mod cli;
pub mod compiler;
pub mod data;
pub mod deltas;
pub mod drift;
pub mod io_utils;
pub mod issue;
pub mod profile;
pub mod scoring;
pub mod spec;
pub mod sweep;
pub mod table;
pub mod validate;
pub mod verify;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use itertools::Itertools;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    deltas::{DriftDeltaReport, TrialRow},
    spec::{PredictedSpec, SpecDoc},
    sweep::Sweep,
    table::format_metric,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("specbench", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Profile(args) => handle_profile(&args),
        Commands::Validate(args) => verify::execute(&args),
        Commands::Score(args) => handle_score(&args),
        Commands::Drift(args) => handle_drift(&args),
        Commands::Sweep(args) => handle_sweep(&args),
        Commands::Inject(args) => handle_inject(&args),
    }
}

fn handle_profile(args: &cli::ProfileArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.csv.delimiter);
    info!(
        "Profiling '{}' with delimiter '{}'",
        args.input.display(),
        printable_delimiter(delimiter)
    );
    let encoding = io_utils::resolve_encoding(args.csv.input_encoding.as_deref())?;
    let data = io_utils::read_table(&args.input, delimiter, encoding)?;
    let profile = profile::profile_rows(&data.header, &data.rows, args.sample_rows);
    io_utils::write_document(&args.output, &profile)
        .with_context(|| format!("Writing profile to {:?}", args.output))?;
    info!(
        "Profile of {} column(s) across {} row(s) written to {:?}",
        profile.columns.len(),
        profile.row_count,
        args.output
    );
    Ok(())
}

fn handle_score(args: &cli::ScoreArgs) -> Result<()> {
    let truth = SpecDoc::load(&args.truth)?;
    let predicted = PredictedSpec::load(&args.predicted)?;
    debug!(
        "Scoring {} predicted field(s) against {} truth field(s)",
        predicted.fields.len(),
        truth.fields.len()
    );
    let score = scoring::score_prediction(&truth, &predicted);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&score)?);
        return Ok(());
    }
    let rows = [
        ("precision", score.precision),
        ("recall", score.recall),
        ("f1", score.f1),
        ("typeAcc", score.type_acc),
        ("unitAcc", score.unit_acc),
    ]
    .iter()
    .map(|(name, value)| vec![name.to_string(), format_metric(Some(*value))])
    .collect::<Vec<_>>();
    table::print_table(&["metric".to_string(), "score".to_string()], &rows);
    Ok(())
}

fn handle_drift(args: &cli::DriftArgs) -> Result<()> {
    let trials: Vec<TrialRow> = io_utils::read_document(&args.trials)
        .with_context(|| format!("Loading trials from {:?}", args.trials))?;
    let filtered = trials
        .iter()
        .filter(|t| args.models.is_empty() || args.models.contains(&t.model_id))
        .cloned()
        .collect::<Vec<_>>();
    if !args.models.is_empty() && filtered.is_empty() {
        info!(
            "No trials for model(s) {}; reporting every trial",
            args.models.iter().join(", ")
        );
    }
    let report = deltas::compute_drift_deltas(&trials, Some(filtered.as_slice()));
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_drift_report(&report);
    }
    Ok(())
}

fn print_drift_report(report: &DriftDeltaReport) {
    let metric_headers = ["dF1", "dPrecision", "dRecall", "dTypeAcc", "dUnitAcc", "dValidRowsPct"];
    let level = |level: Option<u8>| level.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string());
    let metric_cells = |d: &deltas::MetricDeltas| {
        [
            d.d_f1,
            d.d_precision,
            d.d_recall,
            d.d_type_acc,
            d.d_unit_acc,
            d.d_valid_rows_pct,
        ]
        .into_iter()
        .map(format_metric)
        .collect::<Vec<_>>()
    };

    let headers = ["model", "prompt", "unitTool", "drift", "level", "n"]
        .iter()
        .chain(metric_headers.iter())
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = report
        .delta_rows
        .iter()
        .map(|row| {
            let mut cells = vec![
                row.model_id.clone(),
                row.prompt_mode.clone(),
                row.unit_tool.to_string(),
                row.drift_kind.clone(),
                level(row.drift_level),
                row.n.to_string(),
            ];
            cells.extend(metric_cells(&row.deltas));
            cells
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    println!();

    let headers = ["drift", "level", "n"]
        .iter()
        .chain(metric_headers.iter())
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = report
        .delta_summary
        .iter()
        .map(|summary| {
            let mut cells = vec![
                summary.drift_kind.clone(),
                level(summary.drift_level),
                summary.n.to_string(),
            ];
            cells.extend(metric_cells(&summary.deltas));
            cells
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
}

fn handle_sweep(args: &cli::SweepArgs) -> Result<()> {
    let sweep = Sweep::load(&args.matrix)?;
    let combinations = sweep.combinations();
    info!("Sweep expands to {} combination(s)", combinations.len());
    let headers = ["model", "prompt", "unitTool", "drift"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = combinations
        .into_iter()
        .map(|c| vec![c.model_id, c.prompt_mode, c.unit_tool.to_string(), c.drift_case])
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(())
}

fn handle_inject(args: &cli::InjectArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.csv.delimiter);
    let encoding = io_utils::resolve_encoding(args.csv.input_encoding.as_deref())?;
    let data = io_utils::read_table(&args.input, delimiter, encoding)?;
    let drifted = sweep::apply_drift(&data, &args.drift);
    io_utils::write_table(args.output.as_deref(), delimiter, &drifted)
        .with_context(|| format!("Writing drifted copy of {:?}", args.input))?;
    info!(
        "Applied '{}' drift to {:?} ({} row(s))",
        args.drift,
        args.input,
        drifted.rows.len()
    );
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
