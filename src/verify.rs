use anyhow::{Context, Result, bail};
use log::{info, warn};

use crate::{
    cli::ValidateArgs,
    io_utils,
    issue::ValidationIssue,
    profile::{self, DatasetProfileResult},
    spec::SpecDoc,
    table,
    validate::{
        ValidationOptions, ValidationReport, ValidationResult, validate_rows,
        validate_rows_tolerant,
    },
};

pub fn execute(args: &ValidateArgs) -> Result<()> {
    let input_encoding = io_utils::resolve_encoding(args.csv.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.csv.delimiter);
    let spec = SpecDoc::load(&args.spec)?;
    let data = io_utils::read_table(&args.input, delimiter, input_encoding)?;
    info!(
        "Validating {} row(s) of {:?} against spec '{}' v{}",
        data.rows.len(),
        args.input,
        spec.name,
        spec.version
    );

    let profile = load_profile(args, &data)?;
    let options = ValidationOptions {
        unit_tool: args.unit_tool,
        profile: profile.as_ref(),
        null_rate_threshold: args.null_rate_threshold,
    };
    let result = if args.tolerant_headers {
        validate_rows_tolerant(&data.header, &data.rows, &spec, &options)
    } else {
        validate_rows(&data.header, &data.rows, &spec, &options)
    };

    print_result(&result);

    let errors = result.error_count();
    let passed = result.passed;
    if let Some(path) = &args.output {
        let report = ValidationReport::new(&spec, &options, result);
        io_utils::write_document(path, &report)
            .with_context(|| format!("Writing validation report to {path:?}"))?;
        info!("Validation report {} written to {:?}", report.id, path);
    }

    if !passed {
        bail!("{:?} failed validation with {errors} error(s)", args.input);
    }
    info!("✓ {:?} matches spec '{}'", args.input, spec.name);
    Ok(())
}

fn load_profile(args: &ValidateArgs, data: &io_utils::Table) -> Result<Option<DatasetProfileResult>> {
    if args.auto_profile {
        return Ok(Some(profile::profile_rows(
            &data.header,
            &data.rows,
            profile::DEFAULT_SAMPLE_ROWS,
        )));
    }
    let Some(path) = &args.profile else {
        return Ok(None);
    };
    let loaded: DatasetProfileResult = io_utils::read_document(path)
        .with_context(|| format!("Loading profile from {path:?}"))?;
    let current = profile::sample_hash(data.rows.len(), &data.header);
    if !loaded.is_fresh(&current) {
        warn!("Profile {path:?} does not match the current shape of {:?}", args.input);
    }
    Ok(Some(loaded))
}

fn print_result(result: &ValidationResult) {
    let metrics = &result.metrics;
    let summary = vec![
        vec!["precision".to_string(), table::format_metric(Some(metrics.schema_match.precision))],
        vec!["recall".to_string(), table::format_metric(Some(metrics.schema_match.recall))],
        vec!["f1".to_string(), table::format_metric(Some(metrics.schema_match.f1))],
        vec!["valid rows".to_string(), metrics.valid_rows.to_string()],
        vec!["total rows".to_string(), metrics.total_rows.to_string()],
        vec!["errors".to_string(), result.error_count().to_string()],
        vec!["warnings".to_string(), result.warning_count().to_string()],
        vec!["passed".to_string(), result.passed.to_string()],
    ];
    table::print_table(&["metric".to_string(), "value".to_string()], &summary);

    if result.issues.is_empty() {
        return;
    }
    println!();
    let headers = ["severity", "code", "column", "row", "message"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = result.issues.iter().map(issue_row).collect::<Vec<_>>();
    table::print_table(&headers, &rows);
}

fn issue_row(issue: &ValidationIssue) -> Vec<String> {
    vec![
        issue.severity.to_string(),
        issue.code.to_string(),
        issue.col_name.clone().unwrap_or_default(),
        issue.row_index.map(|r| r.to_string()).unwrap_or_default(),
        issue.message.clone(),
    ]
}
