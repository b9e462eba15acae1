use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use specbench::profile::{DEFAULT_SAMPLE_ROWS, profile_rows};
use specbench::spec::{FieldSpec, FieldType, SpecDoc};
use specbench::validate::{ValidationOptions, validate_rows, validate_rows_tolerant};

fn generate_orders(rows: usize) -> (Vec<String>, Vec<Vec<String>>) {
    let header = ["order_id", "amount", "weight", "status", "placed_on"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let body = (0..rows)
        .map(|i| {
            let status = match i % 3 {
                0 => "shipped",
                1 => "pending",
                _ => "lost",
            };
            let amount = if i % 50 == 0 {
                "n/a".to_string()
            } else {
                format!("{},{:03}.{:02}", i % 9 + 1, i % 1000, i % 100)
            };
            vec![
                format!("A-{i}"),
                amount,
                format!("{}.{} kg", i % 40, i % 10),
                status.to_string(),
                format!("2024-{:02}-{:02}", i % 12 + 1, i % 28 + 1),
            ]
        })
        .collect();
    (header, body)
}

fn orders_spec() -> SpecDoc {
    SpecDoc::new(
        "orders",
        "1",
        vec![
            FieldSpec::new("order_id", FieldType::String)
                .required()
                .with_regex("^A-[0-9]+$"),
            FieldSpec::new("amount", FieldType::Number).required(),
            FieldSpec::new("weight", FieldType::Number).with_unit("kg"),
            FieldSpec::new("status", FieldType::String).with_enum(["pending", "shipped"]),
            FieldSpec::new("placed_on", FieldType::Date),
        ],
    )
}

fn bench_validate_rows(c: &mut Criterion) {
    let (header, rows) = generate_orders(10_000);
    let spec = orders_spec();
    let profile = profile_rows(&header, &rows, DEFAULT_SAMPLE_ROWS);

    let mut group = c.benchmark_group("validate_10k_rows");
    group.sample_size(20);
    group.bench_function("exact_headers", |b| {
        let options = ValidationOptions::default();
        b.iter(|| validate_rows(black_box(&header), black_box(&rows), &spec, &options))
    });
    group.bench_function("unit_tool_with_profile", |b| {
        let options = ValidationOptions {
            unit_tool: true,
            profile: Some(&profile),
            ..ValidationOptions::default()
        };
        b.iter(|| validate_rows(black_box(&header), black_box(&rows), &spec, &options))
    });
    group.bench_function("tolerant_headers", |b| {
        let options = ValidationOptions::default();
        b.iter(|| validate_rows_tolerant(black_box(&header), black_box(&rows), &spec, &options))
    });
    group.bench_function("profile", |b| {
        b.iter(|| profile_rows(black_box(&header), black_box(&rows), DEFAULT_SAMPLE_ROWS))
    });
    group.finish();
}

criterion_group!(benches, bench_validate_rows);
criterion_main!(benches);
