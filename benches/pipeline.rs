//! Benchmarks for ctxpack parsing, extraction and formatting.
//!
//! Run with: `cargo bench`
//! Run specific group: `cargo bench --bench pipeline -- extract`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use ctxpack::config::FormatterConfig;
use ctxpack::core::pack::ProjectBrief;
use ctxpack::core::{FilterConfig, UniversalContextPack, apply_filters, merge_packs, to_json};
use ctxpack::extract::ContextExtractor;
use ctxpack::format::{TargetPlatform, format_pack};
use ctxpack::parser::Parser;
use ctxpack::parsers::ChatGptParser;
use ctxpack::prelude::ExtractorConfig;

use chrono::{Duration, TimeZone, Utc};

const PROJECTS: [&str; 6] = ["Ferrite", "Harbor", "Budget Tracker", "Trellis", "Lumen", "Quarry"];
const TECH: [&str; 5] = ["Rust", "Python", "Docker", "PostgreSQL", "React"];

// =============================================================================
// Test Data Generators
// =============================================================================

/// Builds a `mapping`-style export with `count` conversations of four turns each.
fn generate_export_json(count: usize) -> String {
    let mut conversations = Vec::with_capacity(count);
    for i in 0..count {
        let project = PROJECTS[i % PROJECTS.len()];
        let tech = TECH[i % TECH.len()];
        let start = 1_717_236_000 + (i as i64 * 3_600);
        let mut nodes = Vec::with_capacity(4);
        for turn in 0..4 {
            let (role, text) = if turn % 2 == 0 {
                (
                    "user",
                    format!("I'm building {project} with {tech}. I'm stuck on a memory leak in step {turn}."),
                )
            } else {
                ("assistant", format!("Here is an idea for {project}, step {turn}."))
            };
            let parent = if turn == 0 {
                "null".to_string()
            } else {
                format!("\"n{}\"", turn - 1)
            };
            let children = if turn == 3 {
                String::new()
            } else {
                format!("\"n{}\"", turn + 1)
            };
            nodes.push(format!(
                r#""n{turn}": {{"id": "n{turn}", "parent": {parent}, "children": [{children}], "message": {{"author": {{"role": "{role}"}}, "create_time": {}, "content": {{"content_type": "text", "parts": ["{text}"]}}}}}}"#,
                start + turn * 60
            ));
        }
        conversations.push(format!(
            r#"{{"id": "conv-{i}", "title": "{project}", "create_time": {start}, "update_time": {}, "current_node": "n3", "mapping": {{{}}}}}"#,
            start + 180,
            nodes.join(", ")
        ));
    }
    format!("[{}]", conversations.join(",\n"))
}

/// Builds a pack with `count` distinct projects.
fn generate_pack(count: usize) -> UniversalContextPack {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let projects = (0..count)
        .map(|i| {
            ProjectBrief::new(
                format!("{} {i}", PROJECTS[i % PROJECTS.len()]),
                (i % 100) as f64 / 100.0,
                base - Duration::days(i as i64),
            )
            .with_description(format!("Project number {i}, a small tool written for fun"))
            .with_tech([TECH[i % TECH.len()]])
            .with_challenge("memory leak")
            .with_conversation(format!("conv-{i}"))
        })
        .collect();
    UniversalContextPack::new("chatgpt", base).with_projects(projects)
}

// =============================================================================
// Parsing Benchmarks
// =============================================================================

fn bench_chatgpt_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("chatgpt_parsing");
    let parser = ChatGptParser::new();

    for size in [10_usize, 100, 1_000, 5_000] {
        let json = generate_export_json(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &json, |b, json| {
            b.iter(|| {
                let export = parser.parse_str(black_box(json)).unwrap();
                black_box(export)
            });
        });
    }
    group.finish();
}

// =============================================================================
// Extraction Benchmarks
// =============================================================================

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    let parser = ChatGptParser::new();
    let extractor = ContextExtractor::new(ExtractorConfig::default()).unwrap();

    for size in [10_usize, 100, 1_000] {
        let export = parser.parse_str(&generate_export_json(size)).unwrap();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("whole", size), &export, |b, export| {
            b.iter(|| {
                let pack = extractor.extract(black_box(&export.conversations), export.export_date);
                black_box(pack)
            });
        });
        group.bench_with_input(BenchmarkId::new("chunked_50", size), &export, |b, export| {
            b.iter(|| {
                let pack = extractor.extract_chunked(
                    black_box(&export.conversations),
                    50,
                    export.export_date,
                );
                black_box(pack)
            });
        });
    }
    group.finish();
}

// =============================================================================
// Pack Operation Benchmarks
// =============================================================================

fn bench_apply_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_filters");
    let config = FilterConfig::new()
        .exclude_topic("python")
        .with_min_relevance(0.3)
        .unwrap();

    for size in [10_usize, 100, 1_000] {
        let pack = generate_pack(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &pack, |b, pack| {
            b.iter(|| {
                let filtered = apply_filters(black_box(pack), &config);
                black_box(filtered)
            });
        });
    }
    group.finish();
}

fn bench_merge_packs(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_packs");

    for size in [10_usize, 100, 1_000] {
        let previous = generate_pack(size);
        let current = generate_pack(size + size / 2);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &(previous, current),
            |b, (previous, current)| {
                b.iter(|| {
                    let merged = merge_packs(black_box(previous), black_box(current));
                    black_box(merged)
                });
            },
        );
    }
    group.finish();
}

// =============================================================================
// Formatting Benchmarks
// =============================================================================

fn bench_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("format");
    let config = FormatterConfig::default();

    for size in [10_usize, 100, 1_000] {
        let pack = generate_pack(size);
        group.throughput(Throughput::Elements(size as u64));
        for target in [TargetPlatform::Gemini, TargetPlatform::Ollama] {
            group.bench_with_input(BenchmarkId::new(target.to_string(), size), &pack, |b, pack| {
                b.iter(|| {
                    let bundle = format_pack(black_box(pack), target, &config).unwrap();
                    black_box(bundle)
                });
            });
        }
    }
    group.finish();
}

fn bench_pack_json(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_json");

    for size in [10_usize, 100, 1_000] {
        let pack = generate_pack(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &pack, |b, pack| {
            b.iter(|| {
                let json = to_json(black_box(pack)).unwrap();
                black_box(json)
            });
        });
    }
    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(parsing, bench_chatgpt_parsing);
criterion_group!(extraction, bench_extract);
criterion_group!(pack_ops, bench_apply_filters, bench_merge_packs);
criterion_group!(formatting, bench_format, bench_pack_json);

criterion_main!(parsing, extraction, pack_ops, formatting);
