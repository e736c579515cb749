use chrono::{Local, TimeZone};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use recorder::session::{CaptureSession, MediaKind, SessionId};
use recorder::title::{sanitize_title, SourceId, TitleResolution};
use recorder::utils::organizer::{
    compute_destination, sanitize_component, OrganizationPolicy, OrganizeMode,
};
use std::path::PathBuf;

fn benchmark_sanitize_component(c: &mut Criterion) {
    let mut group = c.benchmark_group("Component Sanitization");

    group.bench_function("simple", |b| {
        b.iter(|| sanitize_component(black_box("Any Recording")))
    });

    group.bench_function("malicious", |b| {
        b.iter(|| sanitize_component(black_box("../../../etc/passwd")))
    });

    let long_name = "a".repeat(500);
    group.bench_function("long", |b| {
        b.iter(|| sanitize_component(black_box(&long_name)))
    });

    group.finish();
}

fn benchmark_sanitize_title(c: &mut Criterion) {
    let mut group = c.benchmark_group("Title Sanitization");

    group.bench_function("plain", |b| {
        b.iter(|| sanitize_title(black_box("Game A")))
    });

    group.bench_function("noisy", |b| {
        b.iter(|| sanitize_title(black_box("  Elden Ring™ -- v1.10   [DX12]  ")))
    });

    group.finish();
}

fn benchmark_compute_destination(c: &mut Criterion) {
    let mut group = c.benchmark_group("Destination");
    let started_at = Local
        .with_ymd_and_hms(2024, 5, 1, 23, 30, 0)
        .single()
        .unwrap_or_else(Local::now);
    let session = CaptureSession::new(
        SessionId::from(1u64),
        SourceId::Any,
        MediaKind::Recording,
        started_at,
    )
    .with_title(TitleResolution::Resolved("Game A".into()));
    let file = PathBuf::from("/captures/2024-05-01 23-30-00.mkv");

    for (name, mode, prefix) in [
        ("basic", OrganizeMode::Basic, false),
        ("by_date_prefixed", OrganizeMode::GroupByDate, true),
    ] {
        let policy = OrganizationPolicy {
            mode,
            prefix_filename_with_title: prefix,
            ..Default::default()
        };
        group.bench_function(name, |b| {
            b.iter(|| compute_destination(black_box(&session), black_box(&file), &policy))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_sanitize_component,
    benchmark_sanitize_title,
    benchmark_compute_destination
);
criterion_main!(benches);
