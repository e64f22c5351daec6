// ABOUTME: Criterion benchmarks for telemetry geometry and pace segmentation
// ABOUTME: Measures track detection and pace segmenting over oval and road streams
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! Criterion benchmarks for the enrichment hot paths.
//!
//! Track detection dominates enrichment time for long GPS streams, so it is
//! measured against both a stream that matches (oval) and one that is rejected
//! window by window (road).

#![allow(clippy::missing_docs_in_private_items, missing_docs)]

mod common;

use common::fixtures::{oval_stream, road_stream, StreamLength};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use runbase_intelligence::geometry::track::{KnownTracks, TrackDetector};
use runbase_intelligence::pace_segments::{segment_by_pace, PaceSegmentConfig};
use runbase_intelligence::ZoneBoundaries;

const LENGTHS: [StreamLength; 3] = [StreamLength::Short, StreamLength::Medium, StreamLength::Long];

fn bench_track_detection(c: &mut Criterion) {
    let detector = TrackDetector::default();
    let known = KnownTracks::default();
    let mut group = c.benchmark_group("track_detection");

    for length in LENGTHS {
        let oval = oval_stream(length);
        let road = road_stream(length);
        group.throughput(Throughput::Elements(length.seconds() as u64));

        group.bench_with_input(BenchmarkId::new("oval", length.label()), &oval, |b, points| {
            b.iter(|| detector.detect(black_box(points), &known, None));
        });
        group.bench_with_input(BenchmarkId::new("road", length.label()), &road, |b, points| {
            b.iter(|| detector.detect(black_box(points), &known, None));
        });
    }
    group.finish();
}

fn bench_pace_segmentation(c: &mut Criterion) {
    let Ok(zones) = ZoneBoundaries::from_vdot(50.0, 410.0) else {
        return;
    };
    let config = PaceSegmentConfig::default();
    let mut group = c.benchmark_group("pace_segmentation");

    for length in LENGTHS {
        let road = road_stream(length);
        group.throughput(Throughput::Elements(length.seconds() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(length.label()), &road, |b, points| {
            b.iter(|| segment_by_pace(black_box(points), &zones, &config));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_track_detection, bench_pace_segmentation);
criterion_main!(benches);
