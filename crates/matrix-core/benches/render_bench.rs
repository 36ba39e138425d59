//! Criterion benchmarks for the text rendering hot paths.
//!
//! A scroll is rendered once up front, so build time bounds how quickly the
//! first frame can reach the display after a request.
//!
//! Run with:
//! ```bash
//! cargo bench --package matrix-core --bench render_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use matrix_core::protocol::command::pack_grid;
use matrix_core::{
    DisplayGeometry, GlyphTable, Grid, ScrollConfig, ScrollDirection, SpanCompositor, TextScroller,
};

const SAMPLE_TEXT: &str = "THE QUICK BROWN FOX 0123456789";

// ── Benchmarks: TextScroller ──────────────────────────────────────────────────

/// Benchmarks [`TextScroller::build`] for each scroll direction.
fn bench_scroll_build(c: &mut Criterion) {
    let table = GlyphTable::bundled();
    let mut group = c.benchmark_group("scroll_build");

    for direction in [ScrollDirection::Horizontal, ScrollDirection::Up] {
        let scroller = TextScroller::new(
            ScrollConfig {
                direction,
                ..ScrollConfig::default()
            },
            DisplayGeometry::default(),
        );
        group.bench_with_input(
            BenchmarkId::new("direction", direction),
            &scroller,
            |b, scroller| b.iter(|| scroller.build(black_box(SAMPLE_TEXT), &table)),
        );
    }

    group.finish();
}

/// Benchmarks horizontal build time scaling with text length.
fn bench_scroll_scaling(c: &mut Criterion) {
    let table = GlyphTable::bundled();
    let scroller = TextScroller::new(ScrollConfig::default(), DisplayGeometry::default());
    let mut group = c.benchmark_group("scroll_scaling");

    for len in [1usize, 8, 32, 128] {
        let text: String = SAMPLE_TEXT.chars().cycle().take(len).collect();
        group.bench_with_input(BenchmarkId::new("chars", len), &text, |b, text| {
            b.iter(|| scroller.build(black_box(text), &table))
        });
    }

    group.finish();
}

// ── Benchmarks: SpanCompositor ────────────────────────────────────────────────

/// Benchmarks span composition scaling with the number of displays.
fn bench_span_compose(c: &mut Criterion) {
    let table = GlyphTable::bundled();
    let compositor = SpanCompositor::new(ScrollConfig::default(), DisplayGeometry::default())
        .expect("horizontal config is always accepted");
    let mut group = c.benchmark_group("span_compose");

    for count in [1usize, 2, 4] {
        group.bench_with_input(BenchmarkId::new("devices", count), &count, |b, &count| {
            b.iter(|| compositor.compose_segments(black_box(SAMPLE_TEXT), count, &table))
        });
    }

    group.finish();
}

// ── Benchmarks: wire packing ──────────────────────────────────────────────────

/// Benchmarks packing one full frame into the 39-byte draw payload.
fn bench_pack_grid(c: &mut Criterion) {
    let grid = Grid::from_fn(9, 34, |x, y| u8::from((x + y) % 2 == 0));
    c.bench_function("pack_grid_checkerboard", |b| {
        b.iter(|| pack_grid(black_box(&grid)))
    });
}

criterion_group!(
    benches,
    bench_scroll_build,
    bench_scroll_scaling,
    bench_span_compose,
    bench_pack_grid
);
criterion_main!(benches);
