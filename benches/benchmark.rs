//! Performance benchmarks for ocx-nimas.
//!
//! Run with: `cargo bench`
//!
//! Benchmarks include:
//! - Sanitizing a synthetic OCX document
//! - Heading/list normalization
//! - JSON-LD extraction plus XML building for documents with many sections

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ocx_nimas::bundle::{IntermediateDocument, StyleTransform, Templates};
use ocx_nimas::{dom, extract_graph, normalize, sanitizer};

/// Build an OCX document with `sections` activities.
fn sample_ocx(sections: usize) -> String {
    let nodes: Vec<String> = (0..sections)
        .map(|i| format!(r##"{{"@id":"#sec{i}","@type":"oer:Activity"}}"##))
        .collect();
    let body: String = (0..sections)
        .map(|i| {
            format!(
                r#"<section id="sec{i}" style="margin:0">
    <h2>Activity {i}</h2>
    <p>Read the passage and <strong>answer</strong> the questions below.</p>
    <ol><li>First question</li><li>Second <em>question</em></li></ol>
    <h3>Notes</h3>
    <ul><li>Keep it short</li></ul>
    <script>track({i})</script>
</section>"#
            )
        })
        .collect();
    format!(
        r#"<!DOCTYPE html><html><head><meta charset="utf-8">
<script type="application/ld+json">{{"name":"Benchmark","identifier":"bench","@graph":[{}]}}</script>
</head><body>{body}</body></html>"#,
        nodes.join(",")
    )
}

fn bench_sanitize(c: &mut Criterion) {
    let html = sample_ocx(10);
    c.bench_function("sanitize_10_sections", |b| {
        b.iter(|| sanitizer::sanitize(black_box(&html)));
    });
}

fn bench_normalize(c: &mut Criterion) {
    let clean = sanitizer::sanitize(&sample_ocx(10));
    c.bench_function("normalize_10_sections", |b| {
        b.iter(|| {
            let doc = dom::parse(black_box(&clean));
            normalize::renormalize_headings(&doc);
            normalize::retag_lists(&doc)
        });
    });
}

/// Metadata, sanitizing, normalization and the style transform, without I/O.
fn bench_xml_pipeline(c: &mut Criterion) {
    let stylesheet = Templates::default().stylesheet();
    let Ok(stylesheet) = stylesheet else {
        return;
    };

    let mut group = c.benchmark_group("xml_pipeline");
    for sections in [1usize, 10, 100] {
        let html = sample_ocx(sections);
        group.throughput(Throughput::Bytes(html.len() as u64));
        group.bench_with_input(BenchmarkId::new("sections", sections), &html, |b, html| {
            b.iter(|| {
                let graph = extract_graph(black_box(html)).ok()?;
                let doc = dom::parse(&sanitizer::sanitize(html));
                normalize::normalize(&doc);
                let intermediate = IntermediateDocument::build(&graph, &doc).ok()?;
                stylesheet.transform(&intermediate.to_element()).ok()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sanitize, bench_normalize, bench_xml_pipeline);
criterion_main!(benches);
