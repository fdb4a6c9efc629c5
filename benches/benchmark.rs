use aquatone::{cluster_pages, get_page_structure, get_similarity, ClusteringPredicate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

const SAMPLE_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Dashboard</title><link rel="stylesheet" href="a.css"></head>
<body><nav><ul><li><a href="/">Home</a></li><li><a href="/x">X</a></li></ul></nav>
<main><h1>Dashboard</h1><table><tr><th>a</th><th>b</th></tr>
<tr><td>1</td><td>2</td></tr></table><form><input name="q"><button>Go</button></form></main>
<footer><p>fin</p></footer></body></html>"#;

fn benchmark_page_structure(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_structure");
    configure_fast_group(&mut group);

    group.bench_function("extraction", |b| {
        b.iter(|| {
            let structure = get_page_structure(black_box(SAMPLE_PAGE));
            black_box(structure);
        });
    });

    group.finish();
}

fn benchmark_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");
    configure_fast_group(&mut group);

    let a = get_page_structure(SAMPLE_PAGE);
    let b_structure = get_page_structure("<html><body><h1>x</h1><p>y</p></body></html>");

    group.bench_function("jaccard", |bench| {
        bench.iter(|| {
            let score = get_similarity(black_box(&a), black_box(&b_structure));
            black_box(score);
        });
    });

    group.finish();
}

fn benchmark_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("clustering");
    configure_fast_group(&mut group);

    let pages: Vec<(String, Vec<String>)> = (0..50)
        .map(|i| {
            let structure = if i % 3 == 0 {
                get_page_structure(SAMPLE_PAGE)
            } else {
                get_page_structure("<html><body><h1>x</h1><p>y</p></body></html>")
            };
            (format!("https://host{i}.test/"), structure)
        })
        .collect();

    group.bench_function("first_fit_50_pages", |b| {
        b.iter(|| {
            let clusters = cluster_pages(black_box(&pages), ClusteringPredicate::Literal);
            black_box(clusters);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_page_structure,
    benchmark_similarity,
    benchmark_clustering
);
criterion_main!(benches);
