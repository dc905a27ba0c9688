use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use zvon::{matches, Event};

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("notation_parse");
    for input in ["tick", "temp[72]", "temp[72, 73, threshold: 90, unit: \"F\"]"] {
        group.bench_with_input(BenchmarkId::from_parameter(input), input, |b, input| {
            b.iter(|| Event::parse(black_box(input)).unwrap())
        });
    }
    group.finish();
}

fn bench_hears(c: &mut Criterion) {
    let instance = Event::new("temp")
        .arg(72)
        .arg(73)
        .kwarg("threshold", 90)
        .kwarg("unit", json!("F"));
    let patterns = [
        ("any", Event::any()),
        ("type_only", Event::new("temp")),
        ("prefix", Event::new("temp").arg(72)),
        ("kwargs", Event::new("temp").kwarg("threshold", 90)),
        ("miss", Event::new("humidity")),
    ];

    let mut group = c.benchmark_group("event_hears");
    for (name, pattern) in &patterns {
        group.bench_function(*name, |b| {
            b.iter(|| matches(black_box(pattern), black_box(&instance)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_hears);
criterion_main!(benches);
