use std::{
    hint::black_box,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use zvon::{FireOptions, Router, RouterPolicy};

fn router_with_handlers(handlers: usize) -> (Router, Arc<AtomicUsize>) {
    let router = Router::default();
    let counter = Arc::new(AtomicUsize::new(0));
    let channel = router.lookup("bench");
    for _ in 0..handlers {
        let c = counter.clone();
        channel
            .register("tick", move |_, _| {
                c.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .unwrap();
    }
    (router, counter)
}

fn bench_fire_inline(c: &mut Criterion) {
    let mut group = c.benchmark_group("fire_blocking_serial");
    for handlers in [0, 1, 10, 100] {
        let (router, counter) = router_with_handlers(handlers);
        let channel = router.lookup("bench");
        group.bench_with_input(BenchmarkId::from_parameter(handlers), &handlers, |b, _| {
            b.iter(|| channel.fire_blocking(black_box("tick")).unwrap())
        });
        black_box(counter.load(Ordering::Relaxed));
    }
    group.finish();
}

fn bench_fire_parallel(c: &mut Criterion) {
    let (router, _counter) = router_with_handlers(10);
    let channel = router.lookup("bench");
    c.bench_function("fire_blocking_parallel_10", |b| {
        b.iter(|| {
            channel
                .fire_with("tick", FireOptions::new().blocking(true).parallel(true))
                .unwrap()
        })
    });
}

fn bench_receivers(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_receivers");
    for policy in [RouterPolicy::Default, RouterPolicy::Simple] {
        let router = Router::default();
        router.set_policy(policy);
        for i in 0..100 {
            router.lookup(format!("room-{i}"));
        }
        router.lookup("*");
        let channel = router.lookup("room-42");
        group.bench_function(format!("{policy:?}"), |b| {
            b.iter(|| black_box(router.get_receivers(&channel)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fire_inline, bench_fire_parallel, bench_receivers);
criterion_main!(benches);
