use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rpc_pool_core::{EndpointId, SelectorWeights};
use rpc_pool_selector::{EndpointSnapshot, Selector};

fn snapshot(id: usize, in_flight: usize) -> EndpointSnapshot {
    EndpointSnapshot {
        endpoint: EndpointId(id),
        admissible: true,
        priority: (id % 3) as i32,
        weight: 1.0 + (id % 5) as f64 * 0.2,
        p50_latency_ms: 10 + (id as u64 * 7) % 200,
        in_flight,
        max_concurrent: 64,
        recent_failure_rate: (id % 10) as f64 / 100.0,
    }
}

fn bench_select(c: &mut Criterion) {
    let weights = SelectorWeights::default();
    let selector = Selector::new();

    let mut group = c.benchmark_group("selector_select");
    for &fleet_size in &[4usize, 16, 64, 256] {
        let candidates: Vec<EndpointSnapshot> = (0..fleet_size)
            .map(|i| snapshot(i, i % 8))
            .collect();
        group.bench_function(format!("fleet_{fleet_size}"), |b| {
            b.iter(|| black_box(selector.select(black_box(&candidates), black_box(&weights))))
        });
    }
    group.finish();
}

fn bench_rank(c: &mut Criterion) {
    let weights = SelectorWeights::default();
    let selector = Selector::new();

    let mut group = c.benchmark_group("selector_rank");
    for &fleet_size in &[4usize, 16, 64, 256] {
        let candidates: Vec<EndpointSnapshot> = (0..fleet_size)
            .map(|i| snapshot(i, i % 8))
            .collect();
        group.bench_function(format!("fleet_{fleet_size}"), |b| {
            b.iter(|| black_box(selector.rank(black_box(&candidates), black_box(&weights))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_select, bench_rank);
criterion_main!(benches);
