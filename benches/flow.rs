//! Benchmarks for SPF and the max-flow engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use netgraph::graph::flow::{calc_max_flow, MaxFlowOptions};
use netgraph::graph::spf::spf;
use netgraph::graph::StrictMultiDigraph;
use netgraph::EdgeSelect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_fabric(nodes: usize, edges: usize, seed: u64) -> StrictMultiDigraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut graph = StrictMultiDigraph::new();

    let ids: Vec<_> = (0..nodes).map(|i| graph.add_node(format!("n{i}"))).collect();

    for _ in 0..edges {
        let from = rng.gen_range(0..nodes);
        let to = rng.gen_range(0..nodes);
        if from != to {
            let capacity = rng.gen_range(1.0..100.0);
            let cost = rng.gen_range(1..10) as f64;
            graph.add_edge(ids[from], ids[to], capacity, cost, None);
        }
    }

    graph
}

fn bench_spf(c: &mut Criterion) {
    let mut group = c.benchmark_group("spf");

    for (nodes, edges) in [(100, 500), (500, 2500), (1000, 5000)] {
        let graph = random_fabric(nodes, edges, 42);
        let source = graph.node_id("n0").unwrap();

        group.bench_with_input(BenchmarkId::new("nodes", nodes), &graph, |b, g| {
            b.iter(|| spf(black_box(g), source, EdgeSelect::AllMinCost, true))
        });
    }

    group.finish();
}

fn bench_max_flow(c: &mut Criterion) {
    let mut group = c.benchmark_group("max_flow");

    for (nodes, edges) in [(50, 400), (200, 1600)] {
        let graph = random_fabric(nodes, edges, 7);
        let source = graph.node_id("n0").unwrap();
        let sink = graph.node_id(&format!("n{}", nodes - 1)).unwrap();

        group.bench_with_input(BenchmarkId::new("nodes", nodes), &graph, |b, g| {
            b.iter(|| {
                let mut working = g.clone();
                calc_max_flow(
                    black_box(&mut working),
                    source,
                    sink,
                    &MaxFlowOptions::default(),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_spf, bench_max_flow);
criterion_main!(benches);
