use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use conduit_graph::{BlockCount, BlockPos, Component, DefaultRules, NetworkManager};

fn p(x: i32, y: i32, z: i32) -> BlockPos {
    BlockPos::new(x, y, z)
}

/// Grow a straight pipe one block at a time: every placement extends an edge
/// through the collapse path.
fn bench_line_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_growth");
    for len in [64, 256, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter(|| {
                let mut m: NetworkManager<BlockCount> =
                    NetworkManager::new(Arc::new(DefaultRules));
                for x in 0..len {
                    m.on_block_placed(p(x, 0, 0), BlockCount::from_length(1))
                        .expect("place");
                }
                black_box(m.network_count())
            });
        });
    }
    group.finish();
}

/// Repeatedly attach and detach a branch in the middle of a long pipe:
/// exercises split, direct-link, and degree-two collapse on every cycle.
fn bench_junction_churn(c: &mut Criterion) {
    c.bench_function("junction_churn", |b| {
        let mut m: NetworkManager<BlockCount> = NetworkManager::new(Arc::new(DefaultRules));
        for x in 0..256 {
            m.on_block_placed(p(x, 0, 0), BlockCount::from_length(1)).expect("place");
        }
        b.iter(|| {
            m.on_block_placed(p(128, 1, 0), BlockCount::from_length(1)).expect("attach");
            m.on_block_removed(p(128, 1, 0)).expect("detach");
        });
    });
}

/// Full recompute of a comb-shaped world (a spine with many teeth), the
/// worst case the registry runs on load.
fn bench_recalculate(c: &mut Criterion) {
    c.bench_function("recalculate_comb", |b| {
        let mut m: NetworkManager<BlockCount> = NetworkManager::new(Arc::new(DefaultRules));
        for x in 0..128 {
            m.on_block_placed(p(x, 0, 0), BlockCount::from_length(1)).expect("place");
        }
        for x in (0..128).step_by(4) {
            for y in 1..4 {
                m.on_block_placed(p(x, y, 0), BlockCount::from_length(1)).expect("place");
            }
        }
        b.iter(|| {
            m.recalculate_networks(|_| BlockCount::from_length(1)).expect("recalculate");
            black_box(m.position_count())
        });
    });
}

criterion_group!(benches, bench_line_growth, bench_junction_churn, bench_recalculate);
criterion_main!(benches);
