//! Micro benchmarks for the derivative request priority queue.
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use photocat::model::AssetId;
use photocat::priority::{Entry, Priority, PriorityQueue};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const ENQUEUE_COUNT: u64 = 16_384;
const PRIORITIES: [Priority; 4] = [
    Priority::Background,
    Priority::Preload,
    Priority::NearVisible,
    Priority::Visible,
];

fn ids(n: u64) -> Vec<AssetId> {
    (0..n).map(|i| AssetId(format!("bench-{i}"))).collect()
}

fn priority_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("priority_queue");

    group.throughput(Throughput::Elements(ENQUEUE_COUNT));
    group.bench_function("enqueue_mixed_priority", |b| {
        let ids = ids(ENQUEUE_COUNT);
        let mut rng = ChaCha8Rng::seed_from_u64(0xC0FF_EE00);
        b.iter_batched(
            PriorityQueue::<()>::new,
            |mut queue| {
                for id in &ids {
                    let priority = PRIORITIES[rng.gen_range(0..PRIORITIES.len())];
                    queue.enqueue(Entry { id: id.clone(), priority, payload: () });
                }
                black_box(queue.len());
            },
            BatchSize::SmallInput,
        );
    });

    group.throughput(Throughput::Elements(ENQUEUE_COUNT));
    group.bench_function("dequeue_until_empty", |b| {
        let ids = ids(ENQUEUE_COUNT);
        let mut rng = ChaCha8Rng::seed_from_u64(0xC0FF_EE01);
        b.iter_batched(
            || {
                let mut queue = PriorityQueue::<()>::new();
                for id in &ids {
                    let priority = PRIORITIES[rng.gen_range(0..PRIORITIES.len())];
                    queue.enqueue(Entry { id: id.clone(), priority, payload: () });
                }
                queue
            },
            |mut queue| {
                while let Some(entry) = queue.dequeue() {
                    black_box(entry.id);
                }
            },
            BatchSize::SmallInput,
        );
    });

    let mut shuffled = ids(ENQUEUE_COUNT);
    shuffled.shuffle(&mut ChaCha8Rng::seed_from_u64(0xC0FF_EE02));
    group.throughput(Throughput::Elements(ENQUEUE_COUNT));
    group.bench_function(BenchmarkId::new("update_priority", ENQUEUE_COUNT), |b| {
        b.iter_batched(
            || {
                let mut queue = PriorityQueue::<()>::new();
                for id in &shuffled {
                    queue.enqueue(Entry {
                        id: id.clone(),
                        priority: Priority::Background,
                        payload: (),
                    });
                }
                queue
            },
            |mut queue| {
                for id in &shuffled {
                    queue.update_priority(id, Priority::Visible);
                }
                black_box(queue.len());
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, priority_queue);
criterion_main!(benches);
