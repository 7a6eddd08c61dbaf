use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use redlilium_core::guid::Guid;
use redlilium_core::math::{Transform, quat_from_rotation_y, quat_to_array};
use redlilium_core::pool::{Poolable, SyncPool};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

fn bench_guid_new(c: &mut Criterion) {
    c.bench_function("guid_new", |b| {
        b.iter(|| black_box(Guid::new()));
    });
}

fn bench_guid_text_round_trip(c: &mut Criterion) {
    let id = Guid::new();
    c.bench_function("guid_text_round_trip", |b| {
        b.iter(|| {
            let text = black_box(id).to_string();
            black_box(Guid::parse_hex(&text))
        });
    });
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

fn bench_transform_compose_chain(c: &mut Criterion) {
    let step = Transform::IDENTITY
        .with_translation([1.0, 0.0, 0.0])
        .with_orientation(quat_to_array(quat_from_rotation_y(0.1)));
    c.bench_function("transform_compose_chain_64", |b| {
        b.iter(|| {
            let mut world = Transform::IDENTITY;
            for _ in 0..64 {
                world = black_box(step).compose(&world);
            }
            world
        });
    });
}

// ---------------------------------------------------------------------------
// Pooling
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Scratch {
    data: Vec<u64>,
}

impl Poolable for Scratch {
    fn new_empty() -> Self {
        Self::default()
    }
    fn reset(&mut self) {
        self.data.clear();
    }
}

fn bench_pool_acquire_release(c: &mut Criterion) {
    let pool = SyncPool::<Scratch>::new();
    c.bench_function("sync_pool_acquire_release", |b| {
        b.iter(|| {
            let mut scratch = pool.acquire();
            scratch.data.extend(0..32);
            black_box(scratch.data.len())
        });
    });
}

criterion_group!(
    benches,
    bench_guid_new,
    bench_guid_text_round_trip,
    bench_transform_compose_chain,
    bench_pool_acquire_release,
);
criterion_main!(benches);
