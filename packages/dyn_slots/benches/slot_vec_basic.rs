//! Basic benchmarks for the `dyn_slots` containers.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::fmt::Debug;
use std::hint::black_box;
use std::iter;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use dyn_slots::{SlotArray, SlotVec, element};
use new_zealand::nz;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

#[derive(Clone, Copy, Debug)]
#[expect(dead_code, reason = "field only gives the element its size")]
struct Plain(u64);

#[derive(Clone, Debug)]
#[expect(dead_code, reason = "fields only give the element its size")]
struct Cloned {
    id: u32,
    weight: f64,
}

element!(Plain => dyn Debug, copy);
element!(Cloned => dyn Debug, clone);

const FILL: usize = 64;

fn vector() -> SlotVec<dyn Debug> {
    SlotVec::builder()
        .capacity(nz!(128))
        .fits::<Plain>()
        .fits::<Cloned>()
        .build()
}

fn filled_vector() -> SlotVec<dyn Debug> {
    let mut vec = vector();

    for id in 0..FILL {
        if id % 2 == 0 {
            vec.push(Plain(id as u64)).unwrap();
        } else {
            vec.push(Cloned {
                id: id as u32,
                weight: 1.0,
            })
            .unwrap();
        }
    }

    vec
}

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("slot_vec_basic");

    let allocs_op = allocs.operation("build_empty");
    group.bench_function("build_empty", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(vector()));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("push_one");
    group.bench_function("push_one", |b| {
        b.iter_custom(|iters| {
            let mut vecs = iter::repeat_with(vector)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for vec in &mut vecs {
                _ = black_box(vec.push(black_box(Plain(42))));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("insert_front");
    group.bench_function("insert_front", |b| {
        b.iter_custom(|iters| {
            let mut vecs = iter::repeat_with(filled_vector)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for vec in &mut vecs {
                _ = black_box(vec.insert(0, black_box(Plain(42))));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("remove_front");
    group.bench_function("remove_front", |b| {
        b.iter_custom(|iters| {
            let mut vecs = iter::repeat_with(filled_vector)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for vec in &mut vecs {
                _ = black_box(vec.remove(black_box(0)));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("iterate_after_mutation");
    group.bench_function("iterate_after_mutation", |b| {
        b.iter_custom(|iters| {
            let mut vec = filled_vector();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                // Each mutation invalidates the pointer cache, so every pass rebuilds it.
                vec.pop().unwrap();
                vec.push(Plain(1)).unwrap();

                black_box(vec.iter().flatten().count());
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("clone_filled");
    group.bench_function("clone_filled", |b| {
        b.iter_custom(|iters| {
            let vec = filled_vector();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(vec.try_clone().unwrap()));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("array_emplace_overwrite");
    group.bench_function("array_emplace_overwrite", |b| {
        b.iter_custom(|iters| {
            let mut array = SlotArray::<dyn Debug>::builder()
                .capacity(nz!(16))
                .fits::<Plain>()
                .fits::<Cloned>()
                .build();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for index in 0..iters {
                let slot = usize::try_from(index % 16).unwrap();
                _ = black_box(array.emplace(slot, black_box(Plain(index))));
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
