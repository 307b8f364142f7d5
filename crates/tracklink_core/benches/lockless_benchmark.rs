//! # Lockless Cell Benchmark
//!
//! Publishing must stay well under a microsecond so a 1 kHz tracking loop
//! never notices it; reads must stay cheap with a writer hammering the cell.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tracklink_core::{LocklessCell, RegionFactory, StateReader, StateWriter};
use tracklink_shared::LocklessSensorState;

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("lockless_publish");

    let mut cell = LocklessCell::new(LocklessSensorState::default());
    group.bench_function("cell_set_state", |b| {
        let mut counter = 0u32;
        b.iter(|| {
            counter = counter.wrapping_add(1);
            let state = LocklessSensorState {
                last_camera_frame_counter: counter,
                ..LocklessSensorState::default()
            };
            cell.set_state_exclusive(black_box(state));
        });
    });

    let factory = RegionFactory::in_process();
    let mut writer = StateWriter::<LocklessSensorState>::open(&factory, "bench_publish")
        .expect("in-process region");
    group.bench_function("region_set_state", |b| {
        b.iter(|| writer.set_state(black_box(LocklessSensorState::default())));
    });

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("lockless_read");

    let cell = LocklessCell::new(LocklessSensorState::default());
    group.bench_function("uncontended", |b| {
        b.iter(|| black_box(cell.get_state()));
    });

    let factory = RegionFactory::in_process();
    let mut writer = StateWriter::<LocklessSensorState>::open(&factory, "bench_read")
        .expect("in-process region");
    let reader = StateReader::<LocklessSensorState>::open(&factory, "bench_read")
        .expect("in-process region");
    let stop = Arc::new(AtomicBool::new(false));
    let background = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut counter = 0u32;
            while !stop.load(Ordering::Relaxed) {
                counter = counter.wrapping_add(1);
                writer.set_state(LocklessSensorState {
                    last_camera_frame_counter: counter,
                    ..LocklessSensorState::default()
                });
            }
        })
    };

    group.bench_function("contended", |b| {
        b.iter(|| black_box(reader.get_state()));
    });

    stop.store(true, Ordering::Relaxed);
    background.join().expect("writer thread");
    group.finish();
}

criterion_group!(benches, bench_publish, bench_read);
criterion_main!(benches);
