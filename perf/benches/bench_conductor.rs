use aeron_buffers::trailer::{broadcast_bytes_for_capacity, mpsc_bytes_for_capacity};
use aeron_client::{ClientConductor, CncLengths, Context, ManualEpochClock, ManualNanoClock};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;

fn test_lengths() -> CncLengths {
    CncLengths {
        to_driver: mpsc_bytes_for_capacity(1 << 16),
        to_clients: broadcast_bytes_for_capacity(1 << 16),
        counter_metadata: 128 * 8,
        counter_values: 8 * 8,
        error_log: 4096,
    }
}

fn make_conductor() -> ClientConductor {
    let epoch = Arc::new(ManualEpochClock::new(1_000));
    let nano = Arc::new(ManualNanoClock::new(0));
    let context = Context::new().with_clocks(epoch, nano).with_driver_timeout_ms(10_000);
    ClientConductor::new_for_test(context, test_lengths()).expect("in-memory CnC fixture is well-formed")
}

fn bench_do_work_idle(c: &mut Criterion) {
    let conductor = make_conductor();
    // Prime the keepalive clock so the benchmarked passes don't each emit one.
    conductor.do_work().unwrap();

    c.bench_function("do_work_idle_pass", |b| {
        b.iter(|| black_box(conductor.do_work()));
    });
}

fn bench_async_add_publication(c: &mut Criterion) {
    let conductor = make_conductor();
    let mut stream_id = 0i32;

    c.bench_function("async_add_publication", |b| {
        b.iter(|| {
            stream_id = stream_id.wrapping_add(1);
            black_box(conductor.async_add_publication("aeron:ipc", stream_id))
        });
    });
}

fn bench_poll_pending(c: &mut Criterion) {
    let conductor = make_conductor();
    let handle = conductor.async_add_publication("aeron:ipc", 1).unwrap();

    c.bench_function("poll_publication_pending", |b| {
        b.iter(|| black_box(conductor.poll_publication(handle)));
    });
}

criterion_group!(
    benches,
    bench_do_work_idle,
    bench_async_add_publication,
    bench_poll_pending,
);
criterion_main!(benches);
