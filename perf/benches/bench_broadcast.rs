use aeron_buffers::{AtomicBuffer, BroadcastReceiver, BroadcastTransmitter, trailer::broadcast_bytes_for_capacity};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

fn make_broadcast(capacity: usize) -> (Vec<u8>, BroadcastTransmitter, BroadcastReceiver) {
    let mut region = vec![0u8; broadcast_bytes_for_capacity(capacity)];
    let buffer = unsafe { AtomicBuffer::from_raw(region.as_mut_ptr(), region.len()) };
    let tx = BroadcastTransmitter::wrap(buffer, capacity).unwrap();
    let rx = BroadcastReceiver::wrap(buffer, capacity).unwrap();
    (region, tx, rx)
}

fn bench_transmit(c: &mut Criterion) {
    let (_region, tx, _rx) = make_broadcast(1 << 16);
    let payload = [0u8; 32];

    let mut group = c.benchmark_group("broadcast");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("transmit_32b", |b| {
        b.iter(|| {
            let _ = black_box(tx.transmit(1, &payload));
        });
    });
    group.finish();
}

fn bench_poll_empty(c: &mut Criterion) {
    let (_region, _tx, mut rx) = make_broadcast(1 << 16);
    c.bench_function("poll_empty", |b| {
        b.iter(|| {
            let delivered = rx.poll(10, |_ev| {});
            black_box(delivered);
        });
    });
}

fn bench_round_trip(c: &mut Criterion) {
    let (_region, tx, mut rx) = make_broadcast(1 << 16);
    let payload = [0u8; 32];

    let mut group = c.benchmark_group("broadcast");
    group.throughput(Throughput::Elements(1));
    group.bench_function("transmit_then_poll_one", |b| {
        b.iter(|| {
            tx.transmit(1, &payload).unwrap();
            let delivered = rx.poll(1, |ev| {
                black_box(ev.type_id);
            });
            black_box(delivered);
        });
    });
    group.finish();
}

fn bench_capacities(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_capacity");
    group.throughput(Throughput::Elements(1));

    for &cap in &[1024usize, 4096, 16384, 65536] {
        let (_region, tx, mut rx) = make_broadcast(cap);
        let payload = [0u8; 16];

        group.bench_function(format!("round_trip_cap_{cap}"), |b| {
            b.iter(|| {
                tx.transmit(1, &payload).unwrap();
                black_box(rx.poll(1, |_ev| {}));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_transmit,
    bench_poll_empty,
    bench_round_trip,
    bench_capacities,
);
criterion_main!(benches);
