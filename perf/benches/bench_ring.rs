use aeron_buffers::{AtomicBuffer, ManyToOneRingBuffer, trailer::mpsc_bytes_for_capacity};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

fn make_ring(capacity: usize) -> (Vec<u8>, ManyToOneRingBuffer) {
    let mut region = vec![0u8; mpsc_bytes_for_capacity(capacity)];
    // `region` is returned alongside the ring so it outlives the
    // `AtomicBuffer`'s raw pointer for as long as the caller holds both.
    let buffer = unsafe { AtomicBuffer::from_raw(region.as_mut_ptr(), region.len()) };
    let ring = ManyToOneRingBuffer::wrap(buffer, capacity).expect("capacity is a valid power of two");
    (region, ring)
}

fn bench_write_small(c: &mut Criterion) {
    let (_region, ring) = make_ring(1 << 16);
    let payload = [0u8; 32];

    let mut group = c.benchmark_group("mpsc_ring");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("write_32b", |b| {
        b.iter(|| {
            let _ = black_box(ring.write(1, &payload));
        });
    });
    group.finish();
}

fn bench_write_read_round_trip(c: &mut Criterion) {
    let (_region, ring) = make_ring(1 << 16);
    let payload = [0u8; 32];

    let mut group = c.benchmark_group("mpsc_ring");
    group.throughput(Throughput::Elements(1));
    group.bench_function("write_then_drain_one", |b| {
        b.iter(|| {
            ring.write(1, &payload).unwrap();
            let drained = ring.read(1, |_type_id, _body| {});
            black_box(drained);
        });
    });
    group.finish();
}

fn bench_next_correlation_id(c: &mut Criterion) {
    let (_region, ring) = make_ring(1 << 12);
    c.bench_function("next_correlation_id", |b| {
        b.iter(|| black_box(ring.next_correlation_id()));
    });
}

fn bench_write_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpsc_ring_sizes");
    for &size in &[16usize, 64, 256, 1024] {
        let (_region, ring) = make_ring(1 << 18);
        let payload = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("write_{size}b"), |b| {
            b.iter(|| {
                if ring.write(1, &payload).is_err() {
                    // Capacity exhausted by the benchmark loop itself;
                    // drain once and keep going.
                    ring.read(usize::MAX, |_type_id, _body| {});
                    ring.write(1, &payload).unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_write_small,
    bench_write_read_round_trip,
    bench_next_correlation_id,
    bench_write_sizes,
);
criterion_main!(benches);
