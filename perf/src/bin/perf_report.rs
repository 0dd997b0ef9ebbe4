use std::hint::black_box;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use aeron_buffers::trailer::{broadcast_bytes_for_capacity, mpsc_bytes_for_capacity};
use aeron_buffers::{AtomicBuffer, BroadcastReceiver, BroadcastTransmitter, ManyToOneRingBuffer};
use aeron_client::{ClientConductor, CncLengths, Context, ManualEpochClock, ManualNanoClock};
use aeron_perf_recorder::now_ns as perf_now_ns;
use aeron_perf::*;

fn main() {
    let rusage_start = capture_rusage();
    let cache = get_cache_info();

    let mut results: Vec<BenchResult> = Vec::new();

    print_banner(&cache);
    section_clock(&mut results);
    section_ring(&mut results);
    section_broadcast(&mut results);
    section_conductor(&mut results);

    let criterion_dir = criterion_target_dir();
    let estimates = read_criterion_estimates(
        &criterion_dir,
        &["mpsc_ring", "mpsc_ring_sizes", "broadcast", "broadcast_capacity", "conductor"],
    );
    section_criterion(&estimates);

    let rusage_end = capture_rusage();
    section_resources(&rusage_start, &rusage_end);

    save_results(&results, &cache, &estimates, &rusage_start, &rusage_end);
}

fn criterion_target_dir() -> PathBuf {
    let manifest = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest).parent().unwrap().join("target").join("criterion")
}

fn print_banner(cache: &CacheInfo) {
    let bar = "\u{2550}".repeat(90);
    println!("\n{bar}");
    println!("  AERON CLIENT PERFORMANCE REPORT");
    println!("  direct measurement + criterion micro-benchmarks");
    println!("{bar}\n");

    println!("  CPU:     {}  ({} cores)", cache.cpu_brand, cache.ncpu);
    println!("  RAM:     {}", format_bytes(cache.ram_bytes));
    println!("  Cache Line: {} B", cache.line_size);
}

fn section_clock(results: &mut Vec<BenchResult>) {
    section_header("CLOCK CALIBRATION");
    print_table_header();

    let r_perf = measure_batched("perf now_ns()", 1000, 10_000, 100, || {
        black_box(perf_now_ns());
    });
    print_result_row(&r_perf);
    results.push(r_perf.clone());

    let r_instant = measure_batched("Instant::now()", 1000, 10_000, 100, || {
        black_box(Instant::now());
    });
    print_result_row(&r_instant);
    results.push(r_instant);
}

// ─── Ring buffer ────────────────────────────────────────────────────────────

fn section_ring(results: &mut Vec<BenchResult>) {
    section_header("MPSC RING BUFFER (to-driver command channel)");
    print_table_header();

    let capacity = 1 << 16;
    let mut region = vec![0u8; mpsc_bytes_for_capacity(capacity)];
    let buffer = unsafe { AtomicBuffer::from_raw(region.as_mut_ptr(), region.len()) };
    let ring = ManyToOneRingBuffer::wrap(buffer, capacity).unwrap();
    let payload = [0u8; 32];

    let r_write = measure_batched("ring.write(32B)", 200, 2_000, 50, || {
        if black_box(ring.write(1, &payload)).is_err() {
            ring.read(usize::MAX, |_t, _b| {});
            ring.write(1, &payload).unwrap();
        }
    });
    print_result_row(&r_write);
    results.push(r_write);

    let r_rt = measure_batched("write+drain(1)", 200, 2_000, 50, || {
        ring.write(1, &payload).unwrap();
        black_box(ring.read(1, |_t, _b| {}));
    });
    print_result_row(&r_rt);
    results.push(r_rt);
}

// ─── Broadcast buffer ───────────────────────────────────────────────────────

fn section_broadcast(results: &mut Vec<BenchResult>) {
    section_header("BROADCAST BUFFER (to-clients event channel)");
    print_table_header();

    let capacity = 1 << 16;
    let mut region = vec![0u8; broadcast_bytes_for_capacity(capacity)];
    let buffer = unsafe { AtomicBuffer::from_raw(region.as_mut_ptr(), region.len()) };
    let tx = BroadcastTransmitter::wrap(buffer, capacity).unwrap();
    let mut rx = BroadcastReceiver::wrap(buffer, capacity).unwrap();
    let payload = [0u8; 32];

    let r_tx = measure_batched("transmit(32B)", 200, 2_000, 50, || {
        let _ = black_box(tx.transmit(1, &payload));
    });
    print_result_row(&r_tx);
    results.push(r_tx);

    let r_rt = measure_batched("transmit+poll(1)", 200, 2_000, 50, || {
        tx.transmit(1, &payload).unwrap();
        black_box(rx.poll(1, |_ev| {}));
    });
    print_result_row(&r_rt);
    results.push(r_rt);
}

// ─── Conductor ──────────────────────────────────────────────────────────────

fn section_conductor(results: &mut Vec<BenchResult>) {
    section_header("CLIENT CONDUCTOR");
    print_table_header();

    fn test_lengths() -> CncLengths {
        CncLengths {
            to_driver: mpsc_bytes_for_capacity(1 << 16),
            to_clients: broadcast_bytes_for_capacity(1 << 16),
            counter_metadata: 128 * 8,
            counter_values: 8 * 8,
            error_log: 4096,
        }
    }

    let epoch = Arc::new(ManualEpochClock::new(1_000));
    let nano = Arc::new(ManualNanoClock::new(0));
    let context = Context::new().with_clocks(epoch, nano).with_driver_timeout_ms(10_000);
    let conductor = ClientConductor::new_for_test(context, test_lengths()).unwrap();
    conductor.do_work().unwrap();

    let r_idle = measure_batched("do_work(idle)", 200, 2_000, 50, || {
        let _ = black_box(conductor.do_work());
    });
    print_result_row(&r_idle);
    results.push(r_idle);

    let mut stream_id = 0i32;
    let r_add = measure_batched("async_add_publication", 200, 2_000, 50, || {
        stream_id = stream_id.wrapping_add(1);
        let _ = black_box(conductor.async_add_publication("aeron:ipc", stream_id));
    });
    print_result_row(&r_add);
    results.push(r_add);

    conductor.on_close();
}

// ─── Criterion ──────────────────────────────────────────────────────────────

fn section_criterion(estimates: &std::collections::BTreeMap<String, CriterionEstimate>) {
    section_header("CRITERION MICRO-BENCHMARKS");
    if estimates.is_empty() {
        println!("  No criterion data found. Run: cargo bench -p aeron-perf");
        return;
    }
    for (name, est) in estimates {
        println!(
            "  {:<40} median={:>10} mean={:>10} stddev={:>10}",
            name,
            format_ns(est.median_ns),
            format_ns(est.mean_ns),
            format_ns(est.stddev_ns),
        );
    }
}

// ─── Resource usage ─────────────────────────────────────────────────────────

fn section_resources(start: &ResourceSnapshot, end: &ResourceSnapshot) {
    section_header("RESOURCE USAGE");
    println!("  Max RSS:            {}", format_bytes(end.max_rss_bytes.max(0) as u64));
    println!("  Minor faults:       {}", end.minor_faults - start.minor_faults);
    println!("  Major faults:       {}", end.major_faults - start.major_faults);
    println!(
        "  Voluntary ctxsw:    {}",
        end.vol_ctx_switches - start.vol_ctx_switches
    );
    println!(
        "  Involuntary ctxsw:  {}",
        end.invol_ctx_switches - start.invol_ctx_switches
    );
    println!(
        "  CPU time (user/sys): {} us / {} us",
        end.user_time_us - start.user_time_us,
        end.sys_time_us - start.sys_time_us,
    );
}

// ─── JSON output ────────────────────────────────────────────────────────────

fn save_results(
    results: &[BenchResult],
    cache: &CacheInfo,
    estimates: &std::collections::BTreeMap<String, CriterionEstimate>,
    rusage_start: &ResourceSnapshot,
    rusage_end: &ResourceSnapshot,
) {
    let payload = serde_json::json!({
        "cache": cache,
        "results": results,
        "criterion": estimates,
        "rusage_start": rusage_start,
        "rusage_end": rusage_end,
    });
    let path = std::env::temp_dir().join("aeron_perf_report.json");
    if let Ok(text) = serde_json::to_string_pretty(&payload)
        && std::fs::write(&path, text).is_ok()
    {
        println!("\n  Report written to {}", path.display());
    }
}
