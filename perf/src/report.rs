//! Names and groupings for the conductor's internal perf-recorder stages,
//! shared between `bench_conductor` (which records them) and `perf_report`
//! (which prints them).

use aeron_perf_recorder::{NUM_STAGES, PerfRecorder, PerfStage};

pub const STAGE_NAMES: [&str; NUM_STAGES] = [
    "DoWork",
    "BroadcastPoll",
    "DispatchEvent",
    "ExpirySweep",
    "Keepalive",
    "RingWrite",
    "RingRead",
];

pub const ALL_STAGES: [PerfStage; NUM_STAGES] = [
    PerfStage::DoWork,
    PerfStage::BroadcastPoll,
    PerfStage::DispatchEvent,
    PerfStage::ExpirySweep,
    PerfStage::Keepalive,
    PerfStage::RingWrite,
    PerfStage::RingRead,
];

pub fn stage_name(stage: PerfStage) -> &'static str {
    STAGE_NAMES[stage as usize]
}

/// Prints one row per recorded stage: sample count and the basic stats over
/// its recorded durations. Stages with no samples (e.g. the `record`
/// feature was off) are skipped.
pub fn print_stage_table(recorder: &PerfRecorder) {
    crate::print_table_header();
    for &stage in ALL_STAGES.iter() {
        let mut samples = recorder.samples(stage).to_vec();
        if samples.is_empty() {
            continue;
        }
        let stats = crate::compute_stats(&mut samples);
        let result = crate::BenchResult {
            name: stage_name(stage).to_string(),
            unit: "ns".to_string(),
            stats,
        };
        crate::print_result_row(&result);
    }
}
