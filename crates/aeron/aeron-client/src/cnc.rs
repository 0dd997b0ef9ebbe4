//! The CnC (command-and-control) file descriptor (spec.md §6 "CnC file
//! layout"): five fixed, page-aligned regions jointly mapped by the driver
//! and every client in the process. Creation and sizing is the driver's job
//! (spec.md §1, out of scope); this module only slices an already-mapped
//! region and gates on the version field the way `lithos-icc::shm_layout`'s
//! `RingHeader::validate` gates on magic/version before trusting a mapped
//! ring buffer.

use crate::error::AeronError;
use aeron_buffers::{AtomicBuffer, BroadcastReceiver, BroadcastTransmitter, ManyToOneRingBuffer};
use std::time::{Duration, Instant};

/// Current CnC wire format version. Clients spin-read the version field
/// until it matches this (spec.md §6: "gated by a volatile version field
/// which clients must spin-read until it equals the expected
/// `AERON_CNC_VERSION`").
pub const AERON_CNC_VERSION: i32 = 14;

const CNC_VERSION_OFFSET: usize = 0;
const CNC_TO_DRIVER_LENGTH_OFFSET: usize = 4;
const CNC_TO_CLIENTS_LENGTH_OFFSET: usize = 8;
const CNC_COUNTER_METADATA_LENGTH_OFFSET: usize = 12;
const CNC_COUNTER_VALUES_LENGTH_OFFSET: usize = 16;
const CNC_ERROR_LOG_LENGTH_OFFSET: usize = 20;
const CNC_PID_OFFSET: usize = 24;
const CNC_START_TIMESTAMP_OFFSET: usize = 32;
const CNC_CLIENT_LIVENESS_TIMEOUT_OFFSET: usize = 40;

/// Length of the leading metadata region, rounded to a cache line so the
/// first buffer region starts cleanly aligned.
pub const CNC_META_DATA_LENGTH: usize = 64;

/// Sizes of the five regions that follow the metadata header, in file order
/// (spec.md §6's ASCII layout diagram).
#[derive(Debug, Clone, Copy)]
pub struct CncLengths {
    pub to_driver: usize,
    pub to_clients: usize,
    pub counter_metadata: usize,
    pub counter_values: usize,
    pub error_log: usize,
}

impl CncLengths {
    pub fn total_len(&self) -> usize {
        CNC_META_DATA_LENGTH
            + self.to_driver
            + self.to_clients
            + self.counter_metadata
            + self.counter_values
            + self.error_log
    }
}

/// A mapped-and-sliced view over a CnC file: metadata header plus the five
/// region buffers underneath it.
pub struct CncDescriptor {
    meta: AtomicBuffer,
    pub to_driver_buffer: AtomicBuffer,
    pub to_clients_buffer: AtomicBuffer,
    pub counter_metadata_buffer: AtomicBuffer,
    pub counter_values_buffer: AtomicBuffer,
    pub error_log_buffer: AtomicBuffer,
}

impl CncDescriptor {
    /// Wraps an existing, driver-initialized CnC mapping, spin-waiting for
    /// up to `timeout` for the version field to become readable and match
    /// [`AERON_CNC_VERSION`].
    pub fn wrap_existing(region: &mut [u8], timeout: Duration) -> Result<Self, AeronError> {
        let meta = AtomicBuffer::wrap(region);
        let deadline = Instant::now() + timeout;

        loop {
            let version = meta.get_i32_volatile(CNC_VERSION_OFFSET);
            if version != 0 {
                if version != AERON_CNC_VERSION {
                    return Err(AeronError::CncVersionMismatch {
                        found: version,
                        expected: AERON_CNC_VERSION,
                    });
                }
                break;
            }
            if Instant::now() >= deadline {
                return Err(AeronError::CncNotReady);
            }
            std::hint::spin_loop();
        }

        Ok(Self::slice_regions(meta))
    }

    /// Lays out a brand-new CnC region for test fixtures that stand in for
    /// the driver (spec.md §1 marks real CnC creation out of scope, but a
    /// conductor test needs *some* side to create the file).
    pub fn initialize(region: &mut [u8], lengths: CncLengths) -> Self {
        assert_eq!(region.len(), lengths.total_len());
        let meta = AtomicBuffer::wrap(region);
        meta.put_i32(CNC_TO_DRIVER_LENGTH_OFFSET, lengths.to_driver as i32);
        meta.put_i32(CNC_TO_CLIENTS_LENGTH_OFFSET, lengths.to_clients as i32);
        meta.put_i32(
            CNC_COUNTER_METADATA_LENGTH_OFFSET,
            lengths.counter_metadata as i32,
        );
        meta.put_i32(
            CNC_COUNTER_VALUES_LENGTH_OFFSET,
            lengths.counter_values as i32,
        );
        meta.put_i32(CNC_ERROR_LOG_LENGTH_OFFSET, lengths.error_log as i32);
        meta.put_i64(CNC_PID_OFFSET, std::process::id() as i64);
        meta.put_i64(CNC_CLIENT_LIVENESS_TIMEOUT_OFFSET, 5_000_000_000);

        let descriptor = Self::slice_regions(meta);
        // Version is published last and with release semantics, gating every
        // spin-reading client (mirrors the driver's real publication order).
        meta.put_i32_ordered(CNC_VERSION_OFFSET, AERON_CNC_VERSION);
        descriptor
    }

    fn slice_regions(meta: AtomicBuffer) -> Self {
        let to_driver_len = meta.get_i32(CNC_TO_DRIVER_LENGTH_OFFSET) as usize;
        let to_clients_len = meta.get_i32(CNC_TO_CLIENTS_LENGTH_OFFSET) as usize;
        let counter_metadata_len = meta.get_i32(CNC_COUNTER_METADATA_LENGTH_OFFSET) as usize;
        let counter_values_len = meta.get_i32(CNC_COUNTER_VALUES_LENGTH_OFFSET) as usize;
        let error_log_len = meta.get_i32(CNC_ERROR_LOG_LENGTH_OFFSET) as usize;

        let base = meta.as_ptr();
        let mut offset = CNC_META_DATA_LENGTH;

        // SAFETY: each sub-buffer stays within `region`'s originally wrapped
        // bounds; offsets are computed from lengths this same metadata
        // header stores, consistent with how `meta` itself was constructed.
        let to_driver_buffer = unsafe { AtomicBuffer::from_raw(base.add(offset), to_driver_len) };
        offset += to_driver_len;
        let to_clients_buffer = unsafe { AtomicBuffer::from_raw(base.add(offset), to_clients_len) };
        offset += to_clients_len;
        let counter_metadata_buffer =
            unsafe { AtomicBuffer::from_raw(base.add(offset), counter_metadata_len) };
        offset += counter_metadata_len;
        let counter_values_buffer =
            unsafe { AtomicBuffer::from_raw(base.add(offset), counter_values_len) };
        offset += counter_values_len;
        let error_log_buffer = unsafe { AtomicBuffer::from_raw(base.add(offset), error_log_len) };

        Self {
            meta,
            to_driver_buffer,
            to_clients_buffer,
            counter_metadata_buffer,
            counter_values_buffer,
            error_log_buffer,
        }
    }

    pub fn pid(&self) -> i64 {
        self.meta.get_i64(CNC_PID_OFFSET)
    }

    pub fn start_timestamp_ms(&self) -> i64 {
        self.meta.get_i64(CNC_START_TIMESTAMP_OFFSET)
    }

    pub fn client_liveness_timeout_ns(&self) -> i64 {
        self.meta.get_i64(CNC_CLIENT_LIVENESS_TIMEOUT_OFFSET)
    }

    pub fn to_driver_ring(&self, capacity: usize) -> Result<ManyToOneRingBuffer, AeronError> {
        Ok(ManyToOneRingBuffer::wrap(self.to_driver_buffer, capacity)?)
    }

    pub fn to_clients_transmitter(&self, capacity: usize) -> Result<BroadcastTransmitter, AeronError> {
        Ok(BroadcastTransmitter::wrap(self.to_clients_buffer, capacity)?)
    }

    pub fn to_clients_receiver(&self, capacity: usize) -> Result<BroadcastReceiver, AeronError> {
        Ok(BroadcastReceiver::wrap(self.to_clients_buffer, capacity)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeron_buffers::trailer::{broadcast_bytes_for_capacity, mpsc_bytes_for_capacity};

    fn test_lengths() -> CncLengths {
        CncLengths {
            to_driver: mpsc_bytes_for_capacity(4096),
            to_clients: broadcast_bytes_for_capacity(4096),
            counter_metadata: 128 * 8,
            counter_values: 8 * 8,
            error_log: 1024,
        }
    }

    #[test]
    fn initialize_then_wrap_existing_round_trips() {
        let lengths = test_lengths();
        let mut region = vec![0u8; lengths.total_len()];
        {
            let desc = CncDescriptor::initialize(&mut region, lengths);
            assert_eq!(desc.pid(), std::process::id() as i64);
        }

        let desc = CncDescriptor::wrap_existing(&mut region, Duration::from_millis(100)).unwrap();
        assert_eq!(desc.to_driver_buffer.len(), lengths.to_driver);
        assert_eq!(desc.to_clients_buffer.len(), lengths.to_clients);
    }

    #[test]
    fn wrap_existing_times_out_when_version_never_published() {
        let lengths = test_lengths();
        let mut region = vec![0u8; lengths.total_len()];
        let err = CncDescriptor::wrap_existing(&mut region, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, AeronError::CncNotReady));
    }

    #[test]
    fn wrap_existing_rejects_version_mismatch() {
        let lengths = test_lengths();
        let mut region = vec![0u8; lengths.total_len()];
        {
            let meta = AtomicBuffer::wrap(&mut region);
            meta.put_i32(CNC_TO_DRIVER_LENGTH_OFFSET, lengths.to_driver as i32);
            meta.put_i32(CNC_TO_CLIENTS_LENGTH_OFFSET, lengths.to_clients as i32);
            meta.put_i32(CNC_COUNTER_METADATA_LENGTH_OFFSET, lengths.counter_metadata as i32);
            meta.put_i32(CNC_COUNTER_VALUES_LENGTH_OFFSET, lengths.counter_values as i32);
            meta.put_i32(CNC_ERROR_LOG_LENGTH_OFFSET, lengths.error_log as i32);
            meta.put_i32_ordered(CNC_VERSION_OFFSET, AERON_CNC_VERSION + 1);
        }
        let err = CncDescriptor::wrap_existing(&mut region, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, AeronError::CncVersionMismatch { .. }));
    }
}
