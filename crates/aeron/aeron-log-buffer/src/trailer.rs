//! Log buffer metadata trailer: the fixed-layout region following the three
//! term partitions (spec.md §3 "metadata trailer").
//!
//! Layout (cache-line padded to avoid false sharing between unrelated hot
//! fields, per spec.md's adopted resolution of the active-index/
//! status-message-time Open Question — see DESIGN.md):
//!
//! ```text
//! [0, 24)    raw tail, partitions 0..3 (i64 each)
//! [24, 128)  active partition index (i32) + pad — first cache-line pair
//! [128,192)  time of last status message (i64) — second cache-line pair
//! [192,256)  registration id (i64), initial term id (i32),
//!            default frame header length (i32), mtu length (i32) — own line
//! [256,384)  default frame header bytes (up to MAX_FRAME_HEADER_LENGTH)
//! ```

use crate::error::LogBufferError;
use crate::position::PARTITION_COUNT;
use aeron_buffers::AtomicBuffer;

const CACHE_LINE_LENGTH: usize = 64;

const RAW_TAIL_0_OFFSET: usize = 0;
const RAW_TAIL_STRIDE: usize = 8;

/// Offset of the active partition index. Sits within the first cache-line
/// pair per the Open Question's adopted interpretation, not on its own line.
const ACTIVE_PARTITION_INDEX_OFFSET: usize = PARTITION_COUNT * RAW_TAIL_STRIDE;

/// Time of last status message begins the second cache-line pair.
const TIME_OF_LAST_SM_OFFSET: usize = 2 * CACHE_LINE_LENGTH;

const REGISTRATION_ID_OFFSET: usize = TIME_OF_LAST_SM_OFFSET + CACHE_LINE_LENGTH;
const INITIAL_TERM_ID_OFFSET: usize = REGISTRATION_ID_OFFSET + 8;
const DEFAULT_FRAME_HEADER_LENGTH_OFFSET: usize = INITIAL_TERM_ID_OFFSET + 4;
const MTU_LENGTH_OFFSET: usize = DEFAULT_FRAME_HEADER_LENGTH_OFFSET + 4;

const DEFAULT_FRAME_HEADER_OFFSET: usize = REGISTRATION_ID_OFFSET + CACHE_LINE_LENGTH;

/// Maximum bytes reserved for the default frame header.
pub const MAX_FRAME_HEADER_LENGTH: usize = 128;

/// Expected length of a data frame header (spec.md §4.D: "validates header
/// length equals the expected constant"). This is Aeron's fixed data-frame
/// header size, not a value the caller may choose.
pub const FRAME_HEADER_LENGTH: usize = 32;

/// Total size of the metadata trailer.
pub const META_DATA_LENGTH: usize = DEFAULT_FRAME_HEADER_OFFSET + MAX_FRAME_HEADER_LENGTH;

/// Packs a `(term_id, term_offset)` pair into the trailer's raw-tail encoding.
#[inline]
pub fn pack_raw_tail(term_id: i32, term_offset: i32) -> i64 {
    ((term_id as i64) << 32) | (term_offset as u32 as i64)
}

/// Unpacks the term id from a raw tail value.
#[inline]
pub fn term_id_from_raw_tail(raw_tail: i64) -> i32 {
    (raw_tail >> 32) as i32
}

/// Unpacks the term offset from a raw tail value, clamped to `term_length`
/// (spec.md §3: "reads must clamp via `min(rawTail & 0xFFFFFFFF, L)`").
#[inline]
pub fn term_offset_from_raw_tail(raw_tail: i64, term_length: i32) -> i32 {
    let offset = (raw_tail & 0xFFFF_FFFF) as i32;
    offset.min(term_length)
}

/// Read/write view over a log buffer's metadata trailer.
#[derive(Clone, Copy)]
pub struct LogBufferDescriptor {
    meta: AtomicBuffer,
}

impl LogBufferDescriptor {
    /// Wraps an already-mapped metadata region. Does not initialize it: use
    /// [`Self::initialize`] when laying out a brand new log.
    pub fn wrap(meta: AtomicBuffer) -> Result<Self, LogBufferError> {
        if meta.len() != META_DATA_LENGTH {
            return Err(LogBufferError::InvalidArgument {
                actual: meta.len(),
                expected: META_DATA_LENGTH,
            });
        }
        Ok(Self { meta })
    }

    /// Initializes a freshly allocated trailer: all three partitions empty at
    /// `initial_term_id`, partition 0 active, no status messages yet.
    pub fn initialize(&self, initial_term_id: i32, mtu_length: i32) {
        for partition in 0..PARTITION_COUNT {
            self.set_raw_tail_ordered(partition, pack_raw_tail(initial_term_id, 0));
        }
        self.set_active_partition_index_ordered(0);
        self.set_time_of_last_status_message_ordered(0);
        self.set_registration_id(-1);
        self.set_initial_term_id(initial_term_id);
        self.meta.put_i32(MTU_LENGTH_OFFSET, mtu_length);
    }

    #[inline]
    fn raw_tail_offset(partition_index: usize) -> usize {
        RAW_TAIL_0_OFFSET + partition_index * RAW_TAIL_STRIDE
    }

    /// Reads partition `partition_index`'s raw tail with acquire semantics.
    pub fn raw_tail_volatile(&self, partition_index: usize) -> i64 {
        self.meta.get_i64_volatile(Self::raw_tail_offset(partition_index))
    }

    /// Publishes a new raw tail for `partition_index` with release semantics.
    pub fn set_raw_tail_ordered(&self, partition_index: usize, raw_tail: i64) {
        self.meta
            .put_i64_ordered(Self::raw_tail_offset(partition_index), raw_tail);
    }

    /// Reads the active partition index with acquire semantics.
    pub fn active_partition_index_volatile(&self) -> i32 {
        self.meta.get_i32_volatile(ACTIVE_PARTITION_INDEX_OFFSET)
    }

    /// Publishes a new active partition index with release semantics.
    pub fn set_active_partition_index_ordered(&self, index: i32) {
        self.meta
            .put_i32_ordered(ACTIVE_PARTITION_INDEX_OFFSET, index);
    }

    /// Reads the time of the last status message with acquire semantics.
    pub fn time_of_last_status_message_volatile(&self) -> i64 {
        self.meta.get_i64_volatile(TIME_OF_LAST_SM_OFFSET)
    }

    /// Publishes a new time-of-last-status-message with release semantics.
    pub fn set_time_of_last_status_message_ordered(&self, time_ms: i64) {
        self.meta.put_i64_ordered(TIME_OF_LAST_SM_OFFSET, time_ms);
    }

    pub fn registration_id(&self) -> i64 {
        self.meta.get_i64(REGISTRATION_ID_OFFSET)
    }

    pub fn set_registration_id(&self, registration_id: i64) {
        self.meta.put_i64(REGISTRATION_ID_OFFSET, registration_id);
    }

    pub fn initial_term_id(&self) -> i32 {
        self.meta.get_i32(INITIAL_TERM_ID_OFFSET)
    }

    fn set_initial_term_id(&self, initial_term_id: i32) {
        self.meta.put_i32(INITIAL_TERM_ID_OFFSET, initial_term_id);
    }

    pub fn default_frame_header_length(&self) -> i32 {
        self.meta.get_i32(DEFAULT_FRAME_HEADER_LENGTH_OFFSET)
    }

    pub fn mtu_length(&self) -> i32 {
        self.meta.get_i32(MTU_LENGTH_OFFSET)
    }

    /// Returns the stored default frame header bytes (empty if none stored).
    pub fn default_frame_header_bytes(&self) -> &[u8] {
        let length = self.default_frame_header_length() as usize;
        self.meta.get_bytes(DEFAULT_FRAME_HEADER_OFFSET, length)
    }

    /// Stores `header` as the default frame header template for this log.
    /// Rejects any length other than [`FRAME_HEADER_LENGTH`] (spec.md §4.D:
    /// "validates header length equals the expected constant, else
    /// `INVALID_ARGUMENT`").
    pub fn store_default_frame_header(&self, header: &[u8]) -> Result<(), LogBufferError> {
        if header.len() != FRAME_HEADER_LENGTH {
            return Err(LogBufferError::InvalidArgument {
                actual: header.len(),
                expected: FRAME_HEADER_LENGTH,
            });
        }
        self.meta
            .put_bytes(DEFAULT_FRAME_HEADER_OFFSET, header, 0, header.len());
        self.meta
            .put_i32(DEFAULT_FRAME_HEADER_LENGTH_OFFSET, header.len() as i32);
        Ok(())
    }

    /// Copies this log's default frame header into `term_buf` at `offset`,
    /// laying out a new frame's header the way the producer does before
    /// writing payload bytes after it.
    pub fn apply_default_header(&self, term_buf: AtomicBuffer, offset: usize) {
        let header = self.default_frame_header_bytes();
        term_buf.put_bytes(offset, header, 0, header.len());
    }

    /// Rotates the active partition: the partition following `active_index`
    /// starts a fresh term at `new_term_id`, then the active index is
    /// published with release semantics (spec.md §3 `rotateLog`). The
    /// previously active partition is left untouched.
    pub fn rotate_log(&self, active_index: usize, new_term_id: i32) {
        let next_index = (active_index + 1) % PARTITION_COUNT;
        self.set_raw_tail_ordered(next_index, pack_raw_tail(new_term_id, 0));
        self.set_active_partition_index_ordered(next_index as i32);
    }
}
