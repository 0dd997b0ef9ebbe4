//! Component C: single-producer / many-consumer broadcast buffer used for
//! driver → client events.
//!
//! No CAS is needed here (single producer), but readers must still defend
//! against falling behind a producer that has lapped their cursor. The
//! fast-forward-and-count-the-skip recovery is the same shape as the
//! teacher's `lithos_icc::ring::apply_overrun_policy` / `seq_to_index`,
//! adapted from sequence-number-per-fixed-slot indexing to byte-offset
//! indexing for these variable-length records.

use crate::atomic_buffer::AtomicBuffer;
use crate::error::RingBufferError;
use crate::record::{self, HEADER_LENGTH, PADDING_MSG_TYPE_ID};

const CACHE_LINE_LENGTH: usize = 64;
const TAIL_OFFSET: usize = 0;

/// Trailer size appended after the power-of-two capacity region.
pub const TRAILER_LENGTH: usize = CACHE_LINE_LENGTH;

/// Total bytes required for a broadcast buffer of the given data capacity.
pub const fn bytes_for_capacity(capacity: usize) -> usize {
    capacity + TRAILER_LENGTH
}

/// Maps a byte position to its index within the capacity region.
#[inline]
fn pos_to_index(pos: i64, mask: usize) -> usize {
    (pos as usize) & mask
}

/// Applies the broadcast buffer's overrun policy: if `behind` exceeds
/// `capacity`, fast-forward `cursor` to the oldest still-readable position
/// and report how many bytes were skipped.
///
/// Directly adapted from `lithos-icc::ring`'s `apply_overrun_policy` (same
/// fast-forward-to-`tail - capacity` recovery), generalized from a
/// fixed-slot sequence number to a byte position.
#[inline]
fn apply_overrun_policy(tail: i64, cursor: &mut i64, capacity: i64, lost_bytes: &mut i64) {
    let behind = tail.saturating_sub(*cursor);
    if behind > capacity {
        *lost_bytes += behind - capacity;
        *cursor = tail - capacity;
    }
}

/// The producer side. Only one [`BroadcastTransmitter`] should write to a
/// given buffer at a time (spec.md §4.C: "one producer, the driver").
#[derive(Clone, Copy)]
pub struct BroadcastTransmitter {
    buffer: AtomicBuffer,
    capacity: usize,
    mask: usize,
}

impl BroadcastTransmitter {
    pub fn wrap(buffer: AtomicBuffer, capacity: usize) -> Result<Self, RingBufferError> {
        if !capacity.is_power_of_two() {
            return Err(RingBufferError::Corrupted("capacity must be a power of two"));
        }
        if buffer.len() != bytes_for_capacity(capacity) {
            return Err(RingBufferError::Corrupted("buffer length does not match capacity"));
        }
        Ok(Self {
            buffer,
            capacity,
            mask: capacity - 1,
        })
    }

    #[inline]
    fn tail_offset(&self) -> usize {
        self.capacity + TAIL_OFFSET
    }

    /// Publishes a single event. Unlike the MPSC ring, there is no claim
    /// phase: the record is written in full and only then is the tail
    /// advanced with release semantics, since a single producer can never
    /// race itself.
    pub fn transmit(&self, type_id: i32, payload: &[u8]) -> Result<(), RingBufferError> {
        let record_length = HEADER_LENGTH as i32 + payload.len() as i32;
        let required = record::align(record_length) as usize;
        if required > self.capacity {
            return Err(RingBufferError::MessageTooLarge {
                length: required,
                max: self.capacity,
            });
        }

        let tail = self.buffer.get_i64(self.tail_offset());
        let mut index = pos_to_index(tail, self.mask);
        let to_end = self.capacity - index;
        let mut advance = required as i64;

        if required > to_end {
            self.write_record(index, to_end, PADDING_MSG_TYPE_ID, &[]);
            advance += to_end as i64;
            index = 0;
        }

        self.write_record(index, required, type_id, payload);

        self.buffer.put_i64_ordered(self.tail_offset(), tail + advance);
        Ok(())
    }

    fn write_record(&self, index: usize, aligned_len: usize, type_id: i32, payload: &[u8]) {
        let record_length = if payload.is_empty() {
            aligned_len as i32
        } else {
            HEADER_LENGTH as i32 + payload.len() as i32
        };
        self.buffer.put_i32(index, record_length);
        self.buffer.put_i32(index + 4, type_id);
        if !payload.is_empty() {
            self.buffer.put_bytes(index + HEADER_LENGTH, payload, 0, payload.len());
        }
    }
}

/// The consumer side. Any number of independent [`BroadcastReceiver`]s may
/// open the same buffer; each tracks its own cursor.
pub struct BroadcastReceiver {
    buffer: AtomicBuffer,
    capacity: usize,
    mask: usize,
    cursor: i64,
    lost_bytes: i64,
}

/// One decoded event, borrowed from the buffer for the duration of the
/// handler call in [`BroadcastReceiver::poll`].
pub struct BroadcastEvent<'a> {
    pub type_id: i32,
    pub payload: &'a [u8],
}

impl BroadcastReceiver {
    /// Opens a receiver starting at the buffer's current tail (tail-follow
    /// mode): only events transmitted after this call are observed.
    pub fn wrap(buffer: AtomicBuffer, capacity: usize) -> Result<Self, RingBufferError> {
        if !capacity.is_power_of_two() {
            return Err(RingBufferError::Corrupted("capacity must be a power of two"));
        }
        if buffer.len() != bytes_for_capacity(capacity) {
            return Err(RingBufferError::Corrupted("buffer length does not match capacity"));
        }
        let cursor = buffer.get_i64_volatile(capacity + TAIL_OFFSET);
        Ok(Self {
            buffer,
            capacity,
            mask: capacity - 1,
            cursor,
            lost_bytes: 0,
        })
    }

    #[inline]
    fn tail_offset(&self) -> usize {
        self.capacity + TAIL_OFFSET
    }

    /// Total bytes this receiver has lost to producer overrun since opening.
    pub fn lost_bytes(&self) -> i64 {
        self.lost_bytes
    }

    /// Drains up to `limit` events, invoking `handler` with each. Returns the
    /// number of events delivered. If the consumer had fallen more than
    /// `capacity` bytes behind the producer, this call first fast-forwards
    /// the cursor and accounts for the loss in [`Self::lost_bytes`] before
    /// resuming normal delivery — matching spec.md §4.C's "jumps to the
    /// latest safe record and reports the skip".
    pub fn poll<F>(&mut self, limit: usize, mut handler: F) -> usize
    where
        F: FnMut(BroadcastEvent<'_>),
    {
        let tail = self.buffer.get_i64_volatile(self.tail_offset());
        apply_overrun_policy(
            tail,
            &mut self.cursor,
            self.capacity as i64,
            &mut self.lost_bytes,
        );

        let mut delivered = 0usize;
        while delivered < limit && self.cursor < tail {
            let index = pos_to_index(self.cursor, self.mask);
            let length = self.buffer.get_i32_volatile(index);
            if length <= 0 {
                break;
            }
            let type_id = self.buffer.get_i32(index + 4);
            let aligned = record::align(length) as i64;
            self.cursor += aligned;

            if type_id != PADDING_MSG_TYPE_ID {
                let payload_len = length as usize - HEADER_LENGTH;
                let payload = self.buffer.get_bytes(index + HEADER_LENGTH, payload_len);
                handler(BroadcastEvent { type_id, payload });
                delivered += 1;
            }
        }

        delivered
    }
}
