//! Component B: multi-producer / single-consumer ring buffer used for the
//! to-driver command channel.
//!
//! Capacity must be a power of two. The backing region is `capacity +
//! TRAILER_LENGTH` bytes: the first `capacity` bytes are the data region,
//! followed by four cache-line-aligned 64-bit trailer counters (tail, head,
//! correlation counter, consumer heartbeat) — spec.md §3 "MPSC ring buffer
//! header" and §4.B.

use crate::atomic_buffer::AtomicBuffer;
use crate::error::RingBufferError;
use crate::record::{self, ALIGNMENT, HEADER_LENGTH, PADDING_MSG_TYPE_ID};
use std::sync::atomic::Ordering as StdOrdering;

const CACHE_LINE_LENGTH: usize = 64;

const TAIL_POSITION_OFFSET: usize = 0;
const HEAD_POSITION_OFFSET: usize = CACHE_LINE_LENGTH;
const CORRELATION_COUNTER_OFFSET: usize = 2 * CACHE_LINE_LENGTH;
const CONSUMER_HEARTBEAT_OFFSET: usize = 3 * CACHE_LINE_LENGTH;

/// Total trailer size appended after the power-of-two capacity region.
pub const TRAILER_LENGTH: usize = 4 * CACHE_LINE_LENGTH;

/// Total bytes required for a ring of the given data capacity.
pub const fn bytes_for_capacity(capacity: usize) -> usize {
    capacity + TRAILER_LENGTH
}

/// A claimed-but-not-yet-fetched-from-consumer view, used only internally to
/// keep `write` readable; not part of the public API.
struct Reservation {
    index: usize,
    record_length: i32,
}

/// Multi-producer / single-consumer ring buffer.
///
/// `ManyToOneRingBuffer` is `Copy`/`Send`/`Sync` the same way `AtomicBuffer`
/// is: it is a handle into shared memory, and every producer/consumer in the
/// process (or across processes, via the same mmap) wraps its own instance
/// over the same bytes.
#[derive(Clone, Copy)]
pub struct ManyToOneRingBuffer {
    buffer: AtomicBuffer,
    capacity: usize,
    mask: usize,
    max_msg_length: i32,
}

impl ManyToOneRingBuffer {
    /// Wraps `buffer` as a ring with the given data-region `capacity` (must
    /// be a power of two and `buffer.len() == bytes_for_capacity(capacity)`).
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
            max_msg_length: (capacity / 8) as i32,
        })
    }

    #[inline]
    fn tail_offset(&self) -> usize {
        self.capacity + TAIL_POSITION_OFFSET
    }

    #[inline]
    fn head_offset(&self) -> usize {
        self.capacity + HEAD_POSITION_OFFSET
    }

    #[inline]
    fn correlation_offset(&self) -> usize {
        self.capacity + CORRELATION_COUNTER_OFFSET
    }

    #[inline]
    fn heartbeat_offset(&self) -> usize {
        self.capacity + CONSUMER_HEARTBEAT_OFFSET
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_msg_length(&self) -> i32 {
        self.max_msg_length
    }

    /// Returns a fresh, monotonically increasing correlation id. Sequentially
    /// consistent, matching spec.md's "fetch_add(1) ... with sequential
    /// consistency".
    #[inline]
    pub fn next_correlation_id(&self) -> i64 {
        // AtomicBuffer exposes AcqRel fetch_add; promote to SeqCst via a
        // trailing fence so every producer observes a single total order,
        // which is what spec.md calls for here specifically (every other
        // counter in this ring only needs AcqRel).
        let prior = self.buffer.get_and_add_i64(self.correlation_offset(), 1);
        std::sync::atomic::fence(StdOrdering::SeqCst);
        prior
    }

    /// Stamps this ring's consumer-liveness slot with `now_ms`. Called by the
    /// side that *consumes* this ring — for the to-driver ring that is the
    /// driver; the client (a producer) reads the slot back via
    /// [`Self::consumer_heartbeat_time`] to detect a dead driver (spec.md
    /// §4.I step 4). The naming mirrors the data structure, not the
    /// direction of who benefits from the check.
    #[inline]
    pub fn consumer_heartbeat_time(&self, now_ms: i64) {
        self.buffer.put_i64_ordered(self.heartbeat_offset(), now_ms);
    }

    /// Reads the consumer-liveness slot written by [`Self::consumer_heartbeat_time`].
    #[inline]
    pub fn consumer_heartbeat_time_volatile(&self) -> i64 {
        self.buffer.get_i64_volatile(self.heartbeat_offset())
    }

    /// Writes a command frame of type `type_id` with payload `src` into the
    /// ring. Returns `Err(InsufficientSpace)` if there is no room; no partial
    /// write is ever observable by the consumer in that case.
    pub fn write(&self, type_id: i32, src: &[u8]) -> Result<(), RingBufferError> {
        let record_length = HEADER_LENGTH as i32 + src.len() as i32;
        if record_length > self.max_msg_length {
            return Err(RingBufferError::MessageTooLarge {
                length: record_length as usize,
                max: self.max_msg_length as usize,
            });
        }
        let required = record::align(record_length) as usize;

        loop {
            let head = self.buffer.get_i64_volatile(self.head_offset());
            let tail = self.buffer.get_i64_volatile(self.tail_offset());
            let available = self.capacity as i64 - (tail - head);
            if required as i64 > available {
                return Err(RingBufferError::InsufficientSpace { required });
            }

            let index = (tail as usize) & self.mask;
            let to_buffer_end = self.capacity - index;

            if required > to_buffer_end {
                // Not enough contiguous room before wrap: claim the
                // remainder as a padding record and retry from index 0.
                if self.buffer.compare_and_set_i64(
                    self.tail_offset(),
                    tail,
                    tail + to_buffer_end as i64,
                ) {
                    self.write_padding(index, to_buffer_end);
                }
                continue;
            }

            if self
                .buffer
                .compare_and_set_i64(self.tail_offset(), tail, tail + required as i64)
            {
                self.publish_record(
                    Reservation {
                        index,
                        record_length,
                    },
                    type_id,
                    src,
                );
                return Ok(());
            }
        }
    }

    fn write_padding(&self, index: usize, padding_length: usize) {
        debug_assert_eq!(padding_length % ALIGNMENT, 0);
        // Claim marker first (negated length), matching the real-record
        // protocol, then the type id, then publish.
        self.buffer
            .put_i32_ordered(index, -(padding_length as i32));
        self.buffer.put_i32(index + 4, PADDING_MSG_TYPE_ID);
        self.buffer.put_i32_ordered(index, padding_length as i32);
    }

    fn publish_record(&self, reservation: Reservation, type_id: i32, src: &[u8]) {
        let Reservation { index, record_length } = reservation;
        // Claim marker: negative length signals "reserved, not yet readable".
        self.buffer.put_i32_ordered(index, -record_length);
        self.buffer.put_i32(index + 4, type_id);
        self.buffer.put_bytes(index + HEADER_LENGTH, src, 0, src.len());
        // Publish: release store of the positive length.
        self.buffer.put_i32_ordered(index, record_length);
    }

    /// Drains up to `message_limit` records, invoking `handler(type_id,
    /// payload, length)` for each. Stops early if an unpublished (negative or
    /// zero length) slot is observed. Returns the number of records
    /// delivered to `handler` (padding records are skipped and not counted).
    pub fn read<F>(&self, message_limit: usize, mut handler: F) -> usize
    where
        F: FnMut(i32, &[u8]),
    {
        let head = self.buffer.get_i64(self.head_offset());
        let mut bytes_read: i64 = 0;
        let mut messages_read = 0usize;

        while messages_read < message_limit {
            let index = ((head + bytes_read) as usize) & self.mask;
            let length = self.buffer.get_i32_volatile(index);
            if length <= 0 {
                break;
            }

            let aligned_length = record::align(length);
            let type_id = self.buffer.get_i32(index + 4);
            bytes_read += aligned_length as i64;

            if type_id != PADDING_MSG_TYPE_ID {
                let payload_len = length as usize - HEADER_LENGTH;
                let payload = self.buffer.get_bytes(index + HEADER_LENGTH, payload_len);
                handler(type_id, payload);
                messages_read += 1;
            }
        }

        if bytes_read > 0 {
            let start = (head as usize) & self.mask;
            self.zero_consumed(start, bytes_read as usize);
            self.buffer
                .put_i64_ordered(self.head_offset(), head + bytes_read);
        }

        messages_read
    }

    fn zero_consumed(&self, start: usize, len: usize) {
        let end = start + len;
        if end <= self.capacity {
            self.buffer.set_memory(start, len, 0);
        } else {
            let first = self.capacity - start;
            self.buffer.set_memory(start, first, 0);
            self.buffer.set_memory(0, len - first, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_ring(capacity: usize) -> (Vec<u8>, ManyToOneRingBuffer) {
        let mut bytes = vec![0u8; bytes_for_capacity(capacity)];
        let buf = AtomicBuffer::wrap(&mut bytes);
        let ring = ManyToOneRingBuffer::wrap(buf, capacity).unwrap();
        (bytes, ring)
    }

    #[test]
    fn write_then_read_single_record() {
        let (_bytes, ring) = new_ring(1024);
        ring.write(7, b"hello").unwrap();

        let mut seen = Vec::new();
        let n = ring.read(10, |type_id, payload| {
            seen.push((type_id, payload.to_vec()));
        });

        assert_eq!(n, 1);
        assert_eq!(seen, vec![(7, b"hello".to_vec())]);
    }

    #[test]
    fn insufficient_space_reported() {
        let (_bytes, ring) = new_ring(64);
        let payload = vec![0u8; 128];
        let err = ring.write(1, &payload).unwrap_err();
        assert!(matches!(err, RingBufferError::MessageTooLarge { .. }));
    }

    #[test]
    fn wrap_around_inserts_padding_and_continues() {
        let (_bytes, ring) = new_ring(64);
        // Each record of 8-byte payload occupies HEADER_LENGTH(8) + 8 = 16 bytes.
        for _ in 0..3 {
            ring.write(1, &[0u8; 8]).unwrap();
        }
        let mut count = 0;
        ring.read(10, |_, _| count += 1);
        assert_eq!(count, 3);

        // This next write should need to pad across the wrap boundary.
        ring.write(2, &[0u8; 8]).unwrap();
        let mut last_type = 0;
        let n = ring.read(10, |type_id, _| last_type = type_id);
        assert_eq!(n, 1);
        assert_eq!(last_type, 2);
    }

    #[test]
    fn correlation_ids_are_monotonic_and_unique() {
        let (_bytes, ring) = new_ring(1024);
        let a = ring.next_correlation_id();
        let b = ring.next_correlation_id();
        let c = ring.next_correlation_id();
        assert_eq!([a, b, c], [0, 1, 2]);
    }

    #[test]
    fn consumer_heartbeat_roundtrip() {
        let (_bytes, ring) = new_ring(64);
        ring.consumer_heartbeat_time(12345);
        assert_eq!(ring.consumer_heartbeat_time_volatile(), 12345);
    }

    #[test]
    fn mpsc_linearization_program_order_per_producer() {
        use std::sync::Arc;
        use std::thread;

        let capacity = 1 << 16;
        let bytes: Vec<u8> = vec![0u8; bytes_for_capacity(capacity)];
        let bytes = Arc::new(std::sync::Mutex::new(bytes));
        let ring = {
            let mut guard = bytes.lock().unwrap();
            let buf = AtomicBuffer::wrap(&mut guard);
            ManyToOneRingBuffer::wrap(buf, capacity).unwrap()
        };

        const PRODUCERS: i32 = 4;
        const PER_PRODUCER: i32 = 200;

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let payload = i.to_le_bytes();
                        loop {
                            if ring.write(p, &payload).is_ok() {
                                break;
                            }
                            std::thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let mut per_producer_last = vec![-1i32; PRODUCERS as usize];
        let mut total = 0usize;
        loop {
            let n = ring.read(usize::MAX, |type_id, payload| {
                let value = i32::from_le_bytes(payload.try_into().unwrap());
                let last = &mut per_producer_last[type_id as usize];
                assert!(value > *last, "producer {type_id} record out of order");
                *last = value;
                total += 1;
            });
            if n == 0 {
                break;
            }
        }

        assert_eq!(total, (PRODUCERS * PER_PRODUCER) as usize);
        assert!(per_producer_last.iter().all(|&v| v == PER_PRODUCER - 1));
    }
}
