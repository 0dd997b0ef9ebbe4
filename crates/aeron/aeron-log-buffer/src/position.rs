//! Position algebra for the three-partition term log (spec.md §3).
//!
//! Every function here is a pure computation over plain integers with no
//! shared state; the arithmetic must match the driver bit-for-bit, so nothing
//! here is "improved" relative to the canonical formulas.

use crate::error::LogBufferError;

/// Minimum term length: 64 KiB.
pub const TERM_MIN_LENGTH: i32 = 64 * 1024;

/// Frame alignment in bytes that a term length must be a multiple of.
pub const FRAME_ALIGNMENT: i32 = 32;

/// Number of partitions in a log. Fixed by spec.md §3's invariant.
pub const PARTITION_COUNT: usize = 3;

/// Validates a candidate term length: `>= TERM_MIN_LENGTH`, a multiple of
/// `FRAME_ALIGNMENT`, and a power of two (required for the shift-based
/// position algebra below).
pub fn check_term_length(term_length: i32) -> Result<(), LogBufferError> {
    if term_length < TERM_MIN_LENGTH
        || term_length % FRAME_ALIGNMENT != 0
        || !term_length.is_power_of_two()
    {
        return Err(LogBufferError::InvalidTermLength {
            length: term_length,
            min: TERM_MIN_LENGTH,
            align: FRAME_ALIGNMENT,
        });
    }
    Ok(())
}

/// `positionBitsToShift`: log2 of a power-of-two term length.
#[inline]
pub fn position_bits_to_shift(term_length: i32) -> u32 {
    debug_assert!(term_length.is_power_of_two());
    term_length.trailing_zeros()
}

/// Number of terms elapsed since `initial_term_id`. Subtraction handles
/// 32-bit term-id wraparound the same way the driver's signed arithmetic
/// does (spec.md §3: "may underflow on rollover; wraps correctly").
#[inline]
pub fn term_count(term_id: i32, initial_term_id: i32) -> i64 {
    term_id.wrapping_sub(initial_term_id) as i64
}

/// Absolute stream position for `(term_id, offset)` at the given shift.
#[inline]
pub fn compute_position(term_id: i32, offset: i32, shift: u32, initial_term_id: i32) -> i64 {
    (term_count(term_id, initial_term_id) << shift) + offset as i64
}

/// Position at which `term_id` begins.
#[inline]
pub fn term_begin_position(term_id: i32, shift: u32, initial_term_id: i32) -> i64 {
    term_count(term_id, initial_term_id) << shift
}

/// Recovers the term id that `position` falls within.
#[inline]
pub fn term_id_from_position(position: i64, shift: u32, initial_term_id: i32) -> i32 {
    ((position >> shift) as i32).wrapping_add(initial_term_id)
}

/// Recovers the offset within a term that `position` falls at.
#[inline]
pub fn term_offset_from_position(position: i64, shift: u32) -> i32 {
    let mask = (1i64 << shift) - 1;
    (position & mask) as i32
}

/// Maps a non-negative term count to its partition index.
#[inline]
pub fn index_by_term_count(term_count: i64) -> usize {
    term_count.rem_euclid(PARTITION_COUNT as i64) as usize
}

/// Maps a term id to its partition index, given the initial term id.
#[inline]
pub fn index_by_term(initial_term_id: i32, term_id: i32) -> usize {
    index_by_term_count(term_count(term_id, initial_term_id))
}

/// Maps an absolute position to its partition index.
#[inline]
pub fn index_by_position(position: i64, shift: u32) -> usize {
    index_by_term_count(position >> shift)
}

/// The partition index that follows `index` in rotation order.
#[inline]
pub fn next_partition_index(index: usize) -> usize {
    (index + 1) % PARTITION_COUNT
}

/// Total bytes a log occupies: three term buffers plus the metadata trailer.
#[inline]
pub fn log_length(term_length: i32, meta_data_length: i32) -> i64 {
    3 * term_length as i64 + meta_data_length as i64
}

/// Recovers the per-term length from a log's total length.
#[inline]
pub fn term_length(log_length: i64, meta_data_length: i32) -> i32 {
    ((log_length - meta_data_length as i64) / PARTITION_COUNT as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    // P1: position algebra round-trip.
    #[test]
    fn position_round_trips_across_shifts_and_terms() {
        for shift in 16u32..=24 {
            let term_length = 1i32 << shift;
            for initial_term_id in [-5i32, 0, 1, 1_000_000] {
                for delta in [0i32, 1, 7, 1 << 20] {
                    let active_term_id = initial_term_id.wrapping_add(delta);
                    for offset in [0i32, 1, term_length / 2, term_length - FRAME_ALIGNMENT] {
                        let pos = compute_position(active_term_id, offset, shift, initial_term_id);
                        assert_eq!(
                            term_id_from_position(pos, shift, initial_term_id),
                            active_term_id
                        );
                        assert_eq!(term_offset_from_position(pos, shift), offset);
                    }
                }
            }
        }
    }

    // P2: partition indexing.
    #[test]
    fn partition_indexing_matches_modulo_three() {
        let initial = 42;
        for k in 0i64..500 {
            let term_id = initial + k as i32;
            assert_eq!(index_by_term(initial, term_id), (k % 3) as usize);
            assert_eq!(index_by_term_count(k), (k % 3) as usize);
        }
    }

    #[test]
    fn next_partition_index_wraps() {
        assert_eq!(next_partition_index(0), 1);
        assert_eq!(next_partition_index(1), 2);
        assert_eq!(next_partition_index(2), 0);
    }

    #[test]
    fn log_length_and_term_length_are_inverses() {
        let meta = 384;
        let term = 65536;
        assert_eq!(term_length(log_length(term, meta), meta), term);
    }

    #[test]
    fn check_term_length_rejects_small_misaligned_or_non_pow2() {
        assert!(check_term_length(TERM_MIN_LENGTH).is_ok());
        assert!(check_term_length(TERM_MIN_LENGTH - FRAME_ALIGNMENT).is_err());
        assert!(check_term_length(TERM_MIN_LENGTH + FRAME_ALIGNMENT).is_err());
    }
}
