//! Shared record framing used by both the MPSC ring buffer (component B) and
//! the broadcast buffer (component C).
//!
//! Every record in the capacity region starts with an 8-byte header: a
//! 32-bit length (negated while the record is still being claimed, positive
//! once published) followed by a 32-bit type id. The payload follows
//! immediately and the whole record, header included, is padded up to the
//! next multiple of [`ALIGNMENT`].

/// All records (and the claimed-but-unpublished length field) are aligned to
/// this boundary, matching spec.md §4.B ("8-byte aligned").
pub const ALIGNMENT: usize = 8;

/// Bytes occupied by the length + type-id header that precedes every record.
pub const HEADER_LENGTH: usize = 8;

/// A type id reserved to mark padding records inserted when a reservation
/// would otherwise wrap past the end of the capacity region.
pub const PADDING_MSG_TYPE_ID: i32 = -1;

/// Rounds `length` up to the next multiple of [`ALIGNMENT`].
#[inline]
pub const fn align(length: i32) -> i32 {
    (length + (ALIGNMENT as i32 - 1)) & !(ALIGNMENT as i32 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_rounds_up_to_8() {
        assert_eq!(align(0), 0);
        assert_eq!(align(1), 8);
        assert_eq!(align(8), 8);
        assert_eq!(align(9), 16);
        assert_eq!(align(HEADER_LENGTH as i32 + 3), 16);
    }
}
