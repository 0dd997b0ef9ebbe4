//! `aeron-log-buffer`: component D, the three-partition term log's position
//! algebra and metadata trailer descriptor.
//!
//! - `position`: pure position-algebra functions (§3 of the data model).
//! - `trailer`: the metadata trailer's binary layout and accessors,
//!   including `rotate_log` and the default-frame-header helpers.

mod error;
pub mod position;
pub mod trailer;

pub use error::LogBufferError;
pub use position::{
    FRAME_ALIGNMENT, PARTITION_COUNT, TERM_MIN_LENGTH, check_term_length, compute_position,
    index_by_position, index_by_term, index_by_term_count, log_length, next_partition_index,
    position_bits_to_shift, term_begin_position, term_count, term_id_from_position, term_length,
    term_offset_from_position,
};
pub use trailer::{
    FRAME_HEADER_LENGTH, LogBufferDescriptor, MAX_FRAME_HEADER_LENGTH, META_DATA_LENGTH,
    pack_raw_tail, term_id_from_raw_tail, term_offset_from_raw_tail,
};
