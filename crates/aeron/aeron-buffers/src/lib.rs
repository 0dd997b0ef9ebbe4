//! `aeron-buffers`: lock-free shared-memory data structures for the aeron
//! client/driver command and event planes.
//!
//! - [`AtomicBuffer`]: component A, aligned ordered/volatile/CAS access over
//!   a byte region.
//! - [`ManyToOneRingBuffer`]: component B, the to-driver command channel.
//! - [`BroadcastTransmitter`] / [`BroadcastReceiver`]: component C, the
//!   to-clients event channel.
//!
//! # Internal modules
//! - `atomic_buffer`: component A
//! - `record`: shared length-prefixed record framing for B and C
//! - `mpsc_ring`: component B
//! - `broadcast`: component C
//! - `error`: shared error type

mod atomic_buffer;
mod broadcast;
mod error;
mod mpsc_ring;
mod record;

pub use atomic_buffer::AtomicBuffer;
pub use broadcast::{BroadcastEvent, BroadcastReceiver, BroadcastTransmitter};
pub use error::RingBufferError;
pub use mpsc_ring::ManyToOneRingBuffer;
pub use record::{ALIGNMENT, HEADER_LENGTH, PADDING_MSG_TYPE_ID, align};

pub mod trailer {
    //! Trailer sizes, re-exported so callers sizing a shared-memory region
    //! (e.g. the CnC descriptor in `aeron-client`) don't need to reach into
    //! the private ring modules.
    pub use crate::broadcast::{TRAILER_LENGTH as BROADCAST_TRAILER_LENGTH, bytes_for_capacity as broadcast_bytes_for_capacity};
    pub use crate::mpsc_ring::{TRAILER_LENGTH as MPSC_TRAILER_LENGTH, bytes_for_capacity as mpsc_bytes_for_capacity};
}
