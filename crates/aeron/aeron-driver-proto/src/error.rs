use thiserror::Error;

/// Errors surfaced while encoding a command frame or decoding an event frame.
#[derive(Debug, Error)]
pub enum DriverProtoError {
    #[error("unrecognised event type id {0:#x}")]
    UnknownEventType(i32),

    #[error("truncated event payload: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    #[error("event payload contained invalid UTF-8 in a string field")]
    InvalidUtf8,

    #[error(transparent)]
    Ring(#[from] aeron_buffers::RingBufferError),
}
