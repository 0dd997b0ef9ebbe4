use thiserror::Error;

/// Errors surfaced by the MPSC and broadcast ring buffers.
#[derive(Debug, Error)]
pub enum RingBufferError {
    #[error("insufficient space for a record of {required} bytes")]
    InsufficientSpace { required: usize },

    #[error("record length {length} exceeds max message length {max}")]
    MessageTooLarge { length: usize, max: usize },

    #[error("ring buffer header is corrupted or unrecognised: {0}")]
    Corrupted(&'static str),
}
