use thiserror::Error;

/// Errors surfaced by the log buffer descriptor.
#[derive(Debug, Error)]
pub enum LogBufferError {
    #[error("term length {length} is invalid: must be >= {min} and a multiple of {align}")]
    InvalidTermLength { length: i32, min: i32, align: i32 },

    #[error("default frame header length {actual} does not match expected length {expected}")]
    InvalidArgument { actual: usize, expected: usize },
}
