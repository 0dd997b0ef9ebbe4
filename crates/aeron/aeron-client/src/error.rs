use std::time::Duration;

/// Top-level error type for the client conductor and its supporting
/// components. Mirrors the layered `thiserror` style used across the other
/// `aeron-*` crates, with `#[from]` bridges to each one's own error enum.
#[derive(Debug, thiserror::Error)]
pub enum AeronError {
    /// The driver's consumer-heartbeat slot on the to-driver ring has not
    /// advanced within `driver_timeout_ms` (spec.md §4.I step 4, §7
    /// `DRIVER_DEAD`). Sticky: once observed, every subsequent conductor
    /// operation fails with this until the conductor is closed.
    #[error("media driver heartbeat has not advanced within {driver_timeout_ms} ms; driver considered dead")]
    DriverDead { driver_timeout_ms: i64 },

    /// A pending async-add request received no response before its
    /// per-request deadline (spec.md §7 `DRIVER_TIMEOUT`, P6).
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// The client's broadcast-buffer read cursor fell more than the
    /// buffer's capacity behind the driver's producer (spec.md §7
    /// `BROADCAST_LOSS`). Sticky, like `DriverDead`.
    #[error("client fell behind the broadcast buffer producer and lost {lost_bytes} bytes; diverged from driver")]
    BroadcastLoss { lost_bytes: i64 },

    #[error("media driver rejected the request: {error_code}: {error_message}")]
    DriverRejected { error_code: i32, error_message: String },

    #[error("conductor is closed")]
    ConductorClosed,

    #[error("registration id {0} is unknown")]
    UnknownRegistration(i64),

    #[error("handle is not of the expected kind")]
    WrongHandleKind,

    #[error(transparent)]
    Config(#[from] crate::context::ConfigError),

    #[error(transparent)]
    Ring(#[from] aeron_buffers::RingBufferError),

    #[error(transparent)]
    LogBuffer(#[from] aeron_log_buffer::LogBufferError),

    #[error(transparent)]
    Counters(#[from] aeron_counters::CountersError),

    #[error(transparent)]
    DriverProto(#[from] aeron_driver_proto::DriverProtoError),

    #[error("CnC file version {found} is not compatible with expected {expected}")]
    CncVersionMismatch { found: i32, expected: i32 },

    #[error("CnC file is not yet initialized by the driver")]
    CncNotReady,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
