//! `aeron-client`: the client-side conductor (spec.md §4.I) and the
//! supporting pieces it is built from — the CnC descriptor, the correlation
//! registry, resource handles, injectable clocks, and process configuration.
//!
//! - `conductor`: component I, the single-threaded `ClientConductor` agent.
//! - `correlation`: component F, the correlation registry.
//! - `resources`: the client-visible resource handles (publications,
//!   subscriptions, images, counters) and the mapped log buffer they share.
//! - `cnc`: the CnC file descriptor (spec.md §6).
//! - `context`: process-wide configuration (spec.md §6).
//! - `clock`: component J, injectable epoch/monotonic clocks.
//! - `error`: the crate's unified error type.

mod clock;
mod cnc;
mod conductor;
mod context;
mod correlation;
mod error;
mod resources;

pub use clock::{EpochClock, NanoClock, SystemEpochClock, SystemNanoClock};
#[cfg(any(test, feature = "test-support"))]
pub use clock::{ManualEpochClock, ManualNanoClock};

pub use cnc::{CncDescriptor, CncLengths, AERON_CNC_VERSION, CNC_META_DATA_LENGTH};

pub use conductor::{
    ClientConductor, CounterHandle, ExclusivePublicationHandle, Poll, PublicationHandle, SubscriptionHandle,
};

pub use context::{ConfigError, Context, ContextToml};

pub use correlation::{HandleKind, HandleState, RequestContext};

pub use error::AeronError;

pub use resources::{Counter, ExclusivePublication, Image, LogBuffer, OnAvailableImage, OnUnavailableImage, Publication, Subscription};
