//! `aeron-driver-proto`: components G and H, the wire protocol between a
//! client and the media driver over the shared-memory command/event plane.
//!
//! - `command`: encodes `ADD_*`/`REMOVE_*`/`CLIENT_KEEPALIVE` frames into the
//!   to-driver ring buffer.
//! - `event`: decodes `ON_*` event frames from the to-clients broadcast
//!   buffer into a typed [`event::Event`].

pub mod command;
mod error;
pub mod event;

pub use error::DriverProtoError;
pub use event::Event;
