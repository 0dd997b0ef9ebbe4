//! Component H: event frame decoders for the to-clients broadcast buffer
//! (spec.md §4.H).
//!
//! Decodes a raw `(type_id, bytes)` pair, as handed to the conductor by
//! component C's `BroadcastReceiver::poll`, into a typed [`Event`]. The
//! conductor (component I) then routes the decoded event by correlation id
//! through the correlation registry (component F).

use crate::error::DriverProtoError;

/// Event type ids on the to-clients broadcast buffer. The wire protocol's
/// literal values aren't pinned down by the command side's spec (unlike the
/// to-driver command ids); these follow the existing Aeron client/driver
/// protocol's event numbering, recorded in DESIGN.md.
pub const ON_ERROR: i32 = 0x0F01;
pub const ON_AVAILABLE_IMAGE: i32 = 0x0F02;
pub const ON_PUBLICATION_READY: i32 = 0x0F03;
pub const ON_UNAVAILABLE_IMAGE: i32 = 0x0F05;
pub const ON_EXCLUSIVE_PUBLICATION_READY: i32 = 0x0F06;
pub const ON_SUBSCRIPTION_READY: i32 = 0x0F07;
pub const ON_COUNTER_READY: i32 = 0x0F08;

/// A decoded driver-to-client event, routed by the conductor via whichever
/// correlation id field applies to its variant.
#[derive(Debug, Clone)]
pub enum Event {
    PublicationReady {
        correlation_id: i64,
        registration_id: i64,
        stream_id: i32,
        session_id: i32,
        position_limit_counter_id: i32,
        channel_status_indicator_id: i32,
        log_file_name: String,
    },
    ExclusivePublicationReady {
        correlation_id: i64,
        registration_id: i64,
        stream_id: i32,
        session_id: i32,
        position_limit_counter_id: i32,
        channel_status_indicator_id: i32,
        log_file_name: String,
    },
    SubscriptionReady {
        correlation_id: i64,
        channel_status_indicator_id: i32,
    },
    AvailableImage {
        correlation_id: i64,
        image_correlation_id: i64,
        session_id: i32,
        stream_id: i32,
        subscription_registration_id: i64,
        log_file_name: String,
        source_identity: String,
    },
    UnavailableImage {
        image_correlation_id: i64,
        subscription_registration_id: i64,
    },
    CounterReady {
        correlation_id: i64,
        counter_id: i32,
    },
    Error {
        offending_command_correlation_id: i64,
        error_code: i32,
        error_message: String,
    },
}

impl Event {
    /// The correlation id used to route this event to its pending handle in
    /// the correlation registry, if this event kind carries one.
    pub fn correlation_id(&self) -> Option<i64> {
        match self {
            Event::PublicationReady { correlation_id, .. }
            | Event::ExclusivePublicationReady { correlation_id, .. }
            | Event::SubscriptionReady { correlation_id, .. }
            | Event::CounterReady { correlation_id, .. } => Some(*correlation_id),
            Event::Error {
                offending_command_correlation_id,
                ..
            } => Some(*offending_command_correlation_id),
            Event::AvailableImage { .. } | Event::UnavailableImage { .. } => None,
        }
    }
}

/// Decodes one event frame. `type_id` and `payload` come straight from
/// [`aeron_buffers::BroadcastEvent`].
pub fn decode(type_id: i32, payload: &[u8]) -> Result<Event, DriverProtoError> {
    let mut r = Reader::new(payload);
    match type_id {
        ON_PUBLICATION_READY => Ok(Event::PublicationReady {
            correlation_id: r.i64()?,
            registration_id: r.i64()?,
            stream_id: r.i32()?,
            session_id: r.i32()?,
            position_limit_counter_id: r.i32()?,
            channel_status_indicator_id: r.i32()?,
            log_file_name: r.string()?,
        }),
        ON_EXCLUSIVE_PUBLICATION_READY => Ok(Event::ExclusivePublicationReady {
            correlation_id: r.i64()?,
            registration_id: r.i64()?,
            stream_id: r.i32()?,
            session_id: r.i32()?,
            position_limit_counter_id: r.i32()?,
            channel_status_indicator_id: r.i32()?,
            log_file_name: r.string()?,
        }),
        ON_SUBSCRIPTION_READY => Ok(Event::SubscriptionReady {
            correlation_id: r.i64()?,
            channel_status_indicator_id: r.i32()?,
        }),
        ON_AVAILABLE_IMAGE => Ok(Event::AvailableImage {
            correlation_id: r.i64()?,
            image_correlation_id: r.i64()?,
            session_id: r.i32()?,
            stream_id: r.i32()?,
            subscription_registration_id: r.i64()?,
            log_file_name: r.string()?,
            source_identity: r.string()?,
        }),
        ON_UNAVAILABLE_IMAGE => Ok(Event::UnavailableImage {
            image_correlation_id: r.i64()?,
            subscription_registration_id: r.i64()?,
        }),
        ON_COUNTER_READY => Ok(Event::CounterReady {
            correlation_id: r.i64()?,
            counter_id: r.i32()?,
        }),
        ON_ERROR => Ok(Event::Error {
            offending_command_correlation_id: r.i64()?,
            error_code: r.i32()?,
            error_message: r.string()?,
        }),
        other => Err(DriverProtoError::UnknownEventType(other)),
    }
}

/// Sequential big-picture cursor over an event payload, mirroring the
/// length-prefixed encoding `command.rs` writes on the other side of the
/// wire.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DriverProtoError> {
        if self.pos + len > self.bytes.len() {
            return Err(DriverProtoError::Truncated {
                needed: self.pos + len,
                available: self.bytes.len(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn i64(&mut self) -> Result<i64, DriverProtoError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32, DriverProtoError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String, DriverProtoError> {
        let len = self.i32()?.max(0) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DriverProtoError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command;

    #[test]
    fn decodes_publication_ready() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&42i64.to_le_bytes()); // correlation_id
        payload.extend_from_slice(&7i64.to_le_bytes()); // registration_id
        payload.extend_from_slice(&101i32.to_le_bytes()); // stream_id
        payload.extend_from_slice(&110i32.to_le_bytes()); // session_id
        payload.extend_from_slice(&10i32.to_le_bytes()); // position_limit_counter_id
        payload.extend_from_slice(&11i32.to_le_bytes()); // channel_status_indicator_id
        let name = "/tmp/aeron/pub-1";
        payload.extend_from_slice(&(name.len() as i32).to_le_bytes());
        payload.extend_from_slice(name.as_bytes());

        let event = decode(ON_PUBLICATION_READY, &payload).unwrap();
        match event {
            Event::PublicationReady {
                correlation_id,
                registration_id,
                stream_id,
                session_id,
                log_file_name,
                ..
            } => {
                assert_eq!(correlation_id, 42);
                assert_eq!(registration_id, 7);
                assert_eq!(stream_id, 101);
                assert_eq!(session_id, 110);
                assert_eq!(log_file_name, name);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decodes_error_event() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&99i64.to_le_bytes());
        payload.extend_from_slice(&13i32.to_le_bytes());
        let msg = "invalid channel";
        payload.extend_from_slice(&(msg.len() as i32).to_le_bytes());
        payload.extend_from_slice(msg.as_bytes());

        let event = decode(ON_ERROR, &payload).unwrap();
        match event {
            Event::Error {
                offending_command_correlation_id,
                error_code,
                error_message,
            } => {
                assert_eq!(offending_command_correlation_id, 99);
                assert_eq!(error_code, 13);
                assert_eq!(error_message, msg);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_id_is_rejected() {
        let err = decode(0x1234, &[]).unwrap_err();
        assert!(matches!(err, DriverProtoError::UnknownEventType(0x1234)));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let err = decode(ON_COUNTER_READY, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, DriverProtoError::Truncated { .. }));
    }

    #[test]
    fn correlation_id_extraction_covers_routable_variants() {
        let event = decode(
            ON_ERROR,
            &{
                let mut p = Vec::new();
                p.extend_from_slice(&5i64.to_le_bytes());
                p.extend_from_slice(&1i32.to_le_bytes());
                p.extend_from_slice(&0i32.to_le_bytes());
                p
            },
        )
        .unwrap();
        assert_eq!(event.correlation_id(), Some(5));
    }

    #[test]
    fn event_string_framing_matches_command_side_encoding() {
        // Both sides 4-byte-length-prefix UTF-8 strings identically; decoding
        // a string field written the way `command.rs` writes one should
        // round-trip through this module's `Reader::string`.
        let value = "same-framing";
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(value.len() as i32).to_le_bytes());
        bytes.extend_from_slice(value.as_bytes());
        let mut r = Reader::new(&bytes);
        assert_eq!(r.string().unwrap(), value);
        let _ = command::ADD_PUBLICATION;
    }
}
