//! Component G: command frame encoders for the to-driver ring buffer
//! (spec.md §4.G).
//!
//! Each command is a fixed header (`client_id`, `correlation_id`) followed by
//! variable fields, 32-bit-length-prefixed for strings and byte blobs
//! (spec.md §4.G), serialized into a reserved slot in the to-driver
//! `ManyToOneRingBuffer` (component B). The flyweight-over-a-scratch-buffer
//! shape mirrors the reference `DriverProxy::write_command_to_driver` pattern
//! of filling a local buffer before handing it to the ring's single `write`
//! call, generalized here to one encoder function per command instead of a
//! closure-based flyweight.

use crate::error::DriverProtoError;
use aeron_buffers::ManyToOneRingBuffer;

/// Command type ids. Values mirror the wire contract verbatim (spec.md §6).
pub const ADD_PUBLICATION: i32 = 0x01;
pub const REMOVE_PUBLICATION: i32 = 0x02;
pub const ADD_SUBSCRIPTION: i32 = 0x04;
pub const REMOVE_SUBSCRIPTION: i32 = 0x05;
pub const CLIENT_KEEPALIVE: i32 = 0x06;
pub const ADD_EXCLUSIVE_PUBLICATION: i32 = 0x09;
pub const ADD_COUNTER: i32 = 0x0D;
pub const REMOVE_COUNTER: i32 = 0x0E;

fn push_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_str(buf: &mut Vec<u8>, s: &str) {
    push_i32(buf, s.len() as i32);
    buf.extend_from_slice(s.as_bytes());
}

fn push_bytes(buf: &mut Vec<u8>, b: &[u8]) {
    push_i32(buf, b.len() as i32);
    buf.extend_from_slice(b);
}

fn publication_payload(client_id: i64, correlation_id: i64, stream_id: i32, channel: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + 8 + 4 + 4 + channel.len());
    push_i64(&mut payload, client_id);
    push_i64(&mut payload, correlation_id);
    push_i32(&mut payload, stream_id);
    push_str(&mut payload, channel);
    payload
}

/// `ADD_PUBLICATION(stream_id, channel)`.
pub fn add_publication(
    ring: &ManyToOneRingBuffer,
    client_id: i64,
    correlation_id: i64,
    stream_id: i32,
    channel: &str,
) -> Result<(), DriverProtoError> {
    let payload = publication_payload(client_id, correlation_id, stream_id, channel);
    Ok(ring.write(ADD_PUBLICATION, &payload)?)
}

/// `ADD_EXCLUSIVE_PUBLICATION(stream_id, channel)`.
pub fn add_exclusive_publication(
    ring: &ManyToOneRingBuffer,
    client_id: i64,
    correlation_id: i64,
    stream_id: i32,
    channel: &str,
) -> Result<(), DriverProtoError> {
    let payload = publication_payload(client_id, correlation_id, stream_id, channel);
    Ok(ring.write(ADD_EXCLUSIVE_PUBLICATION, &payload)?)
}

fn registration_payload(client_id: i64, correlation_id: i64, registration_id: i64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(24);
    push_i64(&mut payload, client_id);
    push_i64(&mut payload, correlation_id);
    push_i64(&mut payload, registration_id);
    payload
}

/// `REMOVE_PUBLICATION(registration_id)`.
pub fn remove_publication(
    ring: &ManyToOneRingBuffer,
    client_id: i64,
    correlation_id: i64,
    registration_id: i64,
) -> Result<(), DriverProtoError> {
    let payload = registration_payload(client_id, correlation_id, registration_id);
    Ok(ring.write(REMOVE_PUBLICATION, &payload)?)
}

/// `ADD_SUBSCRIPTION(stream_id, channel)`.
pub fn add_subscription(
    ring: &ManyToOneRingBuffer,
    client_id: i64,
    correlation_id: i64,
    stream_id: i32,
    channel: &str,
) -> Result<(), DriverProtoError> {
    let payload = publication_payload(client_id, correlation_id, stream_id, channel);
    Ok(ring.write(ADD_SUBSCRIPTION, &payload)?)
}

/// `REMOVE_SUBSCRIPTION(registration_id)`.
pub fn remove_subscription(
    ring: &ManyToOneRingBuffer,
    client_id: i64,
    correlation_id: i64,
    registration_id: i64,
) -> Result<(), DriverProtoError> {
    let payload = registration_payload(client_id, correlation_id, registration_id);
    Ok(ring.write(REMOVE_SUBSCRIPTION, &payload)?)
}

/// `ADD_COUNTER(type_id, key_bytes, label)`.
pub fn add_counter(
    ring: &ManyToOneRingBuffer,
    client_id: i64,
    correlation_id: i64,
    type_id: i32,
    key: &[u8],
    label: &str,
) -> Result<(), DriverProtoError> {
    let mut payload = Vec::with_capacity(8 + 8 + 4 + 4 + key.len() + 4 + label.len());
    push_i64(&mut payload, client_id);
    push_i64(&mut payload, correlation_id);
    push_i32(&mut payload, type_id);
    push_bytes(&mut payload, key);
    push_str(&mut payload, label);
    Ok(ring.write(ADD_COUNTER, &payload)?)
}

/// `REMOVE_COUNTER(registration_id)`.
pub fn remove_counter(
    ring: &ManyToOneRingBuffer,
    client_id: i64,
    correlation_id: i64,
    registration_id: i64,
) -> Result<(), DriverProtoError> {
    let payload = registration_payload(client_id, correlation_id, registration_id);
    Ok(ring.write(REMOVE_COUNTER, &payload)?)
}

/// `CLIENT_KEEPALIVE`. No correlation id: this frame is not a request.
pub fn client_keepalive(ring: &ManyToOneRingBuffer, client_id: i64) -> Result<(), DriverProtoError> {
    let mut payload = Vec::with_capacity(16);
    push_i64(&mut payload, client_id);
    push_i64(&mut payload, 0);
    Ok(ring.write(CLIENT_KEEPALIVE, &payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeron_buffers::AtomicBuffer;

    fn new_ring(capacity: usize) -> (Vec<u8>, ManyToOneRingBuffer) {
        let mut bytes = vec![0u8; aeron_buffers::trailer::mpsc_bytes_for_capacity(capacity)];
        let buf = AtomicBuffer::wrap(&mut bytes);
        let ring = ManyToOneRingBuffer::wrap(buf, capacity).unwrap();
        (bytes, ring)
    }

    #[test]
    fn add_publication_roundtrips_through_the_ring() {
        let (_bytes, ring) = new_ring(4096);
        add_publication(&ring, 1, 42, 101, "aeron:udp?endpoint=localhost:24567").unwrap();

        let mut seen_type = 0;
        let mut seen_payload = Vec::new();
        ring.read(10, |type_id, payload| {
            seen_type = type_id;
            seen_payload = payload.to_vec();
        });

        assert_eq!(seen_type, ADD_PUBLICATION);
        assert_eq!(&seen_payload[0..8], &1i64.to_le_bytes());
        assert_eq!(&seen_payload[8..16], &42i64.to_le_bytes());
        assert_eq!(&seen_payload[16..20], &101i32.to_le_bytes());
        let channel_len = i32::from_le_bytes(seen_payload[20..24].try_into().unwrap());
        assert_eq!(channel_len as usize, "aeron:udp?endpoint=localhost:24567".len());
    }

    #[test]
    fn remove_publication_encodes_registration_id() {
        let (_bytes, ring) = new_ring(1024);
        remove_publication(&ring, 1, 7, 555).unwrap();

        let mut seen_payload = Vec::new();
        ring.read(10, |_, payload| seen_payload = payload.to_vec());
        assert_eq!(&seen_payload[16..24], &555i64.to_le_bytes());
    }

    #[test]
    fn add_counter_encodes_key_and_label() {
        let (_bytes, ring) = new_ring(1024);
        add_counter(&ring, 1, 9, 102, b"", "").unwrap();

        let mut seen_type = 0;
        ring.read(10, |type_id, _| seen_type = type_id);
        assert_eq!(seen_type, ADD_COUNTER);
    }
}
