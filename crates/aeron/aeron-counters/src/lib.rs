//! `aeron-counters`: component E, the client-side read-only view over the
//! counters plane.
//!
//! Two parallel regions (spec.md §4.E): a dense values array (8-byte
//! counters indexed by counter id) and a metadata region (typed records with
//! a status, a type id, key bytes, and a label). The client conductor never
//! allocates a counter; it only retains ids the driver has already handed
//! back (on `ON_COUNTER_READY`) and resolves them to value slots here —
//! mirroring `ObsidianEngine`/`OnyxEngine`'s stance that client components
//! observe driver-owned state and never mutate it.

mod error;

pub use error::CountersError;

use aeron_buffers::AtomicBuffer;

/// Bytes per counter in the values region.
pub const VALUE_LENGTH: usize = 8;

/// Bytes per counter record in the metadata region.
pub const METADATA_RECORD_LENGTH: usize = 128;

const STATUS_OFFSET: usize = 0;
const TYPE_ID_OFFSET: usize = 4;
const KEY_OFFSET: usize = 8;
/// Bytes reserved for the counter's opaque key.
pub const MAX_KEY_LENGTH: usize = 48;
const LABEL_LENGTH_OFFSET: usize = KEY_OFFSET + MAX_KEY_LENGTH;
const LABEL_OFFSET: usize = LABEL_LENGTH_OFFSET + 4;
/// Maximum bytes of a counter's UTF-8 label.
pub const MAX_LABEL_LENGTH: usize = METADATA_RECORD_LENGTH - LABEL_OFFSET;

/// Lifecycle status of a counter's metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterStatus {
    /// The slot has never been allocated by the driver.
    Unused,
    /// The counter is live.
    Allocated,
    /// The counter was freed by the driver; the id must not be reused by a
    /// reader that cached it earlier.
    Reclaimed,
}

impl CounterStatus {
    fn from_raw(raw: i32) -> Self {
        match raw {
            1 => CounterStatus::Allocated,
            -1 => CounterStatus::Reclaimed,
            _ => CounterStatus::Unused,
        }
    }
}

/// Read-only client view over the counters values and metadata regions.
#[derive(Clone, Copy)]
pub struct CountersReader {
    values: AtomicBuffer,
    metadata: AtomicBuffer,
    max_counter_id: i32,
}

impl CountersReader {
    /// Wraps the values and metadata regions mapped from the CnC file.
    pub fn wrap(values: AtomicBuffer, metadata: AtomicBuffer) -> Result<Self, CountersError> {
        if values.len() % VALUE_LENGTH != 0 {
            return Err(CountersError::MisalignedValuesBuffer {
                length: values.len(),
                slot: VALUE_LENGTH,
            });
        }
        let max_counter_id = (values.len() / VALUE_LENGTH) as i32 - 1;
        Ok(Self {
            values,
            metadata,
            max_counter_id,
        })
    }

    fn check_id(&self, counter_id: i32) -> Result<(), CountersError> {
        if counter_id < 0 || counter_id > self.max_counter_id {
            return Err(CountersError::CounterIdOutOfRange {
                counter_id,
                max_counter_id: self.max_counter_id,
            });
        }
        Ok(())
    }

    /// Reads the current value of `counter_id` with acquire semantics, the
    /// same ordering a concurrently updating driver publishes it with.
    pub fn counter_value(&self, counter_id: i32) -> Result<i64, CountersError> {
        self.check_id(counter_id)?;
        Ok(self
            .values
            .get_i64_volatile(counter_id as usize * VALUE_LENGTH))
    }

    fn metadata_offset(counter_id: i32) -> usize {
        counter_id as usize * METADATA_RECORD_LENGTH
    }

    pub fn counter_status(&self, counter_id: i32) -> Result<CounterStatus, CountersError> {
        self.check_id(counter_id)?;
        let raw = self
            .metadata
            .get_i32_volatile(Self::metadata_offset(counter_id) + STATUS_OFFSET);
        Ok(CounterStatus::from_raw(raw))
    }

    pub fn counter_type_id(&self, counter_id: i32) -> Result<i32, CountersError> {
        self.check_id(counter_id)?;
        Ok(self
            .metadata
            .get_i32(Self::metadata_offset(counter_id) + TYPE_ID_OFFSET))
    }

    pub fn counter_key(&self, counter_id: i32) -> Result<&[u8], CountersError> {
        self.check_id(counter_id)?;
        Ok(self
            .metadata
            .get_bytes(Self::metadata_offset(counter_id) + KEY_OFFSET, MAX_KEY_LENGTH))
    }

    /// Reads the counter's label. The stored bytes are validated as UTF-8;
    /// invalid bytes are replaced the way `String::from_utf8_lossy` does,
    /// since a corrupt label must never crash a reader.
    pub fn counter_label(&self, counter_id: i32) -> Result<String, CountersError> {
        self.check_id(counter_id)?;
        let base = Self::metadata_offset(counter_id);
        let length = self.metadata.get_i32(base + LABEL_LENGTH_OFFSET).max(0) as usize;
        let length = length.min(MAX_LABEL_LENGTH);
        let bytes = self.metadata.get_bytes(base + LABEL_OFFSET, length);
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// The highest valid counter id for this values region.
    pub fn max_counter_id(&self) -> i32 {
        self.max_counter_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_reader(counter_count: usize) -> (Vec<u8>, Vec<u8>, CountersReader) {
        let mut values = vec![0u8; counter_count * VALUE_LENGTH];
        let mut metadata = vec![0u8; counter_count * METADATA_RECORD_LENGTH];
        let values_buf = AtomicBuffer::wrap(&mut values);
        let metadata_buf = AtomicBuffer::wrap(&mut metadata);
        let reader = CountersReader::wrap(values_buf, metadata_buf).unwrap();
        (values, metadata, reader)
    }

    #[test]
    fn reads_value_written_by_driver_simulation() {
        let (mut values, _metadata, reader) = new_reader(4);
        let buf = AtomicBuffer::wrap(&mut values);
        buf.put_i64_ordered(2 * VALUE_LENGTH, 99);

        assert_eq!(reader.counter_value(2).unwrap(), 99);
    }

    #[test]
    fn out_of_range_id_is_rejected() {
        let (_values, _metadata, reader) = new_reader(4);
        assert!(reader.counter_value(4).is_err());
        assert!(reader.counter_value(-1).is_err());
    }

    #[test]
    fn status_type_id_key_and_label_roundtrip() {
        let (_values, mut metadata, reader) = new_reader(2);
        let buf = AtomicBuffer::wrap(&mut metadata);
        let base = METADATA_RECORD_LENGTH;
        buf.put_i32_ordered((base + STATUS_OFFSET) as usize, 1);
        buf.put_i32(base + TYPE_ID_OFFSET, 102);
        let key = [7u8; MAX_KEY_LENGTH];
        buf.put_bytes(base + KEY_OFFSET, &key, 0, key.len());
        let label = b"client-heartbeat";
        buf.put_i32(base + LABEL_LENGTH_OFFSET, label.len() as i32);
        buf.put_bytes(base + LABEL_OFFSET, label, 0, label.len());

        assert_eq!(reader.counter_status(1).unwrap(), CounterStatus::Allocated);
        assert_eq!(reader.counter_type_id(1).unwrap(), 102);
        assert_eq!(reader.counter_key(1).unwrap(), &key[..]);
        assert_eq!(reader.counter_label(1).unwrap(), "client-heartbeat");
    }
}
