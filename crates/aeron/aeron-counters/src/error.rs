use thiserror::Error;

/// Errors surfaced by the counters plane.
#[derive(Debug, Error)]
pub enum CountersError {
    #[error("values buffer length {length} is not a multiple of the value slot size {slot}")]
    MisalignedValuesBuffer { length: usize, slot: usize },

    #[error("counter id {counter_id} is out of range [0, {max_counter_id}]")]
    CounterIdOutOfRange { counter_id: i32, max_counter_id: i32 },
}
