//! Drives a `ClientConductor` in invoker mode against an in-process mock
//! driver: a background thread that reads commands off the to-driver ring
//! and replies on the to-clients broadcast buffer the way a real media
//! driver would. This is scaffolding for the demo only; production code
//! talks to a real driver process over the mapped CnC file instead.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use aeron_buffers::trailer::{broadcast_bytes_for_capacity, mpsc_bytes_for_capacity};
use aeron_buffers::{BroadcastTransmitter, ManyToOneRingBuffer};
use aeron_client::{ClientConductor, CncLengths, Context, Poll};
use aeron_driver_proto::command;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn cnc_lengths() -> CncLengths {
    CncLengths {
        to_driver: mpsc_bytes_for_capacity(1 << 12),
        to_clients: broadcast_bytes_for_capacity(1 << 12),
        counter_metadata: 16 * aeron_counters::METADATA_RECORD_LENGTH,
        counter_values: 16 * aeron_counters::VALUE_LENGTH,
        error_log: 4096,
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO")))
        .init();

    let mut context = Context::new().with_driver_timeout_ms(5_000);
    context.use_conductor_agent_invoker = true;
    let conductor = ClientConductor::new_for_test(context, cnc_lengths())?;

    let running = Arc::new(AtomicBool::new(true));
    let driver = spawn_mock_driver(&conductor, Arc::clone(&running));

    info!("AERON-CLIENT-DEMO: requesting a publication and a subscription from the mock driver");
    let pub_handle = conductor.async_add_publication("aeron:udp?endpoint=localhost:24567", 101)?;
    let sub_handle = conductor.async_add_subscription("aeron:udp?endpoint=localhost:24567", 101, None, None)?;

    let publication = poll_until_ready(&conductor, pub_handle, |c, h| c.poll_publication(h))?;
    info!(
        "AERON-CLIENT-DEMO: publication ready (session_id={}, stream_id={})",
        publication.session_id, publication.stream_id
    );

    let subscription = poll_until_ready(&conductor, sub_handle, |c, h| c.poll_subscription(h))?;
    info!(
        "AERON-CLIENT-DEMO: subscription ready (stream_id={})",
        subscription.stream_id
    );

    for _ in 0..5 {
        conductor.do_work()?;
        thread::sleep(Duration::from_millis(50));
    }

    conductor.close_publication(publication)?;
    conductor.close_subscription(subscription)?;
    conductor.on_close();

    running.store(false, Ordering::Release);
    driver.join().expect("mock driver thread panicked");
    Ok(())
}

fn poll_until_ready<T, R>(
    conductor: &ClientConductor,
    handle: T,
    mut poll: impl FnMut(&ClientConductor, T) -> Result<Poll<R>, aeron_client::AeronError>,
) -> anyhow::Result<R>
where
    T: Copy,
{
    loop {
        conductor.do_work()?;
        match poll(conductor, handle)? {
            Poll::Ready(resource) => return Ok(resource),
            Poll::Pending => thread::sleep(Duration::from_millis(10)),
        }
    }
}

/// Plays the driver's role for this demo: drains `ADD_PUBLICATION` and
/// `ADD_SUBSCRIPTION` commands off the to-driver ring and answers each with
/// the matching `ON_*_READY` event, mapping a throwaway log-buffer fixture
/// file for every publication it grants.
fn spawn_mock_driver(conductor: &ClientConductor, running: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    let to_driver = conductor.test_to_driver_ring();
    let to_clients = conductor.test_driver_transmitter().expect("to-clients buffer is well-formed");
    let log_dir = tempfile::tempdir().expect("temp dir for fixture log files");

    thread::Builder::new()
        .name("mock-driver".into())
        .spawn(move || mock_driver_loop(to_driver, to_clients, log_dir, running))
        .expect("failed to spawn mock driver thread")
}

fn mock_driver_loop(
    to_driver: ManyToOneRingBuffer,
    to_clients: BroadcastTransmitter,
    log_dir: tempfile::TempDir,
    running: Arc<AtomicBool>,
) {
    let mut next_registration_id = 1_000i64;
    while running.load(Ordering::Acquire) {
        to_driver.read(10, |type_id, payload| {
            handle_command(type_id, payload, &to_clients, log_dir.path(), &mut next_registration_id);
        });
        thread::sleep(Duration::from_millis(5));
    }
}

fn handle_command(
    type_id: i32,
    payload: &[u8],
    to_clients: &BroadcastTransmitter,
    log_dir: &Path,
    next_registration_id: &mut i64,
) {
    let correlation_id = i64::from_le_bytes(payload[8..16].try_into().unwrap());
    let registration_id = *next_registration_id;
    *next_registration_id += 1;

    match type_id {
        command::ADD_PUBLICATION => {
            let stream_id = i32::from_le_bytes(payload[16..20].try_into().unwrap());
            let log_path = write_fixture_log_file(log_dir, registration_id);
            reply_publication_ready(to_clients, correlation_id, registration_id, stream_id, &log_path);
        }
        command::ADD_EXCLUSIVE_PUBLICATION => {
            let stream_id = i32::from_le_bytes(payload[16..20].try_into().unwrap());
            let log_path = write_fixture_log_file(log_dir, registration_id);
            reply_exclusive_publication_ready(to_clients, correlation_id, registration_id, stream_id, &log_path);
        }
        command::ADD_SUBSCRIPTION => {
            reply_subscription_ready(to_clients, correlation_id);
        }
        command::CLIENT_KEEPALIVE => {}
        other => warn!("AERON-CLIENT-DEMO (mock driver): unhandled command type_id={other}"),
    }
}

fn write_fixture_log_file(dir: &Path, registration_id: i64) -> std::path::PathBuf {
    let path = dir.join(format!("pub-{registration_id}.log"));
    let term_length = aeron_log_buffer::TERM_MIN_LENGTH as usize;
    let total = term_length * 3 + aeron_log_buffer::META_DATA_LENGTH;
    std::fs::write(&path, vec![0u8; total]).expect("failed to write fixture log file");
    path
}

fn reply_publication_ready(
    to_clients: &BroadcastTransmitter,
    correlation_id: i64,
    registration_id: i64,
    stream_id: i32,
    log_path: &Path,
) {
    let payload = publication_ready_payload(correlation_id, registration_id, stream_id, log_path);
    transmit(to_clients, aeron_driver_proto::event::ON_PUBLICATION_READY, &payload);
}

fn reply_exclusive_publication_ready(
    to_clients: &BroadcastTransmitter,
    correlation_id: i64,
    registration_id: i64,
    stream_id: i32,
    log_path: &Path,
) {
    let payload = publication_ready_payload(correlation_id, registration_id, stream_id, log_path);
    transmit(to_clients, aeron_driver_proto::event::ON_EXCLUSIVE_PUBLICATION_READY, &payload);
}

fn publication_ready_payload(correlation_id: i64, registration_id: i64, stream_id: i32, log_path: &Path) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&correlation_id.to_le_bytes());
    payload.extend_from_slice(&registration_id.to_le_bytes());
    payload.extend_from_slice(&stream_id.to_le_bytes());
    payload.extend_from_slice(&(registration_id as i32).to_le_bytes()); // session_id
    payload.extend_from_slice(&0i32.to_le_bytes()); // position_limit_counter_id
    payload.extend_from_slice(&0i32.to_le_bytes()); // channel_status_indicator_id
    let name = log_path.to_string_lossy();
    payload.extend_from_slice(&(name.len() as i32).to_le_bytes());
    payload.extend_from_slice(name.as_bytes());
    payload
}

fn reply_subscription_ready(to_clients: &BroadcastTransmitter, correlation_id: i64) {
    let mut payload = Vec::new();
    payload.extend_from_slice(&correlation_id.to_le_bytes());
    payload.extend_from_slice(&0i32.to_le_bytes()); // channel_status_indicator_id
    transmit(to_clients, aeron_driver_proto::event::ON_SUBSCRIPTION_READY, &payload);
}

fn transmit(to_clients: &BroadcastTransmitter, type_id: i32, payload: &[u8]) {
    if let Err(err) = to_clients.transmit(type_id, payload) {
        warn!("AERON-CLIENT-DEMO (mock driver): failed to transmit event {type_id}: {err}");
    }
}
