//! Cross-process smoke test for the broadcast buffer over a real mmap file.
//!
//! Mirrors `lithos-icc`'s two-process mmap test: a writer
//! process transmits events and a reader process, opened concurrently,
//! consumes them. Here the writer plays the role of the driver's broadcast
//! producer and the reader plays a client's event dispatcher drain loop.

use aeron_buffers::{AtomicBuffer, BroadcastReceiver, BroadcastTransmitter};
use std::env;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const ENV_ROLE: &str = "AERON_BUFFERS_E2E_ROLE";
const ROLE_WRITER: &str = "writer";
const ROLE_READER: &str = "reader";
const EVENT_COUNT: i32 = 20_000;
const CAPACITY: usize = 1 << 16;

fn test_path() -> String {
    format!("/tmp/aeron_buffers_e2e_{}", std::process::id())
}

fn run_writer(path: &str) {
    use aeron_mmap::MmapFileMut;

    let mut mm = MmapFileMut::create_rw(path, (CAPACITY + 64) as u64).unwrap();
    let buf = AtomicBuffer::wrap(mm.as_mut_slice());
    let tx = BroadcastTransmitter::wrap(buf, CAPACITY).unwrap();

    for i in 0..EVENT_COUNT {
        let payload = i.to_le_bytes();
        tx.transmit(1, &payload).unwrap();
        if i % 500 == 0 {
            std::thread::sleep(Duration::from_micros(50));
        }
    }
}

fn run_reader(path: &str) {
    use aeron_mmap::MmapFile;

    let open_deadline = Instant::now() + Duration::from_secs(5);
    let mm = loop {
        match MmapFile::open_ro(path) {
            Ok(mm) if mm.len() == CAPACITY + 64 => break mm,
            _ if Instant::now() < open_deadline => std::thread::sleep(Duration::from_millis(1)),
            Err(e) => panic!("reader failed to open: {e}"),
            _ => std::thread::sleep(Duration::from_millis(1)),
        }
    };

    let buf = unsafe { AtomicBuffer::from_raw(mm.as_ptr() as *mut u8, mm.len()) };
    let mut rx = BroadcastReceiver::wrap(buf, CAPACITY).unwrap();

    let read_deadline = Instant::now() + Duration::from_secs(10);
    let mut events_read = 0usize;
    let mut idle_polls = 0u32;

    while Instant::now() < read_deadline {
        let n = rx.poll(usize::MAX, |_ev| events_read += 1);
        if n == 0 {
            idle_polls += 1;
            if idle_polls > 5_000 && events_read > 0 {
                break;
            }
            std::thread::sleep(Duration::from_micros(200));
        } else {
            idle_polls = 0;
        }
    }

    assert!(events_read > 0, "reader observed no events");
    // Keep the mmap alive for the duration of the assertions above.
    let _ = mm.len();
}

#[test]
fn e2e_two_process_broadcast_over_mmap() {
    if let Ok(role) = env::var(ENV_ROLE) {
        let path = env::var("AERON_BUFFERS_E2E_PATH").expect("path not set");
        match role.as_str() {
            ROLE_WRITER => run_writer(&path),
            ROLE_READER => run_reader(&path),
            other => panic!("unknown role: {other}"),
        }
        return;
    }

    let path = test_path();
    let exe = env::current_exe().unwrap();

    let mut writer = Command::new(&exe)
        .arg("--exact")
        .arg("e2e_two_process_broadcast_over_mmap")
        .env(ENV_ROLE, ROLE_WRITER)
        .env("AERON_BUFFERS_E2E_PATH", &path)
        .stderr(Stdio::inherit())
        .spawn()
        .unwrap();

    std::thread::sleep(Duration::from_millis(10));

    let mut reader = Command::new(&exe)
        .arg("--exact")
        .arg("e2e_two_process_broadcast_over_mmap")
        .env(ENV_ROLE, ROLE_READER)
        .env("AERON_BUFFERS_E2E_PATH", &path)
        .stderr(Stdio::inherit())
        .spawn()
        .unwrap();

    let writer_status = writer.wait().unwrap();
    let reader_status = reader.wait().unwrap();
    let _ = std::fs::remove_file(&path);

    assert!(writer_status.success());
    assert!(reader_status.success());
}
