//! E2E tests for start-up, shutdown and source failure handling.

mod helpers;

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cw_monitor::port::{self, PortSettings};
use cw_stream::{
    ControllerSettings, IoLineSource, MockLineSource, MonitorController, MonitorStatus,
    SourceError, StopOutcome, StreamError,
};
use helpers::{SESSION, TestHarness};

fn port_settings(port: &str) -> PortSettings {
    PortSettings {
        port: port.to_string(),
        baud: 115200,
        read_timeout: Duration::from_millis(50),
    }
}

/// A silent serial link opened with a read timeout: each read waits out the
/// timeout and fails with `TimedOut`, and never reaches end of input.
struct QuietTty {
    timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl Read for QuietTty {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        std::thread::sleep(self.timeout);
        Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"))
    }
}

impl Drop for QuietTty {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// After `stop()` returns the source has been released exactly once and is
/// never read again.
#[tokio::test]
async fn e2e_stop_releases_source_once() {
    let h = TestHarness::start(SESSION).await;
    h.wait_for(|t| t.len() == 3).await;

    assert_eq!(h.controller.stop().await, StopOutcome::Released);
    let reads = h.source.read_count();
    assert_eq!(h.source.close_count(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.source.read_count(), reads);
    assert_eq!(h.source.reads_after_close(), 0);
    assert_eq!(
        h.controller.status(),
        MonitorStatus::Stopped {
            reason: "stop requested".into()
        }
    );
}

/// `stop()` from several tasks at once: all return, one release.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_concurrent_stop_calls() {
    let source = MockLineSource::new();
    let controller = Arc::new(MonitorController::default());
    let handle = source.clone();
    controller.start(move || Ok(handle)).await.unwrap();

    let stops: Vec<_> = (0..8)
        .map(|_| {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.stop().await })
        })
        .collect();
    for stop in stops {
        assert_eq!(stop.await.unwrap(), StopOutcome::Released);
    }

    assert_eq!(source.close_count(), 1);
    assert_eq!(controller.stop().await, StopOutcome::Released);
}

/// `stop()` can be driven from a plain OS thread through a runtime handle.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_stop_from_foreign_thread() {
    let h = TestHarness::start(&[]).await;
    let controller = Arc::new(h.controller);
    let runtime = tokio::runtime::Handle::current();

    let remote = {
        let controller = Arc::clone(&controller);
        std::thread::spawn(move || runtime.block_on(controller.stop()))
    };
    let outcome = tokio::task::spawn_blocking(move || remote.join().unwrap())
        .await
        .unwrap();

    assert_eq!(outcome, StopOutcome::Released);
    assert!(controller.is_released());
    assert_eq!(h.source.close_count(), 1);
}

/// With a read timeout in place a quiet link is released promptly on stop.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_quiet_link_releases_on_stop() {
    let closed = Arc::new(AtomicBool::new(false));
    let tty = QuietTty {
        timeout: Duration::from_millis(50),
        closed: Arc::clone(&closed),
    };
    let controller = MonitorController::new(ControllerSettings {
        stop_timeout: Duration::from_millis(500),
        ..ControllerSettings::default()
    });
    controller
        .start(move || Ok(IoLineSource::new("/dev/ttyQUIET", tty)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(controller.stop().await, StopOutcome::Released);
    assert!(controller.is_released());
    assert!(closed.load(Ordering::SeqCst));
    assert!(controller.reader_stats().unwrap().idle_reads >= 1);
    assert!(controller.table().is_empty());
}

/// A disconnect stops the reader only; the table keeps its rows.
#[tokio::test]
async fn e2e_disconnect_surfaces_as_status() {
    let source = MockLineSource::with_lines(&SESSION[..6]).named("/dev/ttyACM0");
    source.push_disconnect();
    let h = TestHarness::start_with(source, ControllerSettings::default()).await;

    let status = h.wait_stopped().await;
    assert_eq!(
        status.to_string(),
        "Reader stopped: device disconnected: /dev/ttyACM0: device unplugged"
    );

    h.wait_for(|t| t.len() == 2).await;
    assert_eq!(h.controller.table().ids(), vec!["0x07F", "0x1A0"]);
    assert_eq!(h.source.close_count(), 1);
    assert_eq!(h.controller.stop().await, StopOutcome::Released);
}

/// Failing to open the port aborts the run before any loop starts.
#[tokio::test]
async fn e2e_open_failure_is_fatal() {
    let controller = MonitorController::default();
    let err = controller
        .start(|| port::open(&port_settings("/dev/cw-e2e-no-such-tty")))
        .await
        .unwrap_err();

    assert!(matches!(err, StreamError::Open(SourceError::Open { .. })));
    assert!(err.to_string().contains("/dev/cw-e2e-no-such-tty"));
    assert!(controller.status().is_stopped());
    assert!(controller.table().is_empty());
    assert_eq!(controller.stop().await, StopOutcome::Released);
}

/// A capture file replays through the real file-backed source and ends the
/// reader at end of file.
#[tokio::test]
async fn e2e_capture_file_replay() {
    let path = std::env::temp_dir().join(format!("cw-e2e-capture-{}.csv", std::process::id()));
    std::fs::write(&path, SESSION.join("\r\n")).unwrap();

    let controller = MonitorController::default();
    let settings = port_settings(path.to_str().unwrap());
    controller
        .start(move || port::open(&settings))
        .await
        .unwrap();

    let mut status = controller.watch_status();
    tokio::time::timeout(helpers::WAIT, status.wait_for(MonitorStatus::is_stopped))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        controller.status(),
        MonitorStatus::Stopped {
            reason: "end of stream".into()
        }
    );
    // Stopped is published only after the drain loop has applied every
    // queued frame.
    let table = controller.table();
    assert_eq!(table.ids(), vec!["0x07F", "0x1A0", "0x2C0"]);
    assert_eq!(table.get("0x07F").unwrap().timestamp_ms(), 12370);
    assert_eq!(table.get("0x07F").unwrap().interpretation(), "MotorCtrl ack, reg 0x90");

    std::fs::remove_file(&path).unwrap();
}
