//! CanWatch monitor: live table of the latest frame per CAN identifier,
//! read from a serial device streaming CSV records.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use cw_monitor::config::{DEFAULT_CONFIG_PATH, MonitorConfig};
use cw_monitor::presenter::{self, Presenter};
use cw_monitor::{logging, port};
use cw_stream::{MonitorController, StopOutcome};

/// Grace period for blocking tasks once `main` returns. A reader parked in
/// a read on a silent port is abandoned after this.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(run());
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

async fn run() -> anyhow::Result<()> {
    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = MonitorConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    logging::init(config.log_format);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = %config.port,
        "cw-monitor starting"
    );

    // ── Open port and start the pipeline ────────────────────────
    let controller = Arc::new(MonitorController::new(config.controller_settings()));
    let port_settings = config.port_settings();
    controller
        .start(move || port::open(&port_settings))
        .await
        .with_context(|| format!("failed to open {}", config.port))?;

    // ── Refresh until interrupted ───────────────────────────────
    let baud = port::is_device(&config.port).then_some(config.baud);
    let mut presenter = Presenter::new(config.output, baud);
    tokio::select! {
        result = presenter::run(
            &controller,
            &mut presenter,
            config.refresh_interval(),
            config.exit_when_stopped,
            std::io::stdout(),
        ) => {
            result.context("failed to write to stdout")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    match controller.stop().await {
        StopOutcome::Released => tracing::info!("cw-monitor stopped"),
        StopOutcome::TimedOut => {
            tracing::warn!("port still busy after stop timeout; exiting anyway");
        }
    }

    if let Some(stats) = controller.reader_stats() {
        tracing::info!(
            lines = stats.lines_read,
            frames = stats.frames_accepted,
            rejected = stats.lines_rejected,
            rows = controller.table().len(),
            "session summary"
        );
    }

    Ok(())
}
