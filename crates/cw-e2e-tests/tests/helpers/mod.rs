//! Shared test harness for E2E integration tests.
//!
//! Wires a scripted `MockLineSource` into a real `MonitorController`, so the
//! reader thread, frame channel, drain task and table all run for real.

#![allow(dead_code)]

use std::time::Duration;

use cw_stream::{AggregationTable, ControllerSettings, MockLineSource, MonitorController, MonitorStatus};

/// Upper bound for any wait in the suite.
pub const WAIT: Duration = Duration::from_secs(5);

/// A recorded serial session, header and boot banner included.
pub const SESSION: &[&str] = &[
    "=================================",
    "  Enhanced CAN Bus Listener v2.0",
    "Initializing MCP2515... SUCCESS!",
    "timestamp,id,dlc,data0,data1,data2,data3,data4,data5,data6,data7,interpretation",
    "12345,0x07F,8,0x11,0x22,0x33,0x44,0x55,0x66,0x77,0x88,MotorCtrl reg 0x90 data 0x01 0x02",
    "12350,0x1A0,8,0x01,0x02,0x03,0x04,0x05,0x06,0x07,0x08,EngineRPM 1500",
    "12351,0x1A0,garbage,0,0,0,0,0,0,0,0",
    "12360,0x2C0,3,0xDE,0xAD,0xBE,0x00,0x00,0x00,0x00,0x00",
    "12370,0x07F,2,0x90,0x01,0x00,0x00,0x00,0x00,0x00,0x00,\"MotorCtrl ack, reg 0x90\"",
    "12371,0x07F,8,0x11",
];

/// Controller running against a mock source, plus a handle to inspect it.
pub struct TestHarness {
    pub controller: MonitorController,
    pub source: MockLineSource,
}

impl TestHarness {
    /// Start a controller over the given lines. The mock idles once drained.
    pub async fn start(lines: &[&str]) -> Self {
        Self::start_with(MockLineSource::with_lines(lines.iter().copied()), ControllerSettings::default()).await
    }

    /// Start a controller over a prepared mock.
    pub async fn start_with(source: MockLineSource, settings: ControllerSettings) -> Self {
        let controller = MonitorController::new(settings);
        let handle = source.clone();
        controller
            .start(move || Ok(handle))
            .await
            .expect("mock source always opens");
        Self { controller, source }
    }

    /// Wait until `check` holds for the table.
    pub async fn wait_for(&self, mut check: impl FnMut(&AggregationTable) -> bool) {
        let table = self.controller.table();
        tokio::time::timeout(WAIT, async {
            while !check(&table) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("table did not reach the expected state in time");
    }

    /// Wait until the reader reports it has stopped.
    pub async fn wait_stopped(&self) -> MonitorStatus {
        let mut status = self.controller.watch_status();
        tokio::time::timeout(WAIT, status.wait_for(MonitorStatus::is_stopped))
            .await
            .expect("reader did not stop in time")
            .expect("status sender alive")
            .clone()
    }
}
