//! Heartbeat example: keeping a watchdog-guarded device alive
//!
//! Some controllers stop their motors when the bus has been quiet for a while.
//! This example demonstrates:
//! - A keep-alive read window that never disturbs the client's own reads
//! - Re-reading the last window once the port is in read mode
//! - Re-writing the last write instead

use std::{sync::Arc, thread, time::Duration};

use i2c_device_client::{client::sim::Transaction, prelude::*};

/// Status block the controller's watchdog counts as traffic
const STATUS_FIRST: u8 = 0x40;
const STATUS_COUNT: usize = 22;
/// Register bumped by the controller on every bus read
const SAMPLE_COUNTER: u8 = 0x41;
/// Motor power register
const POWER: u8 = 0x45;

const INTERVAL: Duration = Duration::from_millis(20);

fn reads(port: &SimulatedPort) -> usize {
    port.device(|dev| dev.read_transactions())
}

fn writes_to(port: &SimulatedPort, register: u8) -> usize {
    port.device(|dev| {
        dev.transactions()
            .iter()
            .filter(|t| matches!(t, Transaction::Write { first_register: r, .. } if *r == register))
            .count()
    })
}

pub fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let port = Arc::new(SimulatedPort::new(
        "legacy motor controller",
        SimDevice::new().with_tick_register(SAMPLE_COUNTER),
    ));
    let poller = port.spawn_polling(Duration::from_millis(2)).unwrap();

    // ========== Keep-alive reads ==========
    // No read window of our own; the heartbeat reads the status block
    let client = ClientBuilder::new(Arc::clone(&port))
        .address(0x02)
        .heartbeat_interval(INTERVAL)
        .heartbeat_action(HeartbeatAction {
            reread_last: true,
            rewrite_last: false,
            heartbeat_window: Some(ReadWindow::once(STATUS_FIRST, STATUS_COUNT).unwrap()),
        })
        .logging(true)
        .logging_tag("legacy")
        .build();
    client.arm();

    thread::sleep(INTERVAL * 6);
    let idle_reads = reads(&port);
    assert!(idle_reads >= 2, "expected keep-alive reads, saw {idle_reads}");
    assert_eq!(client.read_window(), None);

    // A read of our own still works normally in between
    let before = client.read8(SAMPLE_COUNTER).unwrap();
    let after = client.read8(SAMPLE_COUNTER).unwrap();
    assert_ne!(before, after);

    // ========== Keep-alive writes ==========
    client.set_heartbeat_write(INTERVAL);
    client.write8(POWER, 0x32, true).unwrap();
    thread::sleep(INTERVAL * 6);
    let power_writes = writes_to(&port, POWER);
    assert!(power_writes >= 2, "expected rewrites, saw {power_writes}");
    assert_eq!(port.device(|dev| dev.register(POWER)), 0x32);

    // ========== Disabled ==========
    client.set_heartbeat_interval(Duration::ZERO);
    thread::sleep(INTERVAL * 2);
    let settled = port.device(|dev| dev.transactions().len());
    thread::sleep(INTERVAL * 4);
    assert_eq!(port.device(|dev| dev.transactions().len()), settled);

    client.close();
    poller.stop();
}
