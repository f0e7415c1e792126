//! Basic example: reading and writing a motor controller's registers
//!
//! This example demonstrates:
//! - Building a client with a repeating read window
//! - Driving the port from a polling thread
//! - Writes that are always visible to the next read
//! - Typed register accessors and register-addressed views

use std::{sync::Arc, time::Duration};

use i2c_device_client::prelude::*;

// ============ Register Layout ============
// A two-channel DC motor controller. Everything of interest lives in one
// 22-register block starting at 0x40, so a single repeating window keeps all
// of it mirrored.

const WINDOW_FIRST: u8 = 0x40;
const WINDOW_COUNT: usize = 22;

/// Motor 1 mode byte
const MOTOR1_MODE: u8 = 0x44;
/// Motor 1 power, signed percent
const MOTOR1_POWER: u8 = 0x45;
/// Motor 1 target encoder position (i32, big-endian)
const MOTOR1_TARGET: u8 = 0x40;
/// Motor 1 current encoder position (i32, big-endian)
const MOTOR1_ENCODER: u8 = 0x4C;

pub fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    // The simulated controller reports an encoder position of 1000
    let mut device = SimDevice::new();
    device.set_registers(MOTOR1_ENCODER, &1000i32.to_be_bytes());
    let port = Arc::new(SimulatedPort::new("motor controller", device));

    // The port services one transaction per cycle on its own thread
    let poller = port.spawn_polling(Duration::from_millis(2)).unwrap();

    let client = ClientBuilder::new(Arc::clone(&port))
        .address(0x02)
        .read_window(ReadWindow::repeat(WINDOW_FIRST, WINDOW_COUNT).unwrap())
        .build();
    client.arm();

    // ========== Reads ==========
    // Any sub-range of the window is served from the mirrored snapshot
    let encoder = client.read_i32_be(MOTOR1_ENCODER).unwrap();
    assert_eq!(encoder, 1000);

    let snapshot = client.read_timestamped(WINDOW_FIRST, WINDOW_COUNT).unwrap();
    let view = snapshot.view();
    assert_eq!(view.read_i32_be(MOTOR1_ENCODER).unwrap(), 1000);
    assert_eq!(view.read_i8(MOTOR1_POWER).unwrap(), 0);

    // ========== Writes ==========
    // Power the motor; the next read reflects it
    client.write8(MOTOR1_POWER, 0x64, false).unwrap();
    assert_eq!(client.read8(MOTOR1_POWER).unwrap(), 0x64);

    // Compose a multi-register write by register number
    client
        .write_with(MOTOR1_TARGET, 5, true, |payload| {
            payload.write_i32_be(MOTOR1_TARGET, 2880)?;
            payload.write_u8(MOTOR1_MODE, 0x02)
        })
        .unwrap();

    let target = client.read_i32_be(MOTOR1_TARGET).unwrap();
    assert_eq!(target, 2880);
    assert_eq!(client.read8(MOTOR1_MODE).unwrap(), 0x02);

    // ========== Device side ==========
    port.device(|dev| {
        assert_eq!(dev.register(MOTOR1_POWER), 0x64);
        assert!(dev.was_written(MOTOR1_MODE));
        assert!(!dev.was_written(MOTOR1_ENCODER));
    });

    // Reads outside a repeating window are a programming error
    assert!(matches!(
        client.read8(0x60),
        Err(ClientError::OutOfRange { .. })
    ));

    client.close();
    poller.stop();
}
