//! Concurrent example: sharing one client between threads
//!
//! This example demonstrates:
//! - Any number of threads calling into the same client
//! - Whole writes reaching the device without interleaving
//! - Each thread reading back its own write
//! - Disarming wakes every blocked caller

use std::{sync::Arc, thread, time::Duration};

use i2c_device_client::{client::sim::Transaction, prelude::*};

/// Per-thread scratch registers; each worker owns four
const SCRATCH_BASE: u8 = 0x60;
const WORKERS: u8 = 4;
const ROUNDS: u8 = 5;

pub fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let port = Arc::new(SimulatedPort::new("shared device", SimDevice::new()));
    let poller = port.spawn_polling(Duration::from_millis(1)).unwrap();

    let client = Arc::new(
        ClientBuilder::new(Arc::clone(&port))
            .address(0x02)
            .wait_timeout(Duration::from_secs(5))
            .build(),
    );
    client.arm();

    // ========== Writers and readers ==========
    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                let first = SCRATCH_BASE + worker * 4;
                for round in 0..ROUNDS {
                    let fill = (worker << 4) | round;
                    client.write(first, &[fill; 4], false).unwrap();
                    // Each read is served by a one-shot window over exactly these registers
                    let data = client.read(first, 4).unwrap();
                    assert_eq!(data.as_slice(), &[fill; 4]);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // Every write reached the device whole
    port.device(|dev| {
        let writes: Vec<_> = dev
            .transactions()
            .iter()
            .filter_map(|t| match t {
                Transaction::Write { data, .. } => Some(data.clone()),
                Transaction::Read { .. } => None,
            })
            .collect();
        assert_eq!(writes.len(), (WORKERS * ROUNDS) as usize);
        for data in &writes {
            assert!(data.iter().all(|b| *b == data[0]));
        }
    });

    // ========== Cancellation ==========
    // With polling stopped a read can never complete; disarming releases it
    poller.stop();
    let blocked = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.read(0x10, 2))
    };
    thread::sleep(Duration::from_millis(20));
    client.disarm();
    assert_eq!(blocked.join().unwrap(), Err(ClientError::Cancelled));
}
