//! Two-port packet forwarder: polls RX queue 0 of the first device and
//! posts whatever it receives to TX queue 0 of the second. If both PCI
//! addresses are equal, a single device is opened and reused for both ends
//! (a device cannot be initialized twice), which turns the tool into an
//! echo server. Grounded in `main` of
//! `original_source/src/app/ixy-cpp-fwd.cpp`.

use std::process;
use std::time::{Duration, Instant};

use ixgbe::{Device, DeviceStats};

fn open_or_exit(pci_addr: &str) -> Device {
    Device::open(pci_addr, 1, 1).unwrap_or_else(|e| {
        log::error!("failed to open {}: {}", pci_addr, e);
        process::exit(1);
    })
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (addr1, addr2) = match (args.next(), args.next()) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            eprintln!("ixy-fwd forwards packets between two ports.");
            eprintln!("Usage: ixy-fwd <pci bus id 1> <pci bus id 2>");
            process::exit(1);
        }
    };

    let echo = addr1 == addr2;
    let mut devices = if echo {
        log::info!("{} given twice, running as an echo server", addr1);
        vec![open_or_exit(&addr1)]
    } else {
        vec![open_or_exit(&addr1), open_or_exit(&addr2)]
    };

    let mut stats1 = DeviceStats::new();
    let mut stats1_old = DeviceStats::new();
    let mut stats2 = DeviceStats::new();
    let mut stats2_old = DeviceStats::new();
    let mut last_stats_printed = Instant::now();

    let mut counter: u64 = 0;
    loop {
        if echo {
            let dev = &mut devices[0];
            match dev.rx_packet(0) {
                Ok(Some(buf)) => {
                    if let Err(e) = dev.tx_packet(0, buf) {
                        log::error!("fatal error transmitting on {}: {}", addr1, e);
                        process::exit(1);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("fatal error receiving on {}: {}", addr1, e);
                    process::exit(1);
                }
            }
        } else {
            let (rx_half, tx_half) = devices.split_at_mut(1);
            match rx_half[0].rx_packet(0) {
                Ok(Some(buf)) => {
                    // A full ring drops the packet here rather than retrying,
                    // same as the original forwarder.
                    if let Err(e) = tx_half[0].tx_packet(0, buf) {
                        log::error!("fatal error transmitting on {}: {}", addr2, e);
                        process::exit(1);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("fatal error receiving on {}: {}", addr1, e);
                    process::exit(1);
                }
            }
        }

        // Don't poll the clock unnecessarily; same sampling cadence as the
        // packet generator.
        counter = counter.wrapping_add(1);
        if counter & 0xFFF == 0 {
            let now = Instant::now();
            let elapsed = now.duration_since(last_stats_printed);
            if elapsed > Duration::from_secs(1) {
                devices[0].read_stats(&mut stats1);
                stats1.print_diff(&stats1_old, &addr1, elapsed);
                stats1_old = stats1;

                if !echo {
                    devices[1].read_stats(&mut stats2);
                    stats2.print_diff(&stats2_old, &addr2, elapsed);
                    stats2_old = stats2;
                }
                last_stats_printed = now;
            }
        }
    }
}
