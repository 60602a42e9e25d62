//! Single-port packet generator. Builds a mempool of 60-byte frames,
//! pre-fills them once, and replays them from the free stack as fast as the
//! TX ring will take them. Grounded in `init_mempool`/`main` of
//! `original_source/src/app/ixy-pktgen.c`.

use std::process;
use std::time::{Duration, Instant};

use ixgbe::{Device, DeviceStats, TxStatus};
use ixy_memory::Mempool;

/// Frame size excluding the CRC, which the device appends itself.
const PKT_SIZE: u16 = 60;
const NUM_BUFS: u32 = 2048;

/// Allocates every buffer once, stamps in the template payload, and frees
/// them all back to the pool. Every later `alloc()` then returns a buffer
/// already carrying the template, matching the C original's two-pass init.
fn init_mempool() -> Mempool {
    let mut mempool = Mempool::create(NUM_BUFS, 0).unwrap_or_else(|e| {
        log::error!("failed to create packet-generator mempool: {}", e);
        process::exit(1);
    });

    let mut bufs = Vec::with_capacity(NUM_BUFS as usize);
    for _ in 0..NUM_BUFS {
        let mut buf = mempool.alloc().expect("freshly created pool must not be empty");
        buf.set_size(PKT_SIZE);
        unsafe {
            buf.payload_mut()[..PKT_SIZE as usize].fill(0xFF);
        }
        bufs.push(buf);
    }
    for buf in bufs {
        mempool.free(buf);
    }
    mempool
}

fn main() {
    env_logger::init();

    let pci_addr = match std::env::args().nth(1) {
        Some(addr) => addr,
        None => {
            eprintln!("Usage: ixy-pktgen <pci bus id>");
            process::exit(1);
        }
    };

    let mut mempool = init_mempool();

    let mut device = Device::open(&pci_addr, 1, 1).unwrap_or_else(|e| {
        log::error!("failed to open {}: {}", pci_addr, e);
        process::exit(1);
    });

    let mut stats = DeviceStats::new();
    let mut stats_old = DeviceStats::new();
    let mut last_stats_printed = Instant::now();

    let mut counter: u64 = 0;
    loop {
        // We cannot immediately recycle a buffer the device might still be
        // reading from a prior send, so every iteration draws a fresh one.
        let mut buf = match mempool.alloc() {
            Some(buf) => buf,
            None => {
                log::warn!("packet-generator mempool exhausted, waiting for TX to drain");
                continue;
            }
        };

        loop {
            match device.tx_packet(0, buf) {
                Ok(TxStatus::Enqueued) => break,
                Ok(TxStatus::Full(returned)) => {
                    buf = returned;
                    continue;
                }
                Err(e) => {
                    log::error!("fatal error transmitting on {}: {}", pci_addr, e);
                    process::exit(1);
                }
            }
        }

        // Checking the clock on every packet would cost more than it's
        // worth; sampling every 4096 iterations is cheap and accurate
        // enough for a once-a-second stats line.
        counter = counter.wrapping_add(1);
        if counter & 0xFFF == 0 {
            let now = Instant::now();
            if now.duration_since(last_stats_printed) > Duration::from_secs(1) {
                device.read_stats(&mut stats);
                stats.print_diff(&stats_old, &pci_addr, now.duration_since(last_stats_printed));
                stats_old = stats;
                last_stats_printed = now;
            }
        }
    }
}
