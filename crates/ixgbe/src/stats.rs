//! Packet/byte counters and the Mbit/s + Mpps delta printer, adapted from
//! `ixy::device_stats` in `stats.hpp`/`stats.cpp`. The original reads
//! `CLOCK_MONOTONIC` by hand; here that's just `std::time::Instant`.

use std::time::Duration;

/// Running totals since the last reset-on-read of the hardware counters.
/// `Device::read_stats` adds into these; it never overwrites them, matching
/// the original's `stats->rx_pkts += rx_pkts` accumulation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceStats {
    pub rx_pkts: u64,
    pub tx_pkts: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl DeviceStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute totals since process start, as `print_stats` in the original.
    pub fn print_totals(&self, pci_addr: &str) {
        println!("[{}] RX: {} bytes {} packets", pci_addr, self.rx_bytes, self.rx_pkts);
        println!("[{}] TX: {} bytes {} packets", pci_addr, self.tx_bytes, self.tx_pkts);
    }

    /// Mbit/s and Mpps since `previous` was captured, as `print_stats_diff`.
    /// Includes the 20 bytes/packet of preamble, SFD and inter-frame gap
    /// that never hit the wire counters, so small packets still show up
    /// near line rate instead of looking artificially slow.
    pub fn print_diff(&self, previous: &DeviceStats, pci_addr: &str, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let rx_mpps = diff_mpps(self.rx_pkts, previous.rx_pkts, secs);
        let tx_mpps = diff_mpps(self.tx_pkts, previous.tx_pkts, secs);
        let rx_mbit = diff_mbit(self.rx_bytes, previous.rx_bytes, rx_mpps);
        let tx_mbit = diff_mbit(self.tx_bytes, previous.tx_bytes, tx_mpps);
        println!("[{}] RX: {} Mbit/s {:.2} Mpps", pci_addr, rx_mbit, rx_mpps);
        println!("[{}] TX: {} Mbit/s {:.2} Mpps", pci_addr, tx_mbit, tx_mpps);
    }
}

fn diff_mpps(pkts_new: u64, pkts_old: u64, secs: f64) -> f64 {
    if secs <= 0.0 {
        return 0.0;
    }
    (pkts_new.wrapping_sub(pkts_old)) as f64 / 1_000_000.0 / secs
}

fn diff_mbit(bytes_new: u64, bytes_old: u64, mpps: f64) -> u32 {
    ((bytes_new.wrapping_sub(bytes_old)) as f64 / 1_000_000.0 * 8.0 + mpps * 20.0 * 8.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_is_zero_for_unchanged_counters() {
        let a = DeviceStats { rx_pkts: 10, tx_pkts: 10, rx_bytes: 600, tx_bytes: 600 };
        let b = a;
        assert_eq!(diff_mpps(b.rx_pkts, a.rx_pkts, 1.0), 0.0);
        assert_eq!(diff_mbit(b.rx_bytes, a.rx_bytes, 0.0), 0);
    }

    #[test]
    fn mpps_reflects_packet_rate() {
        // 1,000,000 packets over 1 second is exactly 1 Mpps.
        let mpps = diff_mpps(1_000_000, 0, 1.0);
        assert!((mpps - 1.0).abs() < 1e-9);
    }
}
