//! Per-queue driver state: the descriptor ring's DMA memory plus the shadow
//! bookkeeping the hardware doesn't know about (which buffer sits behind
//! which descriptor, and the read/write/clean indices). Grounded in
//! `ixgbe_rx_queue`/`ixgbe_tx_queue` and the `rx_packet`/`tx_packet`/
//! `start_rx_queue`/`init_tx` bodies of the original driver, with
//! `intel_ethernet`'s typed volatile descriptor accessors standing in for
//! the original's raw `volatile union ixgbe_adv_*_desc`.

use intel_ethernet::descriptors::{AdvancedRxDescriptor, AdvancedTxDescriptor, RxDescriptor, TxDescriptor};
use ixy_memory::dma::allocate_dma_hugepage;
use ixy_memory::{DmaRegion, Mempool, PacketBuffer};

use crate::error::IxgbeError;

/// Default ring length for both directions. Must stay a power of two:
/// queue indices wrap with a bitmask, not a modulo.
pub const NUM_RX_QUEUE_ENTRIES: u16 = 1024;
pub const NUM_TX_QUEUE_ENTRIES: u16 = 1024;

/// Default mempool sizing for an RX queue's buffers. Sized well above the
/// ring length so a forwarding application has room for packets in flight
/// on the TX side of another queue, not just the ones posted to this ring.
pub const DEFAULT_RX_MEMPOOL_ENTRIES: u32 = 4096;
pub const DEFAULT_RX_MEMPOOL_ENTRY_SIZE: usize = 2048;

/// Advances `index` by one and wraps at `len`. `len` must be a power of two;
/// that's checked once at construction, never again on the hot path.
#[inline]
fn inc_and_wrap(index: u16, len: u16) -> u16 {
    index.wrapping_add(1) & (len - 1)
}

fn check_power_of_two(num_entries: u16, what: &str) -> Result<(), IxgbeError> {
    if !num_entries.is_power_of_two() {
        return Err(IxgbeError::Config(format!(
            "{} queue entry count {} is not a power of two",
            what, num_entries
        )));
    }
    Ok(())
}

/// Receive-side descriptor ring, the mempool its buffers are drawn from, and
/// the shadow table mapping each ring slot back to the buffer currently
/// posted there.
pub struct RxQueue {
    region: DmaRegion,
    ring_bytes: usize,
    num_entries: u16,
    rx_index: u16,
    mempool: Box<Mempool>,
    buffers: Vec<Option<PacketBuffer>>,
}

// Touched only through explicit volatile descriptor accesses; moving a
// queue to another thread is fine, sharing one without synchronization
// is not (and this driver never does either).
unsafe impl Send for RxQueue {}

impl RxQueue {
    /// Allocates the ring's DMA memory and a dedicated mempool, and poisons
    /// the ring with `0xFF` so a premature DMA activation (before the
    /// device is told where the ring lives) reads garbage rather than a
    /// plausible zeroed descriptor.
    pub fn new(num_entries: u16) -> Result<Self, IxgbeError> {
        check_power_of_two(num_entries, "rx")?;

        let ring_bytes = num_entries as usize * std::mem::size_of::<AdvancedRxDescriptor>();
        let region = allocate_dma_hugepage(ring_bytes)?;
        unsafe {
            std::ptr::write_bytes(region.virtual_addr as *mut u8, 0xFF, ring_bytes);
        }

        let mempool = Box::new(Mempool::create(DEFAULT_RX_MEMPOOL_ENTRIES, DEFAULT_RX_MEMPOOL_ENTRY_SIZE)?);
        let mut buffers = Vec::with_capacity(num_entries as usize);
        buffers.resize_with(num_entries as usize, || None);

        Ok(RxQueue {
            region,
            ring_bytes,
            num_entries,
            rx_index: 0,
            mempool,
            buffers,
        })
    }

    pub fn ring_physical_addr(&self) -> u64 {
        self.region.physical_addr
    }

    pub fn ring_bytes(&self) -> usize {
        self.ring_bytes
    }

    pub fn num_entries(&self) -> u16 {
        self.num_entries
    }

    fn descriptor_mut(&self, index: u16) -> &mut AdvancedRxDescriptor {
        unsafe {
            &mut *(self.region.virtual_addr as *mut AdvancedRxDescriptor).add(index as usize)
        }
    }

    /// Draws one buffer per descriptor from the mempool and posts it, so the
    /// ring starts out entirely owned by the device. Must run after the
    /// ring's base address/length registers are programmed but before
    /// `RXDCTL.ENABLE` is set, matching `start_rx_queue` in the original.
    pub fn populate(&mut self) -> Result<(), IxgbeError> {
        for i in 0..self.num_entries {
            let buf = self
                .mempool
                .alloc()
                .ok_or_else(|| IxgbeError::Resource("rx queue mempool exhausted at start-up".into()))?;
            let desc = self.descriptor_mut(i);
            desc.init(buf.payload_physical_addr());
            self.buffers[i as usize] = Some(buf);
        }
        Ok(())
    }

    /// Polls the descriptor at `rx_index`. If the device has marked it done,
    /// swaps in a fresh buffer from the mempool, advances `rx_index`, and
    /// returns the received buffer together with the RDT value the caller
    /// should publish to the device. The RDT value is one behind the new
    /// `rx_index`, not equal to it: RDT == RDH would mean "queue full", not
    /// "queue empty", if the driver ever caught up with the hardware.
    pub fn poll(&mut self) -> Result<Option<(PacketBuffer, u16)>, IxgbeError> {
        let rx_index = self.rx_index;
        let desc = self.descriptor_mut(rx_index);
        if !desc.descriptor_done() {
            return Ok(None);
        }
        if !desc.end_of_packet() {
            return Err(IxgbeError::Config(
                "multi-segment packets are not supported - increase buffer size or decrease MTU".into(),
            ));
        }

        let length = desc.length();
        let mut buf = self.buffers[rx_index as usize]
            .take()
            .expect("descriptor marked done but its ring slot holds no buffer");
        buf.set_size(length as u16);

        let new_buf = self
            .mempool
            .alloc()
            .ok_or_else(|| IxgbeError::Resource("rx mempool exhausted, dropping capacity to refill the ring".into()))?;
        desc.set_packet_address(new_buf.payload_physical_addr());
        desc.reset_status();
        self.buffers[rx_index as usize] = Some(new_buf);

        let new_rx_index = inc_and_wrap(rx_index, self.num_entries);
        self.rx_index = new_rx_index;
        Ok(Some((buf, rx_index)))
    }
}

/// Transmit-side descriptor ring and the shadow table used to reclaim
/// buffers once the device reports a descriptor as sent.
pub struct TxQueue {
    region: DmaRegion,
    ring_bytes: usize,
    num_entries: u16,
    clean_index: u16,
    tx_index: u16,
    buffers: Vec<Option<PacketBuffer>>,
}

unsafe impl Send for TxQueue {}

impl TxQueue {
    pub fn new(num_entries: u16) -> Result<Self, IxgbeError> {
        check_power_of_two(num_entries, "tx")?;

        let ring_bytes = num_entries as usize * std::mem::size_of::<AdvancedTxDescriptor>();
        let region = allocate_dma_hugepage(ring_bytes)?;
        unsafe {
            std::ptr::write_bytes(region.virtual_addr as *mut u8, 0xFF, ring_bytes);
        }

        let mut buffers = Vec::with_capacity(num_entries as usize);
        buffers.resize_with(num_entries as usize, || None);

        Ok(TxQueue {
            region,
            ring_bytes,
            num_entries,
            clean_index: 0,
            tx_index: 0,
            buffers,
        })
    }

    pub fn ring_physical_addr(&self) -> u64 {
        self.region.physical_addr
    }

    pub fn ring_bytes(&self) -> usize {
        self.ring_bytes
    }

    pub fn num_entries(&self) -> u16 {
        self.num_entries
    }

    fn descriptor_mut(&self, index: u16) -> &mut AdvancedTxDescriptor {
        unsafe {
            &mut *(self.region.virtual_addr as *mut AdvancedTxDescriptor).add(index as usize)
        }
    }

    /// Reclaims every descriptor between `clean_index` and `tx_index` that
    /// the device has marked Descriptor Done, releasing each buffer back to
    /// whichever mempool it came from. Stops at the first not-yet-sent
    /// descriptor, since the ring is sent in order.
    fn clean(&mut self) {
        while self.clean_index != self.tx_index {
            let desc = self.descriptor_mut(self.clean_index);
            if !desc.descriptor_done() {
                break;
            }
            if let Some(buf) = self.buffers[self.clean_index as usize].take() {
                buf.release();
            }
            self.clean_index = inc_and_wrap(self.clean_index, self.num_entries);
        }
    }

    /// Cleans completed descriptors, then tries to post `buf`. Returns the
    /// TDT value to publish on success, or hands `buf` back unchanged if
    /// the ring has caught up with `clean_index` (every descriptor is
    /// either still in flight or not yet reclaimed) rather than overwrite
    /// one the device might still be reading.
    pub fn try_enqueue(&mut self, buf: PacketBuffer) -> Result<u16, PacketBuffer> {
        self.clean();

        let next_index = inc_and_wrap(self.tx_index, self.num_entries);
        if next_index == self.clean_index {
            return Err(buf);
        }

        let cur_index = self.tx_index;
        let desc = self.descriptor_mut(cur_index);
        desc.send(buf.payload_physical_addr(), buf.size());
        self.buffers[cur_index as usize] = Some(buf);
        self.tx_index = next_index;
        Ok(next_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inc_and_wrap_wraps_at_power_of_two_boundary() {
        assert_eq!(inc_and_wrap(0, 8), 1);
        assert_eq!(inc_and_wrap(7, 8), 0);
        assert_eq!(inc_and_wrap(1023, 1024), 0);
    }

    #[test]
    fn rejects_non_power_of_two_entry_counts() {
        assert!(check_power_of_two(1000, "rx").is_err());
        assert!(check_power_of_two(1024, "rx").is_ok());
    }
}
