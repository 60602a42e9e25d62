//! The `Device` handle: BAR0 register access, the reset/init sequence from
//! 82599 datasheet section 4.6.3, and the RX/TX hot paths. Grounded in
//! `ixgbe::reset_and_init`/`init_link`/`init_rx`/`init_tx`/`start_rx_queue`/
//! `start_tx_queue`/`wait_for_link`/`rx_packet`/`tx_packet`/`do_read_stats`
//! of the original driver, with the generic `set_reg32`/`wait_set_reg32`
//! helpers from its `ixy_driver_base` reimagined as small free functions
//! over typed register structs instead of an integer register offset.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use volatile::Volatile;

use ixy_memory::PacketBuffer;
use ixy_pci::{map_bar0, MappedBar0};

use crate::error::IxgbeError;
use crate::queue::{RxQueue, TxQueue, NUM_RX_QUEUE_ENTRIES, NUM_TX_QUEUE_ENTRIES};
use crate::regs::{
    self, IntelIxgbeMacRegisters, IntelIxgbeRegisters1, IntelIxgbeRegisters2, IntelIxgbeRegisters3,
    IntelIxgbeRxRegisters1, IntelIxgbeRxRegisters2, IntelIxgbeTxRegisters, RegistersRx, RegistersTx,
};
use crate::stats::DeviceStats;

/// Hard cap on queues per direction, matching `ixy::MAX_QUEUES` in the
/// original (the 82599 exposes up to 128 hardware queues, but this driver
/// only ever needs a handful per process).
pub const MAX_QUEUES: u16 = 64;

const REG_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// ~200 ms, the "a few ms for register bits" budget for reset/init poll
/// loops (CTRL reset clearing, EEC auto-read, RDRXCTL DMA-init-done, and
/// per-queue RXDCTL/TXDCTL enable). Distinct from the 10 s link-up budget.
const REG_POLL_ITERATIONS: u32 = 200;

const LINK_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// 10 s, matching the datasheet's recommended link-training budget.
const LINK_POLL_ITERATIONS: u32 = 100;

/// Outcome of [`Device::tx_packet`]. Not an error: a full ring under
/// back-pressure is an expected, common condition on the hot path.
pub enum TxStatus {
    /// The packet was posted to the ring and the tail register published.
    Enqueued,
    /// The ring had no free descriptor. `buf` is handed back unchanged so
    /// the caller can retry, drop it, or forward it to another queue.
    Full(PacketBuffer),
}

/// A mapped, reset, and initialized 82599 NIC: `num_rx_queues` receive
/// queues and `num_tx_queues` transmit queues, each independently owned by
/// whichever thread calls [`Device::rx_packet`]/[`Device::tx_packet`] on it.
pub struct Device {
    pci_addr: String,
    bar0: MappedBar0,
    num_rx_queues: u16,
    num_tx_queues: u16,
    rx_queues: Vec<RxQueue>,
    tx_queues: Vec<TxQueue>,
}

impl Device {
    /// Maps the device at `pci_addr`, allocates `num_rx_queues` receive and
    /// `num_tx_queues` transmit queues (each with its own DMA ring, and for
    /// RX queues, its own mempool), and runs the full reset/init sequence.
    /// The device is ready for [`Device::rx_packet`]/[`Device::tx_packet`]
    /// when this returns `Ok`.
    pub fn open(pci_addr: &str, num_rx_queues: u16, num_tx_queues: u16) -> Result<Self, IxgbeError> {
        if num_rx_queues > MAX_QUEUES {
            return Err(IxgbeError::Config(format!(
                "cannot configure {} rx queues: limit is {}",
                num_rx_queues, MAX_QUEUES
            )));
        }
        if num_tx_queues > MAX_QUEUES {
            return Err(IxgbeError::Config(format!(
                "cannot configure {} tx queues: limit is {}",
                num_tx_queues, MAX_QUEUES
            )));
        }

        let bar0 = map_bar0(pci_addr)?;

        let mut rx_queues = Vec::with_capacity(num_rx_queues as usize);
        for _ in 0..num_rx_queues {
            rx_queues.push(RxQueue::new(NUM_RX_QUEUE_ENTRIES)?);
        }
        let mut tx_queues = Vec::with_capacity(num_tx_queues as usize);
        for _ in 0..num_tx_queues {
            tx_queues.push(TxQueue::new(NUM_TX_QUEUE_ENTRIES)?);
        }

        let mut device = Device {
            pci_addr: pci_addr.to_string(),
            bar0,
            num_rx_queues,
            num_tx_queues,
            rx_queues,
            tx_queues,
        };
        device.reset_and_init()?;
        Ok(device)
    }

    pub fn pci_addr(&self) -> &str {
        &self.pci_addr
    }

    pub fn num_rx_queues(&self) -> u16 {
        self.num_rx_queues
    }

    pub fn num_tx_queues(&self) -> u16 {
        self.num_tx_queues
    }

    // ===== Register-block accessors =====
    //
    // Each returns a `&mut` reference computed directly from the BAR0 base
    // pointer. Calling one of these twice in overlapping scopes would
    // produce aliasing `&mut` references, which is why every call site
    // uses the reference within a single statement and lets it drop
    // immediately after.

    fn regs1(&self) -> &mut IntelIxgbeRegisters1 {
        unsafe { &mut *(self.bar0.base as *mut IntelIxgbeRegisters1) }
    }

    fn rx_regs1(&self) -> &mut IntelIxgbeRxRegisters1 {
        unsafe { &mut *(self.bar0.base.add(0x1000) as *mut IntelIxgbeRxRegisters1) }
    }

    fn regs2(&self) -> &mut IntelIxgbeRegisters2 {
        unsafe { &mut *(self.bar0.base.add(0x2000) as *mut IntelIxgbeRegisters2) }
    }

    fn tx_regs(&self) -> &mut IntelIxgbeTxRegisters {
        unsafe { &mut *(self.bar0.base.add(0x6000) as *mut IntelIxgbeTxRegisters) }
    }

    fn mac_regs(&self) -> &mut IntelIxgbeMacRegisters {
        unsafe { &mut *(self.bar0.base.add(0x8000) as *mut IntelIxgbeMacRegisters) }
    }

    fn rx_regs2(&self) -> &mut IntelIxgbeRxRegisters2 {
        unsafe { &mut *(self.bar0.base.add(0xD000) as *mut IntelIxgbeRxRegisters2) }
    }

    fn regs3(&self) -> &mut IntelIxgbeRegisters3 {
        unsafe { &mut *(self.bar0.base.add(0xE000) as *mut IntelIxgbeRegisters3) }
    }

    fn rx_queue_regs(&self, queue_id: u16) -> &mut RegistersRx {
        let q = queue_id as usize;
        if q < 64 {
            &mut self.rx_regs1().rx_regs1[q]
        } else {
            &mut self.rx_regs2().rx_regs2[q - 64]
        }
    }

    fn tx_queue_regs(&self, queue_id: u16) -> &mut RegistersTx {
        &mut self.tx_regs().tx_regs[queue_id as usize]
    }

    // ===== Poll helpers =====

    fn wait_set(&self, what: &str, mask: u32, mut read: impl FnMut(&Self) -> u32) -> Result<(), IxgbeError> {
        for _ in 0..REG_POLL_ITERATIONS {
            let cur = read(self);
            if cur & mask == mask {
                return Ok(());
            }
            debug!("waiting for {} (mask {:#x}, current {:#x})", what, mask, cur);
            thread::sleep(REG_POLL_INTERVAL);
        }
        Err(IxgbeError::Timeout(format!("timed out waiting for {} to set {:#x}", what, mask)))
    }

    fn wait_clear(&self, what: &str, mask: u32, mut read: impl FnMut(&Self) -> u32) -> Result<(), IxgbeError> {
        for _ in 0..REG_POLL_ITERATIONS {
            let cur = read(self);
            if cur & mask == 0 {
                return Ok(());
            }
            debug!("waiting for {} (mask {:#x}, current {:#x}) to clear", what, mask, cur);
            thread::sleep(REG_POLL_INTERVAL);
        }
        Err(IxgbeError::Timeout(format!("timed out waiting for {} to clear {:#x}", what, mask)))
    }

    // ===== Reset and initialisation (datasheet section 4.6.3) =====

    fn reset_and_init(&mut self) -> Result<(), IxgbeError> {
        info!("resetting device {}", self.pci_addr);

        // 4.6.3.1: disable all interrupts before touching anything else.
        self.regs1().eimc.write(regs::DISABLE_INTERRUPTS);

        // 4.6.3.2: global reset, then wait for it to clear.
        self.regs1().ctrl.write(regs::CTRL_RST_MASK);
        self.wait_clear("CTRL reset", regs::CTRL_RST_MASK, |d| d.regs1().ctrl.read())?;
        thread::sleep(Duration::from_millis(10));

        // Interrupts come back enabled after a reset; mask them again.
        self.regs1().eimc.write(regs::DISABLE_INTERRUPTS);

        info!("initializing device {}", self.pci_addr);

        // 4.6.3: wait for the EEPROM auto-read and DMA init to complete.
        self.wait_set("EEC auto-read-done", regs::EEC_AUTO_RD, |d| d.regs3().eec.read())?;
        self.wait_set("RDRXCTL DMA-init-done", regs::RDRXCTL_DMAIDONE, |d| d.regs2().rdrxctl.read())?;

        // 4.6.4: bring up the link (autonegotiation only, no explicit wait yet).
        self.init_link();

        // 4.6.5: the packet/byte counters reset on read; discard the first
        // read so later callers see counts from this point forward.
        let mut discard = DeviceStats::new();
        self.read_stats(&mut discard);

        // 4.6.7 / 4.6.8: configure the RX and TX engines.
        self.init_rx()?;
        self.init_tx()?;

        for i in 0..self.num_rx_queues {
            self.start_rx_queue(i)?;
        }
        for i in 0..self.num_tx_queues {
            self.start_tx_queue(i)?;
        }

        // Skip the rest of 4.6.3 (interrupt setup). This driver is
        // poll-mode only. Enable promiscuous mode by default; this driver
        // has no MAC/VLAN filtering path of its own.
        self.set_promisc(true);

        self.wait_for_link();
        Ok(())
    }

    fn init_link(&self) {
        // AUTOC field widths per the 82599 datasheet: LMS occupies bits
        // 13-15, the 10G PMA/PMD selector bits 7-9.
        const AUTOC_LMS_MASK: u32 = 0x7 << 13;
        const AUTOC_10G_PMA_PMD_MASK: u32 = 0x7 << 7;

        let autoc = self.regs2().autoc.read();
        let autoc = (autoc & !AUTOC_LMS_MASK & !AUTOC_10G_PMA_PMD_MASK)
            | regs::AUTOC_LMS_KX_KX4_AUTONEG
            | regs::AUTOC_10G_PMA_PMD_XAUI;
        self.regs2().autoc.write(autoc);
        set_flags32(&mut self.regs2().autoc, regs::AUTOC_RESTART_AN);
        // The datasheet suggests waiting for the link here; this driver
        // continues and waits once, later, in `wait_for_link`.
    }

    fn init_rx(&mut self) -> Result<(), IxgbeError> {
        clear_flags32(&mut self.regs2().rxctrl, regs::RECEIVE_ENABLE);

        // A single 128 KiB packet buffer for queue 0; no DCB, so the rest
        // of the eight buffers are disabled.
        self.regs2().rxpbsize[0].write(regs::RXPBSIZE_0_128KB << 10);
        for i in 1..8 {
            self.regs2().rxpbsize[i].write(0);
        }

        set_flags32(&mut self.regs2().hlreg0, regs::HLREG0_CRC_STRIP);
        set_flags32(&mut self.regs2().rdrxctl, regs::RDRXCTL_CRC_STRIP);
        set_flags32(&mut self.regs2().fctrl, regs::BROADCAST_ACCEPT_MODE);

        for i in 0..self.num_rx_queues {
            debug!("initializing rx queue {}", i);

            let srrctl = &mut self.rx_queue_regs(i).srrctl;
            let cur = srrctl.read();
            srrctl.write((cur & !0x3u32) | regs::DESCTYPE_ADV_1BUFFER);
            set_flags32(&mut self.rx_queue_regs(i).srrctl, regs::DROP_ENABLE);

            let queue = &mut self.rx_queues[i as usize];
            let ring_phys = queue.ring_physical_addr();
            let ring_bytes = queue.ring_bytes() as u32;

            let regs = self.rx_queue_regs(i);
            regs.rdbal.write((ring_phys & 0xFFFF_FFFF) as u32);
            regs.rdbah.write((ring_phys >> 32) as u32);
            regs.rdlen.write(ring_bytes);
            regs.rdh.write(0);
            regs.rdt.write(0);

            debug!("rx ring {} phys addr: {:#x} bytes: {}", i, ring_phys, ring_bytes);
        }

        // Magic bit mentioned at the end of 4.6.7: set, reserved elsewhere.
        set_flags32(&mut self.regs1().ctrl_ext, regs::CTRL_EXT_NO_SNOOP_DIS);
        for i in 0..self.num_rx_queues {
            clear_flags32(&mut self.rx_queue_regs(i).dca_rxctrl, regs::DCA_RXCTRL_CLEAR_BIT_12);
        }

        set_flags32(&mut self.regs2().rxctrl, regs::RECEIVE_ENABLE);
        Ok(())
    }

    fn init_tx(&mut self) -> Result<(), IxgbeError> {
        set_flags32(&mut self.regs2().hlreg0, regs::HLREG0_TXCRCEN | regs::HLREG0_TXPADEN);

        self.mac_regs().txpbsize[0].write(regs::TXPBSIZE_0_40KB << 10);
        for i in 1..8 {
            self.mac_regs().txpbsize[i].write(0);
        }
        self.mac_regs().dtxmxszrq.write(regs::DTXMXSZRQ_MAX_BYTES);
        clear_flags32(&mut self.regs2().rttdcs, regs::RTTDCS_ARBDIS);

        for i in 0..self.num_tx_queues {
            debug!("initializing tx queue {}", i);

            let queue = &mut self.tx_queues[i as usize];
            let ring_phys = queue.ring_physical_addr();
            let ring_bytes = queue.ring_bytes() as u32;

            let regs = self.tx_queue_regs(i);
            regs.tdbal.write((ring_phys & 0xFFFF_FFFF) as u32);
            regs.tdbah.write((ring_phys >> 32) as u32);
            regs.tdlen.write(ring_bytes);

            // Write-back thresholds recommended by the datasheet: clear
            // the low 6 bits (PTHRESH) then set PTHRESH=32. No prefetch
            // (WTHRESH left at 0).
            let txdctl = &mut self.tx_queue_regs(i).txdctl;
            let cur = txdctl.read();
            txdctl.write((cur & !0x3Fu32) | regs::TXDCTL_PTHRESH_32);

            debug!("tx ring {} phys addr: {:#x} bytes: {}", i, ring_phys, ring_bytes);
        }

        self.regs2().dmatxctl.write(regs::DMATXCTL_TE);
        Ok(())
    }

    fn start_rx_queue(&mut self, queue_id: u16) -> Result<(), IxgbeError> {
        debug!("starting rx queue {}", queue_id);
        self.rx_queues[queue_id as usize].populate()?;

        let num_entries = self.rx_queues[queue_id as usize].num_entries();
        set_flags32(&mut self.rx_queue_regs(queue_id).rxdctl, regs::RXDCTL_ENABLE);
        self.wait_set(
            "RXDCTL enable",
            regs::RXDCTL_ENABLE,
            |d| d.rx_queue_regs(queue_id).rxdctl.read(),
        )?;

        let regs = self.rx_queue_regs(queue_id);
        regs.rdh.write(0);
        // The ring starts out entirely owned by the device.
        regs.rdt.write((num_entries - 1) as u32);
        Ok(())
    }

    fn start_tx_queue(&mut self, queue_id: u16) -> Result<(), IxgbeError> {
        debug!("starting tx queue {}", queue_id);
        let regs = self.tx_queue_regs(queue_id);
        regs.tdh.write(0);
        regs.tdt.write(0);

        set_flags32(&mut self.tx_queue_regs(queue_id).txdctl, regs::TXDCTL_ENABLE);
        self.wait_set(
            "TXDCTL enable",
            regs::TXDCTL_ENABLE,
            |d| d.tx_queue_regs(queue_id).txdctl.read(),
        )?;
        Ok(())
    }

    fn wait_for_link(&self) {
        info!("waiting for link on {}...", self.pci_addr);
        let mut speed = self.link_speed();
        let mut waited = 0;
        while speed == 0 && waited < LINK_POLL_ITERATIONS {
            thread::sleep(LINK_POLL_INTERVAL);
            waited += 1;
            speed = self.link_speed();
        }
        if speed == 0 {
            warn!("{}: link did not come up within 10s, continuing anyway", self.pci_addr);
        } else {
            info!("{}: link speed is {} Mbit/s", self.pci_addr, speed);
        }
    }

    // ===== Public operational API =====

    /// Current link speed in Mbit/s (100, 1000, or 10000), or 0 if the
    /// link is down.
    pub fn link_speed(&self) -> u32 {
        let links = self.regs2().links.read();
        if links & regs::LINKS_LINK_UP == 0 {
            return 0;
        }
        match links & regs::LINKS_SPEED_MASK {
            regs::LINKS_SPEED_100_MBPS => 100,
            regs::LINKS_SPEED_1_GBPS => 1000,
            regs::LINKS_SPEED_10_GBPS => 10000,
            _ => 0,
        }
    }

    /// Enables or disables unicast + multicast promiscuous mode. Enabled by
    /// default at the end of `open`, since this driver has no MAC/VLAN
    /// filter configuration of its own.
    pub fn set_promisc(&self, enabled: bool) {
        let flags = regs::UNICAST_PROMISCUOUS_ENABLE | regs::MULTICAST_PROMISCUOUS_ENABLE;
        if enabled {
            info!("{}: enabling promiscuous mode", self.pci_addr);
            set_flags32(&mut self.regs2().fctrl, flags);
        } else {
            info!("{}: disabling promiscuous mode", self.pci_addr);
            clear_flags32(&mut self.regs2().fctrl, flags);
        }
    }

    /// Adds this read's hardware counters into `stats`. The underlying
    /// registers reset to zero on read, so `stats` must be accumulated by
    /// the caller across calls, not overwritten.
    pub fn read_stats(&self, stats: &mut DeviceStats) {
        let regs2 = self.regs2();
        let rx_pkts = regs2.gprc.read() as u64;
        let tx_pkts = regs2.gptc.read() as u64;
        let rx_bytes = regs2.gorcl.read() as u64 | ((regs2.gorch.read() as u64) << 32);
        let tx_bytes = regs2.gotcl.read() as u64 | ((regs2.gotch.read() as u64) << 32);

        stats.rx_pkts += rx_pkts;
        stats.tx_pkts += tx_pkts;
        stats.rx_bytes += rx_bytes;
        stats.tx_bytes += tx_bytes;
    }

    /// Polls `queue_id` once. Returns the received buffer if the next
    /// descriptor was done, or `None` if it wasn't. Propagates a fatal
    /// `Config` error for a multi-segment packet (unsupported) and a fatal
    /// `Resource` error if the queue's mempool is exhausted.
    pub fn rx_packet(&mut self, queue_id: u16) -> Result<Option<PacketBuffer>, IxgbeError> {
        let polled = {
            let queue = self
                .rx_queues
                .get_mut(queue_id as usize)
                .ok_or_else(|| IxgbeError::Config(format!("no such rx queue {}", queue_id)))?;
            queue.poll()?
        };

        match polled {
            Some((buf, rdt)) => {
                self.rx_queue_regs(queue_id).rdt.write(rdt as u32);
                Ok(Some(buf))
            }
            None => Ok(None),
        }
    }

    /// Polls `queue_id` up to `max` times, pushing every received buffer
    /// into `out`. Returns the number of packets received, which may be
    /// less than `max` (including zero) if the ring ran dry.
    pub fn rx_batch(&mut self, queue_id: u16, out: &mut Vec<PacketBuffer>, max: usize) -> Result<usize, IxgbeError> {
        let mut received = 0;
        while received < max {
            match self.rx_packet(queue_id)? {
                Some(buf) => {
                    out.push(buf);
                    received += 1;
                }
                None => break,
            }
        }
        Ok(received)
    }

    /// Reclaims descriptors the device has finished sending, then tries to
    /// post `buf` to `queue_id`. Never blocks: a full ring is reported as
    /// [`TxStatus::Full`], handing `buf` back, rather than waited out.
    pub fn tx_packet(&mut self, queue_id: u16, buf: PacketBuffer) -> Result<TxStatus, IxgbeError> {
        let outcome = {
            let queue = self
                .tx_queues
                .get_mut(queue_id as usize)
                .ok_or_else(|| IxgbeError::Config(format!("no such tx queue {}", queue_id)))?;
            queue.try_enqueue(buf)
        };

        match outcome {
            Ok(tdt) => {
                self.tx_queue_regs(queue_id).tdt.write(tdt as u32);
                Ok(TxStatus::Enqueued)
            }
            Err(buf) => Ok(TxStatus::Full(buf)),
        }
    }
}

fn set_flags32(reg: &mut Volatile<u32>, flags: u32) {
    let cur = reg.read();
    reg.write(cur | flags);
}

fn clear_flags32(reg: &mut Volatile<u32>, flags: u32) {
    let cur = reg.read();
    reg.write(cur & !flags);
}
