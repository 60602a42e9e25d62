//! Structs that overlay the 82599's 128 KiB BAR0 memory-mapped register
//! space, plus the bit masks the reset/init/hot-path code needs. The
//! register map is divided into multiple structs because the driver only
//! cares about disjoint slices of it (general registers, the 64/128-wide
//! per-queue register blocks, MAC address/packet-buffer-size registers).
//!
//! The 7 structs that cover the entire memory-mapped region are:
//! * `IntelIxgbeRegisters1`
//! * `IntelIxgbeRxRegisters1`
//! * `IntelIxgbeRegisters2`
//! * `IntelIxgbeTxRegisters`
//! * `IntelIxgbeMacRegisters`
//! * `IntelIxgbeRxRegisters2`
//! * `IntelIxgbeRegisters3`

use volatile::{ReadOnly, Volatile, WriteOnly};
use zerocopy::FromBytes;
use static_assertions::const_assert_eq;

/// The layout in memory of the first set of general registers of the 82599 device.
#[derive(FromBytes)]
#[repr(C)]
pub struct IntelIxgbeRegisters1 {
    /// Device Control Register
    pub ctrl: Volatile<u32>, // 0x0
    _padding0: [u8; 4], // 0x4 - 0x7

    /// Device Status Register
    pub status: ReadOnly<u32>, // 0x8
    _padding1: [u8; 12], // 0xC - 0x17

    /// Extended Device Control Register
    pub ctrl_ext: Volatile<u32>, // 0x18
    _padding2: [u8; 12], // 0x1C - 0x27

    /// I2C Control
    pub i2cctl: Volatile<u32>, // 0x28
    _padding3: [u8; 2004], // 0x2C - 0x7FF

    /// Extended Interrupt Cause Register
    pub eicr: Volatile<u32>, // 0x800
    _padding4: [u8; 4], // 0x804 - 0x807

    /// Extended Interrupt Cause Set Register
    pub eics: WriteOnly<u32>, // 0x808
    _padding5: [u8; 4], // 0x80C - 0x80F

    /// Extended Interrupt Auto Clear Register
    pub eiac: Volatile<u32>, // 0x810
    _padding6: [u8; 12], // 0x814 - 0x81F

    /// Extended Interrupt Throttle Registers
    pub eitr: [Volatile<u32>; 24], // 0x820 - 0x87F

    /// Extended Interrupt Mask Set/Read Register
    pub eims: Volatile<u32>, // 0x880
    _padding7: [u8; 4], // 0x884 - 0x887

    /// Extended Interrupt Mask Clear Register. Writing this with all bits
    /// set is how the reset sequence masks every interrupt source.
    pub eimc: WriteOnly<u32>, // 0x888
    _padding8: [u8; 4], // 0x88C - 0x88F

    /// Extended Interrupt Auto Mask Enable Register
    pub eiam: Volatile<u32>, // 0x890
    _padding9: [u8; 4], // 0x894 - 0x897

    /// General Purpose Interrupt Enable
    pub gpie: Volatile<u32>, // 0x898
    _padding10: [u8; 100], // 0x89C - 0x8FF

    /// Interrupt Vector Allocation Registers
    pub ivar: [Volatile<u32>; 64], // 0x900 - 0x9FF
    _padding11: [u8; 1536], // 0xA00 - 0xFFF
} // 1 4KiB page

const_assert_eq!(core::mem::size_of::<IntelIxgbeRegisters1>(), 4096);

/// The layout in memory of the first set of receive queue registers of the 82599 device.
#[derive(FromBytes)]
#[repr(C)]
pub struct IntelIxgbeRxRegisters1 {
    /// First set of Rx Registers for 64 Rx Queues
    pub rx_regs1: [RegistersRx; 64], // 0x1000 - 0x1FFF
} // 1 4KiB page

const_assert_eq!(core::mem::size_of::<IntelIxgbeRxRegisters1>(), 4096);

/// The layout in memory of the second set of general registers of the 82599 device.
#[derive(FromBytes)]
#[repr(C)]
pub struct IntelIxgbeRegisters2 {
    _padding1: [u8; 3840], // 0x2000 - 0x2EFF

    /// Receive DMA Control Register
    pub rdrxctl: Volatile<u32>, // 0x2F00
    _padding2: [u8; 252], // 0x2F04 - 0x2FFF

    /// Receive Control Register
    pub rxctrl: Volatile<u32>, // 0x3000
    _padding3: [u8; 508], // 0x3004 - 0x31FF

    /// Flow Control Transmit Timer Value
    pub fcttv: [Volatile<u32>; 4], // 0x3200 - 0x320F
    _padding4: [u8; 16], // 0x3210 - 0x321F

    /// Flow Control Receive Threshold Low
    pub fcrtl: [Volatile<u32>; 8], // 0x3220 - 0x323F
    _padding5: [u8; 32], // 0x3240 - 0x325F

    /// Flow Control Receive Threshold High
    pub fcrth: [Volatile<u32>; 8], // 0x3260 - 0x327F
    _padding6: [u8; 32], // 0x3280 - 0x329F

    /// Flow Control Refresh Threshold Value
    pub fcrtv: Volatile<u32>, // 0x32A0
    _padding7: [u8; 2396], // 0x32A4 - 0x3CFF

    /// Receive Packet Buffer Size
    pub rxpbsize: [Volatile<u32>; 8], // 0x3C00
    _padding8: [u8; 224], // 0x3C20 - 0x3CFF

    /// Flow Control Configuration
    pub fccfg: Volatile<u32>, // 0x3D00
    _padding9: [u8; 880], // 0x3D04 - 0x4073

    /// Good Packets Received Count (reset-on-read)
    pub gprc: Volatile<u32>, // 0x4074
    _padding10: [u8; 8], // 0x4078 - 0x407F

    /// Good Packets Transmitted Count (reset-on-read)
    pub gptc: Volatile<u32>, // 0x4080
    _padding11: [u8; 4], // 0x4084 - 0x4087

    /// Good Octets Received Count Low (reset-on-read)
    pub gorcl: Volatile<u32>, // 0x4088

    /// Good Octets Received Count High (reset-on-read)
    pub gorch: Volatile<u32>, // 0x408C

    /// Good Octets Transmitted Count Low (reset-on-read)
    pub gotcl: Volatile<u32>, // 0x4090

    /// Good Octets Transmitted Count High (reset-on-read)
    pub gotch: Volatile<u32>, // 0x4094
    _padding12: [u8; 424], // 0x4098 - 0x423F

    /// MAC Core Control 0 Register
    pub hlreg0: Volatile<u32>, // 0x4240
    _padding13: [u8; 92], // 0x4244 - 0x429F

    /// Auto-Negotiation Control Register
    pub autoc: Volatile<u32>, // 0x42A0

    /// Link Status Register
    pub links: Volatile<u32>, // 0x42A4

    /// Auto-Negotiation Control 2 Register
    pub autoc2: Volatile<u32>, // 0x42A8
    _padding14: [u8; 120], // 0x42AC - 0x4323

    /// Link Status Register 2
    pub links2: Volatile<u32>, // 0x4324
    _padding15: [u8; 1496], // 0x4328 - 0x48FF

    /// DCB Transmit Descriptor Plane Control and Status
    pub rttdcs: Volatile<u32>, // 0x4900
    _padding16: [u8; 380], // 0x4904 - 0x4A7F

    /// DMA Tx Control
    pub dmatxctl: Volatile<u32>, // 0x4A80
    _padding17: [u8; 4], // 0x4A84 - 0x4A87

    /// DMA Tx TCP Flags Control Low
    pub dtxtcpflgl: Volatile<u32>, // 0x4A88

    /// DMA Tx TCP Flags Control High
    pub dtxtcpflgh: Volatile<u32>, // 0x4A8C
    _padding18: [u8; 1392], // 0x4A90 - 0x4FFF

    /// Receive Checksum Control
    pub rxcsum: Volatile<u32>, // 0x5000
    _padding19: [u8; 124], // 0x5004 - 0x507F

    /// Filter Control Register
    pub fctrl: Volatile<u32>, // 0x5080
    _padding20: [u8; 164], // 0x5084 - 0x5127

    /// EType Queue Filter
    pub etqf: [Volatile<u32>; 8], // 0x5128 - 0x5147
    _padding21: [u8; 3768], // 0x5148 - 0x5FFF
} // 4 4KiB pages

const_assert_eq!(core::mem::size_of::<IntelIxgbeRegisters2>(), 4 * 4096);

/// The layout in memory of the transmit queue registers of the 82599 device.
#[derive(FromBytes)]
#[repr(C)]
pub struct IntelIxgbeTxRegisters {
    /// Set of registers for 128 transmit descriptor queues
    pub tx_regs: [RegistersTx; 128], // 0x6000 - 0x7FFF
} // 2 4KiB pages

const_assert_eq!(core::mem::size_of::<IntelIxgbeTxRegisters>(), 2 * 4096);

/// The layout in memory of the set of registers containing the MAC address
/// and packet-buffer sizes of the 82599 device.
#[derive(FromBytes)]
#[repr(C)]
pub struct IntelIxgbeMacRegisters {
    _padding1: [u8; 256], // 0x8000 - 0x80FF

    /// DMA Tx TCP Max Allow Size Requests
    pub dtxmxszrq: Volatile<u32>, // 0x8100
    _padding2: [u8; 8444], // 0x8104 - 0xA1FF

    /// Receive Address Low
    pub ral: Volatile<u32>, // 0xA200

    /// Receive Address High
    pub rah: Volatile<u32>, // 0xA204
    _padding3: [u8; 10744], // 0xA208 - 0xCBFF

    /// Transmit Packet Buffer Size
    pub txpbsize: [Volatile<u32>; 8], // 0xCC00
    _padding4: [u8; 992], // 0xCC20 - 0xCFFF
} // 5 4KiB pages

const_assert_eq!(core::mem::size_of::<IntelIxgbeMacRegisters>(), 5 * 4096);

/// The layout in memory of the second set of receive queue registers of the 82599 device.
#[derive(FromBytes)]
#[repr(C)]
pub struct IntelIxgbeRxRegisters2 {
    /// Second set of Rx Registers for 64 Rx Queues
    pub rx_regs2: [RegistersRx; 64], // 0xD000 - 0xDFFF
} // 1 4KiB page

const_assert_eq!(core::mem::size_of::<IntelIxgbeRxRegisters2>(), 4096);

/// The layout in memory of the third set of general registers of the 82599 device.
#[derive(FromBytes)]
#[repr(C)]
pub struct IntelIxgbeRegisters3 {
    /// Source Address Queue Filter
    pub saqf: [Volatile<u32>; 128], // 0xE000 - 0xE1FF

    /// Destination Address Queue Filter
    pub daqf: [Volatile<u32>; 128], // 0xE200 - 0xE3FF

    /// Source Destination Port Queue Filter
    pub sdpqf: [Volatile<u32>; 128], // 0xE400 - 0xE5FF

    /// Five Tuple Queue Filter
    pub ftqf: [Volatile<u32>; 128], // 0xE600 - 0xE7FF

    /// L3/L4 Tuples Immediate Interrupt Rx
    pub l34timir: [Volatile<u32>; 128], // 0xE800 - 0xE9FF

    _padding1: [u8; 256], // 0xEA00 - 0xEAFF

    /// Redirection Table
    pub reta: [Volatile<u32>; 32], // 0xEB00 - 0xEB7F

    /// RSS Random Key Register
    pub rssrk: [Volatile<u32>; 10], // 0xEB80 - 0xEBA7
    _padding2: [u8; 88], // 0xEBA8 - 0xEBFF

    /// EType Queue Select
    pub etqs: [Volatile<u32>; 8], // 0xEC00 - 0xEC1F
    _padding3: [u8; 96], // 0xEC20 - 0xEC7F

    /// Multiple Receive Queues Command Register
    pub mrqc: Volatile<u32>, // 0xEC80
    _padding4: [u8; 5004], // 0xEC84 - 0x1000F

    /// EEPROM/Flash Control Register
    pub eec: Volatile<u32>, // 0x10010

    /// EEPROM Read Register
    pub eerd: Volatile<u32>, // 0x10014
    _padding5: [u8; 296], // 0x10018 - 0x1013F

    /// Software Semaphore Register
    pub swsm: Volatile<u32>, // 0x10140
    _padding6: [u8; 28], // 0x10144 - 0x1015F

    /// Software Firmware Synchronization
    pub sw_fw_sync: Volatile<u32>, // 0x10160
    _padding7: [u8; 3852], // 0x10164 - 0x1106F

    /// DCA Requester ID Information Register
    pub dca_id: ReadOnly<u32>, // 0x11070

    /// DCA Control Register
    pub dca_ctrl: Volatile<u32>, // 0x11074
    _padding8: [u8; 61320], // 0x11078 - 0x1FFFF
} // 18 4KiB pages (total NIC mem = 128 KiB)

const_assert_eq!(core::mem::size_of::<IntelIxgbeRegisters3>(), 18 * 4096);

// The sum of all the register structs must equal the memory-mapped size of
// the NIC's BAR0 (128 KiB).
const_assert_eq!(
    core::mem::size_of::<IntelIxgbeRegisters1>()
        + core::mem::size_of::<IntelIxgbeRxRegisters1>()
        + core::mem::size_of::<IntelIxgbeRegisters2>()
        + core::mem::size_of::<IntelIxgbeTxRegisters>()
        + core::mem::size_of::<IntelIxgbeMacRegisters>()
        + core::mem::size_of::<IntelIxgbeRxRegisters2>()
        + core::mem::size_of::<IntelIxgbeRegisters3>(),
    0x20000
);

/// Set of registers associated with one transmit descriptor queue.
#[derive(FromBytes)]
#[repr(C)]
pub struct RegistersTx {
    /// Transmit Descriptor Base Address Low
    pub tdbal: Volatile<u32>, // +0x00

    /// Transmit Descriptor Base Address High
    pub tdbah: Volatile<u32>, // +0x04

    /// Transmit Descriptor Length
    pub tdlen: Volatile<u32>, // +0x08

    /// Tx DCA Control Register
    pub dca_txctrl: Volatile<u32>, // +0x0C

    /// Transmit Descriptor Head
    pub tdh: Volatile<u32>, // +0x10
    _padding0: [u8; 4], // +0x14

    /// Transmit Descriptor Tail
    pub tdt: Volatile<u32>, // +0x18
    _padding1: [u8; 12], // +0x1C

    /// Transmit Descriptor Control
    pub txdctl: Volatile<u32>, // +0x28
    _padding2: [u8; 12], // +0x2C

    /// Transmit Descriptor Completion Write Back Address Low
    pub tdwbal: Volatile<u32>, // +0x38

    /// Transmit Descriptor Completion Write Back Address High
    pub tdwbah: Volatile<u32>, // +0x3C
} // 64B

const_assert_eq!(core::mem::size_of::<RegistersTx>(), 64);

/// Set of registers associated with one receive descriptor queue.
#[derive(FromBytes)]
#[repr(C)]
pub struct RegistersRx {
    /// Receive Descriptor Base Address Low
    pub rdbal: Volatile<u32>, // +0x00

    /// Receive Descriptor Base Address High
    pub rdbah: Volatile<u32>, // +0x04

    /// Receive Descriptor Length
    pub rdlen: Volatile<u32>, // +0x08

    /// Rx DCA Control Register
    pub dca_rxctrl: Volatile<u32>, // +0x0C

    /// Receive Descriptor Head
    pub rdh: Volatile<u32>, // +0x10

    /// Split Receive Control Register (descriptor type)
    pub srrctl: Volatile<u32>, // +0x14

    /// Receive Descriptor Tail
    pub rdt: Volatile<u32>, // +0x18
    _padding1: [u8; 12], // +0x1C

    /// Receive Descriptor Control
    pub rxdctl: Volatile<u32>, // +0x28
    _padding2: [u8; 20], // +0x2C
} // 64B

const_assert_eq!(core::mem::size_of::<RegistersRx>(), 64);

// ===== Bit masks and offsets used by reset, init, and the hot paths =====

// CTRL
pub const CTRL_LRST: u32 = 1 << 3;
pub const CTRL_RST: u32 = 1 << 26;
pub const CTRL_RST_MASK: u32 = CTRL_LRST | CTRL_RST;

// Interrupt masking
pub const DISABLE_INTERRUPTS: u32 = 0x7FFF_FFFF;

// EEPROM
/// Auto-Read Done: set once the hardware has finished reading the EEPROM.
pub const EEC_AUTO_RD: u32 = 1 << 9;

// Receive DMA control
/// Set once the receive DMA engine has finished initializing.
pub const RDRXCTL_DMAIDONE: u32 = 1 << 3;
/// Enable CRC strip in the receive DMA path.
pub const RDRXCTL_CRC_STRIP: u32 = 1;

// Link setup (AUTOC / AUTOC2)
pub const AUTOC_LMS_KX_KX4_AUTONEG: u32 = 6 << 13; // KX/KX4/KR autoneg
pub const AUTOC_10G_PMA_PMD_XAUI: u32 = 0 << 7;
pub const AUTOC_RESTART_AN: u32 = 1 << 12;
pub const LINKS_LINK_UP: u32 = 1 << 30;
pub const LINKS_SPEED_MASK: u32 = 0x3 << 28;
pub const LINKS_SPEED_100_MBPS: u32 = 0x1 << 28;
pub const LINKS_SPEED_1_GBPS: u32 = 0x2 << 28;
pub const LINKS_SPEED_10_GBPS: u32 = 0x3 << 28;

// MAC control
pub const HLREG0_TXCRCEN: u32 = 1;
pub const HLREG0_TXPADEN: u32 = 1 << 10;
pub const HLREG0_CRC_STRIP: u32 = 1 << 1;

// Receive control
pub const RECEIVE_ENABLE: u32 = 1;
pub const BROADCAST_ACCEPT_MODE: u32 = 1 << 10;
pub const UNICAST_PROMISCUOUS_ENABLE: u32 = 1 << 9;
pub const MULTICAST_PROMISCUOUS_ENABLE: u32 = 1 << 8;

// SRRCTL (per-queue receive descriptor format)
pub const DESCTYPE_ADV_1BUFFER: u32 = 1 << 25;
pub const DROP_ENABLE: u32 = 1 << 28;

// Packet buffer sizes (register value is the size in KiB, held at bit 0)
pub const RXPBSIZE_0_128KB: u32 = 128;
pub const TXPBSIZE_0_40KB: u32 = 40;

// DCA
pub const DCA_RXCTRL_CLEAR_BIT_12: u32 = 1 << 12;

// CTRL_EXT
pub const CTRL_EXT_NO_SNOOP_DIS: u32 = 1 << 16;

// Queue enable (shared bit position for RXDCTL and TXDCTL)
pub const RXDCTL_ENABLE: u32 = 1 << 25;
pub const TXDCTL_ENABLE: u32 = 1 << 25;

// TXDCTL write-back thresholds: PTHRESH occupies bits 0-6, WTHRESH bits
// 16-22. The reset sequence sets PTHRESH=32 and leaves WTHRESH's low 6 bits
// clear.
pub const TXDCTL_PTHRESH_32: u32 = 32;

// DMATXCTL
pub const DMATXCTL_TE: u32 = 1;

// RTTDCS
pub const RTTDCS_ARBDIS: u32 = 1 << 6;

// DTXMXSZRQ
pub const DTXMXSZRQ_MAX_BYTES: u32 = 0xFFFF;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_queue_register_blocks_are_64_bytes() {
        assert_eq!(core::mem::size_of::<RegistersRx>(), 64);
        assert_eq!(core::mem::size_of::<RegistersTx>(), 64);
    }

    #[test]
    fn rxpbsize_and_txpbsize_constants_match_the_spec() {
        assert_eq!(RXPBSIZE_0_128KB << 10, 128 * 1024);
        assert_eq!(TXPBSIZE_0_40KB << 10, 40 * 1024);
    }
}
