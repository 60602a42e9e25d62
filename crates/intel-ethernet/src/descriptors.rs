//! The advanced descriptor types used by the 82599 (ixgbe) receive and
//! transmit engines. Each descriptor is 16 bytes and doubles as a "read"
//! layout (what the driver writes before handing it to the device) and a
//! "write-back" layout (what the device writes once it has consumed or
//! produced the corresponding buffer). The two views share the same memory
//! footprint but interpret the bits differently, so they are modelled as
//! distinct accessor sets rather than a union.

use core::fmt;
use volatile::Volatile;
use bit_field::BitField;

// Transmit descriptor bits. These occupy bits 24-31 of `cmd_type_len`
// (the DCMD byte of the advanced TX data descriptor), in the same relative
// bit order the legacy command byte used.
/// Tx Command: End of Packet
pub const TX_CMD_EOP: u32 = 1 << 24;
/// Tx Command: Insert FCS
pub const TX_CMD_IFCS: u32 = 1 << 25;
/// Tx Command: Report Status
pub const TX_CMD_RS: u32 = 1 << 27;
/// Tx Command: Descriptor Extension (must be set for the advanced format)
pub const TX_CMD_DEXT: u32 = 1 << 29;
/// Tx Command: VLAN Packet Enable
pub const TX_CMD_VLE: u32 = 1 << 30;
/// Tx Descriptor Type: advanced data descriptor, occupies bits 20-23
pub const TX_DESC_DTYP_DATA: u32 = 0x3 << 20;
/// Shift for the payload length field of `olinfo_status`
pub const TX_PAYLEN_SHIFT: u32 = 14;
/// Tx Status: Descriptor Done (bit 0 of the write-back status dword)
pub const TX_STATUS_DD: u32 = 1 << 0;

// Receive descriptor bits, read from the write-back form's extended status
// field (bits 0-19 of the second qword).
/// Rx Status: Descriptor Done
pub const RX_STATUS_DD: u64 = 1 << 0;
/// Rx Status: End of Packet
pub const RX_STATUS_EOP: u64 = 1 << 1;

/// A trait for the minimum set of functions needed to receive a packet using
/// one of Intel's advanced receive descriptor types. Receive descriptors
/// contain the physical address where an incoming packet should be stored by
/// the NIC, as well as bits that are updated by the hardware once the packet
/// is received. There is one receive descriptor per receive buffer.
pub trait RxDescriptor {
    /// Initializes a receive descriptor by clearing its status
    /// and setting the descriptor's physical address.
    ///
    /// # Arguments
    /// * `packet_buffer_address`: starting physical address of the receive buffer.
    fn init(&mut self, packet_buffer_address: u64);

    /// Updates the descriptor's physical address.
    ///
    /// # Arguments
    /// * `packet_buffer_address`: starting physical address of the receive buffer.
    fn set_packet_address(&mut self, packet_buffer_address: u64);

    /// Clears the status bits of the descriptor.
    fn reset_status(&mut self);

    /// Returns true if the descriptor has a received packet copied to its buffer.
    fn descriptor_done(&self) -> bool;

    /// Returns true if the descriptor's packet buffer is the last one in a frame.
    fn end_of_packet(&self) -> bool;

    /// The length of the packet in the descriptor's packet buffer.
    fn length(&self) -> u64;
}

/// A trait for the minimum set of functions needed to transmit a packet using
/// one of Intel's advanced transmit descriptor types. Transmit descriptors
/// contain the physical address where an outgoing packet is stored, as well
/// as bits that are updated by the hardware once the packet is sent. There is
/// one transmit descriptor per transmit buffer.
pub trait TxDescriptor {
    /// Initializes a transmit descriptor by clearing all of its values.
    fn init(&mut self);

    /// Updates the transmit descriptor to send the packet.
    /// We assume that one transmit descriptor is used to send one packet.
    ///
    /// # Arguments
    /// * `transmit_buffer_addr`: physical address of the transmit buffer.
    /// * `transmit_buffer_length`: length of the packet we want to send.
    fn send(&mut self, transmit_buffer_addr: u64, transmit_buffer_length: u16);

    /// Returns true once the device has marked this descriptor Descriptor Done.
    fn descriptor_done(&self) -> bool;
}

/// Advanced Receive Descriptor used by the 82599.
///
/// It has two modes, Read and Write-Back, both using the whole 128 bits.
/// There is one receive descriptor per receive buffer; the same 16 bytes are
/// reinterpreted between the two modes. Read contains the addresses the
/// driver writes; Write-Back contains information the hardware writes once a
/// packet has been received. See the 82599 datasheet for the full layout.
#[repr(C)]
pub struct AdvancedRxDescriptor {
    /// Starting physical address of the receive buffer for the packet.
    /// In write-back mode this field is overlaid with RSS/packet-type info.
    pub packet_buffer_address: Volatile<u64>,
    /// Starting physical address of the receive buffer for the header.
    /// Only used if header splitting is enabled, which this driver never does.
    /// In write-back mode this field is overlaid with status/error/length/vlan.
    pub header_buffer_address: Volatile<u64>,
}

impl RxDescriptor for AdvancedRxDescriptor {
    fn init(&mut self, packet_buffer_address: u64) {
        self.packet_buffer_address.write(packet_buffer_address);
        // Header address is left at 0 because packet splitting is never enabled.
        self.header_buffer_address.write(0);
    }

    fn set_packet_address(&mut self, packet_buffer_address: u64) {
        self.packet_buffer_address.write(packet_buffer_address);
    }

    fn reset_status(&mut self) {
        self.header_buffer_address.write(0);
    }

    fn descriptor_done(&self) -> bool {
        (self.get_ext_status() & RX_STATUS_DD) == RX_STATUS_DD
    }

    fn end_of_packet(&self) -> bool {
        (self.get_ext_status() & RX_STATUS_EOP) == RX_STATUS_EOP
    }

    fn length(&self) -> u64 {
        self.get_pkt_len()
    }
}

impl AdvancedRxDescriptor {
    /// Write-back mode. Returns the packet type used for the Receive Side
    /// Scaling hash function.
    pub fn get_rss_type(&self) -> u64 {
        self.packet_buffer_address.read().get_bits(0..3)
    }

    /// Write-back mode. Returns the packet type as identified by the hardware.
    pub fn get_packet_type(&self) -> u64 {
        self.packet_buffer_address.read().get_bits(4..16)
    }

    /// Write-back mode. Returns the number of Receive Side Coalesced packets
    /// that start in this descriptor.
    pub fn get_rsccnt(&self) -> u64 {
        self.packet_buffer_address.read().get_bits(17..20)
    }

    /// Write-back mode. Returns the size of the packet header in bytes.
    pub fn get_hdr_len(&self) -> u64 {
        self.packet_buffer_address.read().get_bits(21..30)
    }

    /// Write-back mode. Set when the hardware found the header length.
    pub fn get_sph(&self) -> bool {
        self.packet_buffer_address.read().get_bit(31)
    }

    /// Write-back mode. Returns the Receive Side Scaling hash.
    pub fn get_rss_hash(&self) -> u64 {
        self.packet_buffer_address.read().get_bits(32..63)
    }

    /// Write-back mode. Returns the Flow Director Filter ID if the packet
    /// matched a filter. Not used in this driver (flow director is a
    /// non-goal) but kept for completeness of the write-back layout.
    pub fn get_fdf_id(&self) -> u64 {
        self.packet_buffer_address.read().get_bits(32..63)
    }

    /// Write-back mode. Status bits: whether the descriptor has been used and
    /// whether the buffer is the last one for a packet.
    pub fn get_ext_status(&self) -> u64 {
        self.header_buffer_address.read().get_bits(0..19)
    }

    /// Write-back mode. Errors reported by hardware for different packet types.
    pub fn get_ext_error(&self) -> u64 {
        self.header_buffer_address.read().get_bits(20..31)
    }

    /// Write-back mode. Number of bytes posted to the packet buffer.
    pub fn get_pkt_len(&self) -> u64 {
        self.header_buffer_address.read().get_bits(32..47)
    }

    /// Write-back mode. If the VLAN header was stripped, the 16-bit VLAN tag
    /// is posted here.
    pub fn get_vlan_tag(&self) -> u64 {
        self.header_buffer_address.read().get_bits(48..63)
    }
}

impl fmt::Debug for AdvancedRxDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{packet_buffer_address: {:#X}, header_buffer_address: {:#X}}}",
            self.packet_buffer_address.read(),
            self.header_buffer_address.read()
        )
    }
}

/// Advanced Transmit Data Descriptor used by the 82599.
///
/// Like the receive descriptor, the 16 bytes are reinterpreted between a
/// read form (what the driver programs) and a write-back form (what the
/// device reports once the packet has left the wire). Only the status dword
/// is meaningful in write-back form; this driver never reads back
/// `cmd_type_len` or `buffer_addr` after posting.
#[repr(C)]
pub struct AdvancedTxDescriptor {
    /// Starting physical address of the transmit buffer for the packet.
    pub buffer_addr: Volatile<u64>,
    /// Descriptor type, DCMD flags (bits 24-31) and packet length (bits 0-15).
    pub cmd_type_len: Volatile<u32>,
    /// Payload length (bits 14-31) and, in write-back form, the DD status bit.
    pub olinfo_status: Volatile<u32>,
}

impl TxDescriptor for AdvancedTxDescriptor {
    fn init(&mut self) {
        self.buffer_addr.write(0);
        self.cmd_type_len.write(0);
        self.olinfo_status.write(0);
    }

    fn send(&mut self, transmit_buffer_addr: u64, transmit_buffer_length: u16) {
        self.buffer_addr.write(transmit_buffer_addr);
        self.cmd_type_len.write(
            TX_CMD_EOP
                | TX_CMD_RS
                | TX_CMD_IFCS
                | TX_CMD_DEXT
                | TX_DESC_DTYP_DATA
                | transmit_buffer_length as u32,
        );
        self.olinfo_status
            .write((transmit_buffer_length as u32) << TX_PAYLEN_SHIFT);
    }

    fn descriptor_done(&self) -> bool {
        (self.olinfo_status.read() & TX_STATUS_DD) == TX_STATUS_DD
    }
}

impl fmt::Debug for AdvancedTxDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{buffer_addr: {:#X}, cmd_type_len: {:#X}, olinfo_status: {:#X}}}",
            self.buffer_addr.read(),
            self.cmd_type_len.read(),
            self.olinfo_status.read()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed_rx() -> AdvancedRxDescriptor {
        AdvancedRxDescriptor {
            packet_buffer_address: Volatile::new(0),
            header_buffer_address: Volatile::new(0),
        }
    }

    fn zeroed_tx() -> AdvancedTxDescriptor {
        AdvancedTxDescriptor {
            buffer_addr: Volatile::new(0),
            cmd_type_len: Volatile::new(0),
            olinfo_status: Volatile::new(0),
        }
    }

    #[test]
    fn rx_descriptor_done_requires_dd_bit() {
        let mut desc = zeroed_rx();
        desc.init(0x1000);
        assert!(!desc.descriptor_done());
        // Simulate the device writing back DD | EOP and a 64-byte length.
        desc.header_buffer_address
            .write((RX_STATUS_DD | RX_STATUS_EOP) | (64u64 << 32));
        assert!(desc.descriptor_done());
        assert!(desc.end_of_packet());
        assert_eq!(desc.length(), 64);
    }

    #[test]
    fn rx_reset_status_clears_write_back_fields() {
        let mut desc = zeroed_rx();
        desc.header_buffer_address.write(RX_STATUS_DD | RX_STATUS_EOP);
        desc.reset_status();
        assert!(!desc.descriptor_done());
    }

    #[test]
    fn tx_send_sets_eop_rs_ifcs_dext_and_length() {
        let mut desc = zeroed_tx();
        desc.init();
        desc.send(0x2000, 60);
        assert_eq!(desc.buffer_addr.read(), 0x2000);
        let cmd = desc.cmd_type_len.read();
        assert_eq!(cmd & TX_CMD_EOP, TX_CMD_EOP);
        assert_eq!(cmd & TX_CMD_RS, TX_CMD_RS);
        assert_eq!(cmd & TX_CMD_IFCS, TX_CMD_IFCS);
        assert_eq!(cmd & TX_CMD_DEXT, TX_CMD_DEXT);
        assert_eq!(cmd & 0xFFFF, 60);
        assert_eq!(desc.olinfo_status.read() >> TX_PAYLEN_SHIFT, 60);
    }

    #[test]
    fn tx_descriptor_done_reads_write_back_status() {
        let mut desc = zeroed_tx();
        desc.init();
        assert!(!desc.descriptor_done());
        desc.olinfo_status.write(TX_STATUS_DD);
        assert!(desc.descriptor_done());
    }
}
