//! The four error kinds the driver can raise, named after the violated
//! contract rather than the underlying OS call. Mirrors the shape of
//! `ixy_pci::PciError` and `ixy_memory::MemoryError` (manual `Display` +
//! `std::error::Error`, no `thiserror`) so all three crates read the same way.

use std::fmt;

use ixy_memory::MemoryError;
use ixy_pci::PciError;

/// Errors the driver can raise. `Config` and `Mapping` are always fatal;
/// `Resource` is fatal on the RX hot path and during initialisation, but
/// non-fatal (returns `None`) when `Mempool::alloc` is called outside of RX
/// refill. `Timeout` is never fatal: link bring-up logs it and continues
/// with a reported speed of 0.
#[derive(Debug)]
pub enum IxgbeError {
    /// A violated precondition: multi-segment packet received, queue-entry
    /// count not a power of two, malformed PCI address, and so on.
    Config(String),
    /// The OS refused an allocation or mapping, or the mempool was found
    /// empty where the driver needed a buffer to continue.
    Resource(String),
    /// `/proc/self/pagemap` reported a page not present.
    Mapping(String),
    /// A poll loop exceeded its timeout budget.
    Timeout(String),
}

impl fmt::Display for IxgbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "ixgbe config error: {}", msg),
            Self::Resource(msg) => write!(f, "ixgbe resource error: {}", msg),
            Self::Mapping(msg) => write!(f, "ixgbe mapping error: {}", msg),
            Self::Timeout(msg) => write!(f, "ixgbe timeout: {}", msg),
        }
    }
}

impl std::error::Error for IxgbeError {}

impl From<MemoryError> for IxgbeError {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::Config(msg) => IxgbeError::Config(msg),
            MemoryError::Resource(msg) => IxgbeError::Resource(msg),
            MemoryError::Mapping(msg) => IxgbeError::Mapping(msg),
        }
    }
}

impl From<PciError> for IxgbeError {
    fn from(e: PciError) -> Self {
        IxgbeError::Resource(e.to_string())
    }
}
