//! User-space poll-mode driver for the Intel 82599 (ixgbe) family of 10 GbE
//! NICs. Bypasses the kernel network stack entirely: this crate maps the
//! device's BAR0 register window into the calling process, drives the
//! reset/init sequence from the 82599 datasheet, and exposes the RX/TX hot
//! paths as plain function calls over descriptor rings backed by
//! `ixy_memory`'s DMA allocator and mempool.
//!
//! Grounded in the `ixgbe` kernel crate of Theseus OS (for the register
//! layout and descriptor bit positions) and in the original `ixy` C driver
//! (for the reset/init sequencing and hot-path algorithms). See `DESIGN.md`
//! at the workspace root for the full grounding ledger.

pub mod device;
pub mod error;
pub mod queue;
pub mod regs;
pub mod stats;

pub use device::{Device, TxStatus, MAX_QUEUES};
pub use error::IxgbeError;
pub use stats::DeviceStats;
