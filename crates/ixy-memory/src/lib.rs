//! DMA-capable memory: virtual-to-physical translation, the two DMA
//! allocation strategies (huge-page and brute-force-contiguous), and the
//! packet-buffer mempool built on top of them.

mod error;
pub mod dma;
pub mod mempool;
pub mod packet_buffer;
pub mod translate;

pub use error::MemoryError;
pub use dma::DmaRegion;
pub use mempool::Mempool;
pub use packet_buffer::PacketBuffer;
