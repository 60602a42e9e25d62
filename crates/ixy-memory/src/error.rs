use std::fmt;

/// Errors raised by virtual-to-physical translation and DMA allocation.
/// Named after the kinds spec'd for the driver as a whole (`Config` /
/// `Resource` / `Mapping`); `Timeout` does not apply to this crate, which has
/// no register polling.
#[derive(Debug)]
pub enum MemoryError {
    /// A violated precondition: entry size doesn't divide the huge-page
    /// size, hugetlbfs mount missing, requested contiguous block larger than
    /// the brute-force sample pool, and similar.
    Config(String),
    /// The OS refused mmap/mlock/open/ftruncate/read, or a contiguous run
    /// could not be found in the sample pool.
    Resource(String),
    /// `/proc/self/pagemap` reported a page not present.
    Mapping(String),
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "memory config error: {}", msg),
            Self::Resource(msg) => write!(f, "memory resource error: {}", msg),
            Self::Mapping(msg) => write!(f, "memory mapping error: {}", msg),
        }
    }
}

impl std::error::Error for MemoryError {}
