//! DMA-capable memory allocation: huge-page mode and brute-force contiguous
//! mode. Grounded in `memory_allocate_dma` of the original `ixy` driver,
//! generalised to the huge-page path that spec describes but the retrieved
//! original source predates.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info, warn};

use crate::error::MemoryError;
use crate::translate::{self, page_size};

/// 2 MiB, the standard x86-64 huge-page size.
pub const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

const HUGEPAGE_MOUNT: &str = "/mnt/huge";

/// Process-wide counter used to make huge-page backing-file names unique,
/// mirroring the original's `huge_pg_id` (see DESIGN NOTES).
static HUGE_PAGE_ID: AtomicU64 = AtomicU64::new(0);

/// A region of DMA-capable memory: a page-aligned virtual range, the
/// physical address of its first byte, and its size. If it was requested
/// contiguous, `physical_addr + offset` is the physical address of every
/// byte in `[0, size)`.
pub struct DmaRegion {
    pub virtual_addr: usize,
    pub physical_addr: u64,
    pub size: usize,
}

// The region's pages are locked for the process lifetime and only ever
// touched through explicit volatile accesses once handed to the device;
// moving the handle between threads is fine, sharing it without the
// caller's own synchronization is not.
unsafe impl Send for DmaRegion {}

fn round_up_to(size: usize, alignment: usize) -> usize {
    (size + alignment - 1) & !(alignment - 1)
}

/// Allocate a huge-page-backed DMA region. The default mode for mempools:
/// a single 2 MiB huge page is physically contiguous by construction, so no
/// further verification is needed for requests up to `HUGE_PAGE_SIZE`.
pub fn allocate_dma_hugepage(size: usize) -> Result<DmaRegion, MemoryError> {
    if !Path::new(HUGEPAGE_MOUNT).is_dir() {
        return Err(MemoryError::Config(format!(
            "hugetlbfs mount {} not found",
            HUGEPAGE_MOUNT
        )));
    }

    let rounded = round_up_to(size, HUGE_PAGE_SIZE);
    debug!("requested {} bytes, rounded to {} bytes ({} huge pages)",
        size, rounded, rounded / HUGE_PAGE_SIZE);

    let id = HUGE_PAGE_ID.fetch_add(1, Ordering::Relaxed);
    let path = format!("{}/ixgbe-{}-{}", HUGEPAGE_MOUNT, std::process::id(), id);

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .mode(0o700)
        .open(&path)
        .map_err(|e| MemoryError::Resource(format!("creating {}: {}", path, e)))?;

    file.set_len(rounded as u64)
        .map_err(|e| MemoryError::Resource(format!("truncating {}: {}", path, e)))?;

    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            rounded,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED | libc::MAP_HUGETLB,
            file.as_raw_fd(),
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        let _ = std::fs::remove_file(&path);
        return Err(MemoryError::Resource(format!(
            "mmap of {} failed: {}",
            path,
            std::io::Error::last_os_error()
        )));
    }

    if unsafe { libc::mlock(addr, rounded) } != 0 {
        let err = std::io::Error::last_os_error();
        unsafe {
            libc::munmap(addr, rounded);
        }
        let _ = std::fs::remove_file(&path);
        return Err(MemoryError::Resource(format!("mlock of {} failed: {}", path, err)));
    }

    // Unlink while still mapped: the mapping keeps the pages alive.
    if let Err(e) = std::fs::remove_file(&path) {
        warn!("failed to unlink huge-page backing file {}: {}", path, e);
    }

    // Touch the first byte of every huge page to force the kernel to
    // actually back it, per the contract that the caller has pre-faulted
    // any page it asks `virt_to_phys` about.
    for page in 0..(rounded / HUGE_PAGE_SIZE) {
        unsafe {
            let byte = (addr as *mut u8).add(page * HUGE_PAGE_SIZE);
            let tmp = std::ptr::read_volatile(byte);
            std::ptr::write_volatile(byte, tmp);
        }
    }

    let physical_addr = translate::virt_to_phys(addr as usize)?;
    info!(
        "allocated {} bytes of huge-page DMA memory at virt={:#x} phys={:#x}",
        rounded, addr as usize, physical_addr
    );

    Ok(DmaRegion {
        virtual_addr: addr as usize,
        physical_addr,
        size: rounded,
    })
}

/// Allocate a brute-force physically contiguous DMA region: map a sample
/// pool of ordinary pages, sort them by physical address, remap the sorted
/// pages into a reserved virtual range, and scan for the first run long
/// enough to satisfy `size`. Used when a caller needs more contiguous bytes
/// than a single huge page guarantees.
pub fn allocate_dma_contiguous(size: usize) -> Result<DmaRegion, MemoryError> {
    let page_size = page_size();
    const NUM_PAGES: usize = 1024;
    let pool_size = NUM_PAGES * page_size;

    let rounded = round_up_to(size, page_size);
    let needed_pages = rounded / page_size;
    if needed_pages > NUM_PAGES {
        return Err(MemoryError::Config(format!(
            "requested {} pages but the brute-force sample pool only has {}",
            needed_pages, NUM_PAGES
        )));
    }

    let target = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            pool_size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if target == libc::MAP_FAILED {
        return Err(MemoryError::Resource(format!(
            "mmap of target area failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    let pool = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            pool_size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
            -1,
            0,
        )
    };
    if pool == libc::MAP_FAILED {
        unsafe {
            libc::munmap(target, pool_size);
        }
        return Err(MemoryError::Resource(format!(
            "mmap of sample pool failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    if unsafe { libc::mlock(pool, pool_size) } != 0 {
        let err = std::io::Error::last_os_error();
        unsafe {
            libc::munmap(pool, pool_size);
            libc::munmap(target, pool_size);
        }
        return Err(MemoryError::Resource(format!("mlock of sample pool failed: {}", err)));
    }

    let mut entries: Vec<(usize, u64)> = Vec::with_capacity(NUM_PAGES);
    for i in 0..NUM_PAGES {
        let virt = pool as usize + i * page_size;
        unsafe {
            let tmp = std::ptr::read_volatile(virt as *const u8);
            std::ptr::write_volatile(virt as *mut u8, tmp);
        }
        let phys = translate::virt_to_phys(virt)?;
        entries.push((virt, phys));
    }
    entries.sort_by_key(|&(_, phys)| phys);

    // Remap the sorted pages into the target area so physically adjacent
    // pages become virtually adjacent too.
    let mut target_entries: Vec<(usize, u64)> = Vec::with_capacity(NUM_PAGES);
    for (i, &(virt, _)) in entries.iter().enumerate() {
        let dest = target as usize + i * page_size;
        let new_addr = unsafe {
            libc::mremap(
                virt as *mut libc::c_void,
                page_size,
                page_size,
                libc::MREMAP_MAYMOVE | libc::MREMAP_FIXED,
                dest as *mut libc::c_void,
            )
        };
        if new_addr == libc::MAP_FAILED {
            return Err(MemoryError::Resource(format!(
                "mremap of sample page {} failed: {}",
                i,
                std::io::Error::last_os_error()
            )));
        }
        let phys = translate::virt_to_phys(new_addr as usize)?;
        target_entries.push((new_addr as usize, phys));
    }

    for start in 0..=(NUM_PAGES - needed_pages) {
        let candidate = target_entries[start].0;
        if translate::is_contiguous(candidate, needed_pages * page_size)? {
            debug!(
                "found {}-page contiguous run at offset {}: virt={:#x} phys={:#x}",
                needed_pages, start, candidate, target_entries[start].1
            );
            return Ok(DmaRegion {
                virtual_addr: candidate,
                physical_addr: target_entries[start].1,
                size: rounded,
            });
        }
        unsafe {
            libc::munmap(candidate as *mut libc::c_void, page_size);
        }
    }

    // No contiguous run found anywhere in the sample; free what's left.
    for &(virt, _) in &target_entries[(NUM_PAGES - needed_pages + 1)..] {
        unsafe {
            libc::munmap(virt as *mut libc::c_void, page_size);
        }
    }
    Err(MemoryError::Resource(format!(
        "no {}-page contiguous run found in a {}-page sample",
        needed_pages, NUM_PAGES
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_to_rounds_to_the_next_multiple() {
        assert_eq!(round_up_to(1, HUGE_PAGE_SIZE), HUGE_PAGE_SIZE);
        assert_eq!(round_up_to(HUGE_PAGE_SIZE, HUGE_PAGE_SIZE), HUGE_PAGE_SIZE);
        assert_eq!(round_up_to(HUGE_PAGE_SIZE + 1, HUGE_PAGE_SIZE), 2 * HUGE_PAGE_SIZE);
    }

    #[test]
    fn huge_page_ids_are_unique_and_increasing() {
        let a = HUGE_PAGE_ID.fetch_add(1, Ordering::Relaxed);
        let b = HUGE_PAGE_ID.fetch_add(1, Ordering::Relaxed);
        assert!(b > a);
    }
}
