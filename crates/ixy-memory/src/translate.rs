//! Virtual-to-physical address translation via `/proc/self/pagemap`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::error::MemoryError;

/// Bits 0-54 of a pagemap entry hold the page-frame number.
const PFN_MASK: u64 = 0x007f_ffff_ffff_ffff;

/// The system's normal page size, queried once per call (a cached sysconf
/// lookup in glibc).
pub fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// Resolve the physical address backing the given virtual address in this
/// process. The caller must have already touched the page so it is
/// present; a page not present in the pagemap is a `MemoryError::Mapping`.
pub fn virt_to_phys(virt_addr: usize) -> Result<u64, MemoryError> {
    let page_size = page_size();
    let mut pagemap = File::open("/proc/self/pagemap")
        .map_err(|e| MemoryError::Resource(format!("opening /proc/self/pagemap: {}", e)))?;

    let offset = (virt_addr / page_size) as u64 * 8;
    pagemap
        .seek(SeekFrom::Start(offset))
        .map_err(|e| MemoryError::Resource(format!("seeking pagemap: {}", e)))?;

    let mut entry_bytes = [0u8; 8];
    pagemap
        .read_exact(&mut entry_bytes)
        .map_err(|e| MemoryError::Resource(format!("reading pagemap: {}", e)))?;
    let entry = u64::from_ne_bytes(entry_bytes);

    if entry == 0 {
        return Err(MemoryError::Mapping(format!(
            "virtual address {:#x} has no backing physical page",
            virt_addr
        )));
    }

    let pfn = entry & PFN_MASK;
    Ok(pfn * page_size as u64 + (virt_addr % page_size) as u64)
}

/// Check that `size` bytes starting at `virt_addr` (both page-aligned) are
/// backed by physically contiguous pages.
pub fn is_contiguous(virt_addr: usize, size: usize) -> Result<bool, MemoryError> {
    let page_size = page_size();
    let phys_base = virt_to_phys(virt_addr)?;

    let mut offset = 0usize;
    while offset < size {
        let phys = virt_to_phys(virt_addr + offset)?;
        if phys.wrapping_sub(phys_base) != offset as u64 {
            return Ok(false);
        }
        offset += page_size;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_a_live_stack_address() {
        let x: u8 = 0;
        let addr = &x as *const u8 as usize;
        let phys = virt_to_phys(addr).expect("stack page must be present");
        assert_ne!(phys, 0);
    }

    #[test]
    fn contiguity_check_holds_for_a_single_page() {
        let size = page_size();
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(addr, libc::MAP_FAILED);
        unsafe {
            std::ptr::write_volatile(addr as *mut u8, 0);
        }
        // A single page is trivially contiguous with itself.
        assert!(is_contiguous(addr as usize, size).unwrap());
        unsafe {
            libc::munmap(addr, size);
        }
    }
}
