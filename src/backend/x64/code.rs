//! Executable code buffers.
//!
//! Emission happens into ordinary memory; publication copies the bytes
//! into a fresh anonymous mapping and flips it read+execute, so published
//! code is never writable.

use std::ptr;

/// A finalized, executable code region.
pub struct CodeBuffer {
    ptr: *mut u8,
    len: usize,
}

// Published code is immutable.
unsafe impl Send for CodeBuffer {}
unsafe impl Sync for CodeBuffer {}

impl CodeBuffer {
    /// Maps `code` into executable memory.
    ///
    /// # Panics
    ///
    /// Panics if the host refuses the mapping; there is no reasonable
    /// recovery for a translator that cannot allocate code memory.
    pub fn publish(code: &[u8]) -> Self {
        assert!(!code.is_empty());
        let len = code.len();
        // Safety: anonymous private mapping, then a protection flip once
        // the bytes are in place.
        unsafe {
            let ptr = libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            assert!(ptr != libc::MAP_FAILED, "code buffer mmap failed");
            ptr::copy_nonoverlapping(code.as_ptr(), ptr as *mut u8, len);
            let rc = libc::mprotect(ptr, len, libc::PROT_READ | libc::PROT_EXEC);
            assert_eq!(rc, 0, "code buffer mprotect failed");
            Self {
                ptr: ptr as *mut u8,
                len,
            }
        }
    }

    /// Entry point of the published code.
    pub fn entry(&self) -> *const u8 {
        self.ptr
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Never empty; kept for interface symmetry.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        // Safety: mapped in `publish` with this exact length.
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}
