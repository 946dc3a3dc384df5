// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::num::NonZeroUsize;
use std::os::unix::io::BorrowedFd;
use std::ptr::NonNull;

use libc::c_void;
use log::error;
use nix::sys::mman::mmap;
use nix::sys::mman::munmap;
use nix::sys::mman::MapFlags;
use nix::sys::mman::ProtFlags;

use crate::gralloc_os::descriptor::AsRawDescriptor;
use crate::gralloc_utils::GrallocError;
use crate::gralloc_utils::GrallocResult;

/// Wraps a shared memory mapping in the current process. Provides RAII semantics including
/// munmap when no longer needed.
#[derive(Debug)]
pub struct MemoryMapping {
    pub addr: NonNull<c_void>,
    pub size: usize,
}

// The mapping is plain shared memory; access is synchronized by the owner.
unsafe impl Send for MemoryMapping {}
unsafe impl Sync for MemoryMapping {}

impl Drop for MemoryMapping {
    fn drop(&mut self) {
        // This is safe because we mmap the area at addr ourselves, and nobody
        // else is holding a reference to it.
        if let Err(e) = unsafe { munmap(self.addr, self.size) } {
            error!("failed to unmap {} bytes: {}", self.size, e);
        }
    }
}

impl MemoryMapping {
    pub fn from_descriptor(
        descriptor: &dyn AsRawDescriptor,
        size: usize,
        writable: bool,
    ) -> GrallocResult<MemoryMapping> {
        let non_zero_size =
            NonZeroUsize::new(size).ok_or(GrallocError::MapFailed("zero size mapping"))?;
        let prot = if writable {
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE
        } else {
            ProtFlags::PROT_READ
        };

        // Safe because the descriptor outlives this call and mmap takes its own reference to the
        // underlying file.
        let addr = unsafe {
            let fd = BorrowedFd::borrow_raw(descriptor.as_raw_descriptor());
            mmap(None, non_zero_size, prot, MapFlags::MAP_SHARED, fd, 0)?
        };
        Ok(MemoryMapping { addr, size })
    }
}
