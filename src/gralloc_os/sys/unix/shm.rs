// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::convert::TryInto;
use std::ffi::CStr;
use std::os::unix::io::OwnedFd;

use libc::off_t;
use nix::sys::memfd::memfd_create;
use nix::sys::memfd::MemFdCreateFlag;
use nix::unistd::ftruncate;
use nix::unistd::sysconf;
use nix::unistd::SysconfVar;
use vmm_sys_util::align_upwards;

use crate::gralloc_os::descriptor::AsRawDescriptor;
use crate::gralloc_os::descriptor::IntoRawDescriptor;
use crate::gralloc_os::RawDescriptor;
use crate::gralloc_utils::GrallocError;
use crate::gralloc_utils::GrallocResult;

pub struct SharedMemory {
    fd: OwnedFd,
}

impl SharedMemory {
    /// Creates a new shared memory file descriptor of `size` bytes.
    ///
    /// The name appears in `/proc/self/fd/<shm fd>` as `/memfd:<name>`. The file descriptor is
    /// opened with the close on exec flag and allows memfd sealing.
    pub fn new(debug_name: &CStr, size: u64) -> GrallocResult<SharedMemory> {
        let fd = memfd_create(
            debug_name,
            MemFdCreateFlag::MFD_CLOEXEC | MemFdCreateFlag::MFD_ALLOW_SEALING,
        )?;

        let size_off_t: off_t = size.try_into()?;
        ftruncate(&fd, size_off_t)?;

        Ok(SharedMemory { fd })
    }
}

impl AsRawDescriptor for SharedMemory {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.fd.as_raw_descriptor()
    }
}

impl IntoRawDescriptor for SharedMemory {
    fn into_raw_descriptor(self) -> RawDescriptor {
        self.fd.into_raw_descriptor()
    }
}

/// Uses the system's page size in bytes to round the given value up to the nearest page boundary.
pub fn round_up_to_page_size(v: u64) -> GrallocResult<u64> {
    let page_size_opt = sysconf(SysconfVar::PAGE_SIZE)?;
    if let Some(page_size) = page_size_opt {
        let aligned_size = align_upwards!(v, page_size as u64);
        Ok(aligned_size)
    } else {
        Err(GrallocError::ManagerError(-libc::EINVAL))
    }
}
