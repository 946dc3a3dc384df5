// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::ffi::CString;

use crate::gralloc_os::sys::platform::SharedMemory as SysUtilSharedMemory;
use crate::gralloc_os::AsRawDescriptor;
use crate::gralloc_os::FromRawDescriptor;
use crate::gralloc_os::IntoRawDescriptor;
use crate::gralloc_os::RawDescriptor;
use crate::gralloc_os::SafeDescriptor;
use crate::gralloc_utils::GrallocResult;

pub struct SharedMemory(pub(crate) SysUtilSharedMemory);
impl SharedMemory {
    /// Creates a new shared memory object of the given size.
    ///
    /// |name| shows up in `/proc/self/fd/<fd>` and survives being passed to another process, which
    /// is how buffer metadata such as the tiling mode travels with the descriptor.
    pub fn new<T: Into<Vec<u8>>>(debug_name: T, size: u64) -> GrallocResult<SharedMemory> {
        let debug_name = CString::new(debug_name)?;
        SysUtilSharedMemory::new(&debug_name, size).map(SharedMemory)
    }
}

impl AsRawDescriptor for SharedMemory {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.0.as_raw_descriptor()
    }
}

impl IntoRawDescriptor for SharedMemory {
    fn into_raw_descriptor(self) -> RawDescriptor {
        self.0.into_raw_descriptor()
    }
}

impl From<SharedMemory> for SafeDescriptor {
    fn from(sm: SharedMemory) -> SafeDescriptor {
        // Safe because we own the SharedMemory at this point.
        unsafe { SafeDescriptor::from_raw_descriptor(sm.into_raw_descriptor()) }
    }
}
