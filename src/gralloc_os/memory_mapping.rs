// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::gralloc_os::sys::platform::MemoryMapping as PlatformMapping;
use crate::gralloc_os::AsRawDescriptor;
use crate::gralloc_os::MappedRegion;
use crate::gralloc_utils::GrallocResult;

pub struct MemoryMapping {
    mapping: PlatformMapping,
}

impl MemoryMapping {
    /// Maps `size` bytes of `descriptor` shared, read-only unless `writable` is set.
    pub fn from_descriptor(
        descriptor: &dyn AsRawDescriptor,
        size: usize,
        writable: bool,
    ) -> GrallocResult<MemoryMapping> {
        let mapping = PlatformMapping::from_descriptor(descriptor, size, writable)?;
        Ok(MemoryMapping { mapping })
    }
}

unsafe impl MappedRegion for MemoryMapping {
    fn as_ptr(&self) -> *mut u8 {
        self.mapping.addr.as_ptr() as *mut u8
    }

    fn size(&self) -> usize {
        self.mapping.size
    }
}
