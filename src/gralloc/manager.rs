// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! manager: The buffer-manager seam.  Everything that touches real GPU memory goes through the
//! `MemoryManager` trait.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::gralloc::tiling::TilingMode;
use crate::gralloc_os::SafeDescriptor;
use crate::gralloc_utils::*;

bitflags! {
    /// Hints passed along with an allocation.
    #[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
    pub struct AllocFlags: u32 {
        /// The buffer will be rendered to soon, so skip any cached-but-busy storage.
        const FOR_RENDER = 1 << 0;
    }
}

/// Process-local name of a backing store, as understood by one `MemoryManager`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct BoHandle(pub u32);

/// Parameters of a tiled allocation.  `width` and `height` are already aligned.
#[derive(Copy, Clone, Debug)]
pub struct TiledAllocParams<'a> {
    pub name: &'a str,
    pub width: u32,
    pub height: u32,
    pub bpp: u32,
    pub tiling: TilingMode,
    pub flags: AllocFlags,
}

/// Result of a successful tiled allocation.  The manager may have picked a less dense tiling
/// than requested, and the pitch reflects its own rounding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TiledAllocation {
    pub handle: BoHandle,
    pub tiling: TilingMode,
    pub stride: u32,
    pub size: u64,
}

/// How a backing store is made CPU-visible.  A store must be unmapped with the variant it was
/// mapped with.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MapVariant {
    /// Direct CPU mapping of the pages.
    Linear,
    /// Mapping through the GPU aperture, which detiles on access.
    Aperture,
}

/// Trait that needs to be implemented by the buffer manager that owns GPU memory.  Every handle
/// returned by `allocate_tiled` or `import_descriptor` carries one reference that must be given
/// back with `release_reference`.
pub trait MemoryManager: Send + Sync {
    /// Allocates a backing store.  Returns the handle together with the tiling and pitch that
    /// were actually used.
    fn allocate_tiled(&self, params: &TiledAllocParams) -> GrallocResult<TiledAllocation>;

    /// Drops one reference to `handle`.  The memory is freed with the last reference.
    fn release_reference(&self, handle: BoHandle);

    /// Keeps the store out of the manager's reuse cache once released.
    fn disable_reuse(&self, handle: BoHandle) -> GrallocResult<()>;

    /// Stops the manager from synchronizing access to the store across contexts.
    fn disable_implicit_sync(&self, handle: BoHandle) -> GrallocResult<()>;

    /// Returns the tiling the store was created with.
    fn get_tiling(&self, handle: BoHandle) -> GrallocResult<TilingMode>;

    fn map_linear(&self, handle: BoHandle, writable: bool) -> GrallocResult<GrallocMapping>;

    fn map_aperture(&self, handle: BoHandle) -> GrallocResult<GrallocMapping>;

    fn unmap_linear(&self, handle: BoHandle) -> GrallocResult<()>;

    fn unmap_aperture(&self, handle: BoHandle) -> GrallocResult<()>;

    /// Creates a descriptor another process can import.
    fn export_descriptor(&self, handle: BoHandle) -> GrallocResult<SafeDescriptor>;

    /// Resolves a descriptor to a local handle, taking a new reference.
    fn import_descriptor(&self, descriptor: &SafeDescriptor) -> GrallocResult<BoHandle>;
}

/// One reference to a backing store.  Released exactly once, when dropped.
pub struct BackingStore {
    handle: BoHandle,
    manager: Arc<dyn MemoryManager>,
}

impl BackingStore {
    /// Takes ownership of one reference to `handle`.
    pub fn new(manager: Arc<dyn MemoryManager>, handle: BoHandle) -> BackingStore {
        BackingStore { handle, manager }
    }

    pub fn handle(&self) -> BoHandle {
        self.handle
    }

    pub fn manager(&self) -> &dyn MemoryManager {
        self.manager.as_ref()
    }
}

impl fmt::Debug for BackingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackingStore")
            .field("handle", &self.handle)
            .finish()
    }
}

impl Drop for BackingStore {
    fn drop(&mut self) {
        self.manager.release_reference(self.handle);
    }
}
