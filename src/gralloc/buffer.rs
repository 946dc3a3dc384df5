// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! buffer: The buffer object shared by the allocation and import paths, and the handle that
//! carries it across a process boundary.

use log::debug;
use log::error;

use crate::gralloc::formats::HalFormat;
use crate::gralloc::manager::BackingStore;
use crate::gralloc::manager::BoHandle;
use crate::gralloc::manager::MapVariant;
use crate::gralloc::tiling::TilingMode;
use crate::gralloc::usage::GrallocUsage;
use crate::gralloc_os::SafeDescriptor;
use crate::gralloc_utils::*;

/// Logical description of a buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AllocationRequest {
    pub format: HalFormat,
    pub width: u32,
    pub height: u32,
    pub usage: GrallocUsage,
}

impl AllocationRequest {
    pub fn new(
        format: HalFormat,
        width: u32,
        height: u32,
        usage: GrallocUsage,
    ) -> AllocationRequest {
        AllocationRequest {
            format,
            width,
            height,
            usage,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferOrigin {
    Allocated,
    Imported,
}

/// What travels to another process: the descriptor plus the metadata needed to rebuild the
/// buffer object there.
#[derive(Debug)]
pub struct BufferHandle {
    pub descriptor: SafeDescriptor,
    pub format: HalFormat,
    pub width: u32,
    pub height: u32,
    pub usage: GrallocUsage,
    pub stride: u32,
}

impl BufferHandle {
    pub fn request(&self) -> AllocationRequest {
        AllocationRequest::new(self.format, self.width, self.height, self.usage)
    }

    /// Duplicates the descriptor so the handle can be sent more than once.
    pub fn try_clone(&self) -> GrallocResult<BufferHandle> {
        Ok(BufferHandle {
            descriptor: self.descriptor.try_clone()?,
            format: self.format,
            width: self.width,
            height: self.height,
            usage: self.usage,
            stride: self.stride,
        })
    }
}

/// A buffer backed by one reference to a memory manager store.
///
/// Only `BufferAllocator::allocate` and `BufferImporter::import` construct one, and only once the
/// store, tiling and stride are all known.  Dropping it unmaps it if needed, then releases the
/// store reference and any cached descriptor.
#[derive(Debug)]
pub struct BufferObject {
    store: BackingStore,
    tiling: TilingMode,
    stride: u32,
    descriptor: Option<SafeDescriptor>,
    request: AllocationRequest,
    origin: BufferOrigin,
    mapped: Option<MapVariant>,
}

impl BufferObject {
    pub(crate) fn new(
        store: BackingStore,
        tiling: TilingMode,
        stride: u32,
        descriptor: Option<SafeDescriptor>,
        request: AllocationRequest,
        origin: BufferOrigin,
    ) -> BufferObject {
        BufferObject {
            store,
            tiling,
            stride,
            descriptor,
            request,
            origin,
            mapped: None,
        }
    }

    pub fn tiling(&self) -> TilingMode {
        self.tiling
    }

    /// Row pitch of plane 0 in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Process-local handle of the backing store.
    pub fn native_handle(&self) -> BoHandle {
        self.store.handle()
    }

    pub fn request(&self) -> &AllocationRequest {
        &self.request
    }

    pub fn format(&self) -> HalFormat {
        self.request.format
    }

    pub fn width(&self) -> u32 {
        self.request.width
    }

    pub fn height(&self) -> u32 {
        self.request.height
    }

    pub fn usage(&self) -> GrallocUsage {
        self.request.usage
    }

    pub fn origin(&self) -> BufferOrigin {
        self.origin
    }

    pub fn descriptor(&self) -> Option<&SafeDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Tiled buffers and scanout surfaces are accessed through the aperture.
    fn map_variant(&self) -> MapVariant {
        if !self.tiling.is_linear() || self.request.usage.uses_scanout() {
            MapVariant::Aperture
        } else {
            MapVariant::Linear
        }
    }

    /// Maps the whole buffer for CPU access.  `region` is advisory.
    pub fn map(&mut self, region: Rect, writable: bool) -> GrallocResult<GrallocMapping> {
        if self.mapped.is_some() {
            return Err(GrallocError::MapFailed("buffer is already mapped"));
        }

        debug!(
            "mapping {:?} ({:?} requested, writable {})",
            self.native_handle(),
            region,
            writable
        );

        let variant = self.map_variant();
        let manager = self.store.manager();
        let handle = self.store.handle();
        let mapping = match variant {
            MapVariant::Aperture => manager.map_aperture(handle),
            MapVariant::Linear => manager.map_linear(handle, writable),
        }
        .map_err(|e| {
            error!("failed to map {:?}: {}", handle, e);
            e
        })?;

        self.mapped = Some(variant);
        Ok(mapping)
    }

    /// Undoes `map` with the same mapping variant.
    pub fn unmap(&mut self) -> GrallocResult<()> {
        let variant = self
            .mapped
            .ok_or(GrallocError::MapFailed("buffer is not mapped"))?;

        let manager = self.store.manager();
        let handle = self.store.handle();
        match variant {
            MapVariant::Aperture => manager.unmap_aperture(handle)?,
            MapVariant::Linear => manager.unmap_linear(handle)?,
        }

        self.mapped = None;
        Ok(())
    }

    /// Returns a handle another process can import.  The descriptor is created on first use and
    /// cached; every call hands out a duplicate.
    pub fn export_handle(&mut self) -> GrallocResult<BufferHandle> {
        if self.descriptor.is_none() {
            let descriptor = self.store.manager().export_descriptor(self.store.handle())?;
            self.descriptor = Some(descriptor);
        }

        let descriptor = match &self.descriptor {
            Some(descriptor) => descriptor.try_clone()?,
            None => return Err(GrallocError::ManagerError(-libc::EBADF)),
        };

        Ok(BufferHandle {
            descriptor,
            format: self.request.format,
            width: self.request.width,
            height: self.request.height,
            usage: self.request.usage,
            stride: self.stride,
        })
    }

    /// Releases the backing store reference and the cached descriptor.  Same as dropping `self`.
    pub fn free(self) {
        drop(self)
    }
}

impl Drop for BufferObject {
    // A mapping still in place is torn down before the store reference goes away.
    fn drop(&mut self) {
        if self.mapped.is_some() {
            if let Err(e) = self.unmap() {
                error!("failed to unmap {:?} on release: {}", self.native_handle(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::gralloc::manager::MemoryManager;
    use crate::gralloc::test_utils::*;

    fn buffer(
        manager: &Arc<MockMemoryManager>,
        tiling: TilingMode,
        usage: GrallocUsage,
    ) -> BufferObject {
        let handle = manager.state.lock().unwrap().live.len() as u32 + 100;
        manager
            .state
            .lock()
            .unwrap()
            .live
            .insert(BoHandle(handle), (tiling, 1));
        let manager: Arc<dyn MemoryManager> = manager.clone();
        BufferObject::new(
            BackingStore::new(manager, BoHandle(handle)),
            tiling,
            256,
            None,
            AllocationRequest::new(HalFormat::RGBA_8888, 64, 64, usage),
            BufferOrigin::Allocated,
        )
    }

    #[test]
    fn map_variant_follows_layout() {
        let manager = MockMemoryManager::new();

        let mut linear = buffer(&manager, TilingMode::None, GrallocUsage::SW_READ_OFTEN);
        let h = linear.native_handle();
        linear.map(Rect::new(0, 0, 64, 64), true).unwrap();
        assert!(linear.is_mapped());
        linear.unmap().unwrap();
        assert!(!linear.is_mapped());

        let mut tiled = buffer(&manager, TilingMode::X, GrallocUsage::HW_RENDER);
        let t = tiled.native_handle();
        tiled.map(Rect::default(), false).unwrap();
        tiled.unmap().unwrap();

        let mut scanout = buffer(&manager, TilingMode::None, GrallocUsage::HW_FB);
        let s = scanout.native_handle();
        scanout.map(Rect::default(), true).unwrap();
        scanout.unmap().unwrap();

        assert_eq!(
            manager.calls(),
            vec![
                ManagerCall::MapLinear(h, true),
                ManagerCall::UnmapLinear(h),
                ManagerCall::MapAperture(t),
                ManagerCall::UnmapAperture(t),
                ManagerCall::MapAperture(s),
                ManagerCall::UnmapAperture(s),
            ]
        );
    }

    #[test]
    fn unmap_without_map() {
        let manager = MockMemoryManager::new();
        let mut bo = buffer(&manager, TilingMode::None, GrallocUsage::empty());
        assert!(matches!(bo.unmap(), Err(GrallocError::MapFailed(_))));

        bo.map(Rect::default(), false).unwrap();
        assert!(matches!(
            bo.map(Rect::default(), false),
            Err(GrallocError::MapFailed(_))
        ));
    }

    #[test]
    fn retry_after_failed_map() {
        let manager = MockMemoryManager::new();
        let mut bo = buffer(&manager, TilingMode::Y, GrallocUsage::HW_RENDER);
        let handle = bo.native_handle();

        manager.configure(|state| state.fail_map = true);
        assert!(matches!(
            bo.map(Rect::default(), true),
            Err(GrallocError::MapFailed(_))
        ));
        assert!(!bo.is_mapped());
        assert!(bo.unmap().is_err());

        manager.configure(|state| state.fail_map = false);
        bo.map(Rect::default(), true).unwrap();
        assert!(bo.is_mapped());
        bo.unmap().unwrap();
        assert_eq!(manager.live_handles(), 1);

        assert_eq!(
            manager.calls(),
            vec![
                ManagerCall::MapAperture(handle),
                ManagerCall::MapAperture(handle),
                ManagerCall::UnmapAperture(handle),
            ]
        );
    }

    #[test]
    fn drop_unmaps() {
        let manager = MockMemoryManager::new();
        let mut bo = buffer(&manager, TilingMode::None, GrallocUsage::SW_READ_OFTEN);
        let handle = bo.native_handle();
        bo.map(Rect::default(), false).unwrap();

        drop(bo);
        assert_eq!(
            manager.calls(),
            vec![
                ManagerCall::MapLinear(handle, false),
                ManagerCall::UnmapLinear(handle),
                ManagerCall::Release(handle),
            ]
        );
    }

    #[test]
    fn lazy_export() {
        let manager = MockMemoryManager::new();
        let mut bo = buffer(&manager, TilingMode::X, GrallocUsage::HW_TEXTURE);
        assert!(bo.descriptor().is_none());

        let handle = bo.export_handle().unwrap();
        assert!(bo.descriptor().is_some());
        assert_eq!(handle.stride, 256);
        assert_eq!(handle.request(), *bo.request());

        bo.export_handle().unwrap();
        let exports = manager
            .calls()
            .into_iter()
            .filter(|call| matches!(call, ManagerCall::Export(_)))
            .count();
        assert_eq!(exports, 1);
    }

    #[test]
    fn free_releases_once() {
        let manager = MockMemoryManager::new();
        let mut bo = buffer(&manager, TilingMode::None, GrallocUsage::empty());
        let handle = bo.native_handle();
        bo.map(Rect::default(), true).unwrap();
        assert_eq!(manager.live_handles(), 1);

        bo.free();
        assert_eq!(manager.live_handles(), 0);

        let calls = manager.calls();
        assert_eq!(calls[calls.len() - 2], ManagerCall::UnmapLinear(handle));
        assert_eq!(calls[calls.len() - 1], ManagerCall::Release(handle));
    }
}
