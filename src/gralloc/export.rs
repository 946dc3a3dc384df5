// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! export: Describes a buffer to consumers that only understand raw plane geometry, such as a
//! display controller or a compositor.

use std::fmt;
use std::sync::Arc;

use log::error;

use crate::gralloc::buffer::BufferObject;
use crate::gralloc::formats::*;
use crate::gralloc::geometry::*;
use crate::gralloc::manager::*;
use crate::gralloc_utils::*;

/// A buffer as seen by a consumer with its own memory manager.  Holds one consumer-side
/// reference to the backing store.
pub struct ConsumerBuffer {
    pub format: DrmFormat,
    pub width: u32,
    pub height: u32,
    pub planes: PlaneLayout,
    store: BackingStore,
}

impl ConsumerBuffer {
    /// Handle of the store in the consumer's memory manager.
    pub fn handle(&self) -> BoHandle {
        self.store.handle()
    }
}

impl fmt::Debug for ConsumerBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerBuffer")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("planes", &self.planes)
            .field("store", &self.store)
            .finish()
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct ExportResolver {
    aligner: GeometryAligner,
}

impl ExportResolver {
    pub fn new(aligner: GeometryAligner) -> ExportResolver {
        ExportResolver { aligner }
    }

    /// Plane pitches, offsets and handles of `bo`, with plane 0 at its real stride.
    pub fn resolve_planes(&self, bo: &BufferObject) -> GrallocResult<PlaneLayout> {
        let format = wire_format_for(bo.format(), bo.usage())?;
        plane_layout(format, bo.stride(), bo.native_handle().0, bo.height())
    }

    /// Imports `bo` into `consumer` and describes it in the consumer's terms.  Width and height
    /// are the aligned geometry for the reported format.
    pub fn resolve_buffer(
        &self,
        bo: &mut BufferObject,
        consumer: Arc<dyn MemoryManager>,
    ) -> GrallocResult<ConsumerBuffer> {
        let exported = bo.export_handle()?;
        let handle = consumer
            .import_descriptor(&exported.descriptor)
            .map_err(|e| {
                error!("consumer failed to import {:?}: {}", bo.native_handle(), e);
                e
            })?;
        let store = BackingStore::new(consumer, handle);

        let format = wire_format_for(bo.format(), bo.usage())?;
        let (width, height) =
            self.aligner
                .align_geometry(format, bo.usage(), bo.width(), bo.height())?;
        let planes = plane_layout(format, bo.stride(), handle.0, bo.height())?;

        Ok(ConsumerBuffer {
            format,
            width,
            height,
            planes,
            store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gralloc::allocator::BufferAllocator;
    use crate::gralloc::buffer::AllocationRequest;
    use crate::gralloc::test_utils::*;
    use crate::gralloc::tiling::*;
    use crate::gralloc::usage::GrallocUsage;

    fn allocate(manager: &Arc<MockMemoryManager>, request: AllocationRequest) -> BufferObject {
        init_logger();
        BufferAllocator::new(
            GeometryAligner::default(),
            TilingSelector::default(),
            manager.clone(),
        )
        .allocate(&request)
        .unwrap()
    }

    #[test]
    fn planar_video() {
        let manager = MockMemoryManager::new();
        let request = AllocationRequest::new(HalFormat::YV12, 100, 60, GrallocUsage::HW_TEXTURE);
        let bo = allocate(&manager, request);
        assert_eq!(bo.stride(), 128);

        let resolver = ExportResolver::default();
        let planes = resolver.resolve_planes(&bo).unwrap();
        let handle = bo.native_handle().0;
        assert_eq!(planes.format, DrmFormat::from_bytes(DRM_FORMAT_YUV420));
        assert_eq!(planes.pitches, [128, 64, 64, 0]);
        assert_eq!(planes.offsets, [0, 128 * 60 + 64 * 30, 128 * 60, 0]);
        assert_eq!(planes.handles, [handle, handle, handle, 0]);

        assert_eq!(resolver.resolve_planes(&bo).unwrap(), planes);
    }

    #[test]
    fn cursor_is_argb() {
        let manager = MockMemoryManager::new();
        let request = AllocationRequest::new(HalFormat::RGBA_8888, 20, 20, GrallocUsage::CURSOR);
        let bo = allocate(&manager, request);

        let planes = ExportResolver::default().resolve_planes(&bo).unwrap();
        assert_eq!(planes.format, DrmFormat::from_bytes(DRM_FORMAT_ARGB8888));
        assert_eq!(planes.pitches, [256, 0, 0, 0]);
        assert_eq!(bo.tiling(), TilingMode::None);
    }

    #[test]
    fn consumer_reference() {
        let manager = MockMemoryManager::new();
        let request = AllocationRequest::new(HalFormat::RGB_565, 33, 17, GrallocUsage::HW_FB);
        let mut bo = allocate(&manager, request);

        let consumer = MockMemoryManager::new();
        let resolved = ExportResolver::new(GeometryAligner::new(64, 64))
            .resolve_buffer(&mut bo, consumer.clone())
            .unwrap();
        assert_eq!(resolved.format, DrmFormat::from_bytes(DRM_FORMAT_RGB565));
        assert_eq!((resolved.width, resolved.height), (64, 17));
        assert_eq!(resolved.planes.pitches[0], bo.stride());
        assert_eq!(resolved.planes.handles[0], resolved.handle().0);
        assert_eq!(consumer.live_handles(), 1);

        drop(resolved);
        assert_eq!(consumer.live_handles(), 0);
        assert_eq!(manager.live_handles(), 1);
    }
}
