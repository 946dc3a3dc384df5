// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! importer: Wraps a buffer allocated elsewhere, received as a `BufferHandle`, in a local buffer
//! object.  No memory is allocated and the tiling is whatever the memory manager reports.

use std::sync::Arc;

use log::error;

use crate::gralloc::buffer::*;
use crate::gralloc::formats::bytes_per_pixel;
use crate::gralloc::manager::BackingStore;
use crate::gralloc::manager::MemoryManager;
use crate::gralloc_utils::*;

pub struct BufferImporter {
    manager: Arc<dyn MemoryManager>,
}

impl BufferImporter {
    pub fn new(manager: Arc<dyn MemoryManager>) -> BufferImporter {
        BufferImporter { manager }
    }

    /// Imports the buffer behind `handle`.  The caller keeps ownership of the handle.
    pub fn import(&self, handle: &BufferHandle) -> GrallocResult<BufferObject> {
        let request = handle.request();
        if request.width == 0 || request.height == 0 {
            error!(
                "invalid buffer dimensions {}x{}",
                request.width, request.height
            );
            return Err(GrallocError::InvalidGrallocDimensions);
        }

        let bpp = bytes_per_pixel(request.format)?;
        let width = request.width;
        let min_stride = checked_arithmetic!(width * bpp)?;
        if handle.stride < min_stride {
            error!(
                "stride {} too small for a {} pixel row of {:?}",
                handle.stride, width, request.format
            );
            return Err(GrallocError::ImportFailed("stride is smaller than a row"));
        }

        let bo_handle = self
            .manager
            .import_descriptor(&handle.descriptor)
            .map_err(|e| {
                error!("failed to import {:?}: {}", handle.descriptor, e);
                match e {
                    GrallocError::ImportFailed(_) => e,
                    _ => GrallocError::ImportFailed("descriptor could not be resolved"),
                }
            })?;

        // From here on the reference is released when `store` goes out of scope.
        let store = BackingStore::new(self.manager.clone(), bo_handle);
        let tiling = self.manager.get_tiling(bo_handle).map_err(|e| {
            error!("failed to get tiling of {:?}: {}", bo_handle, e);
            GrallocError::ImportFailed("tiling query failed")
        })?;

        Ok(BufferObject::new(
            store,
            tiling,
            handle.stride,
            None,
            request,
            BufferOrigin::Imported,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gralloc::formats::HalFormat;
    use crate::gralloc::test_utils::*;
    use crate::gralloc::tiling::TilingMode;
    use crate::gralloc::usage::GrallocUsage;
    use crate::gralloc_os::SharedMemory;

    fn handle(stride: u32) -> BufferHandle {
        BufferHandle {
            descriptor: SharedMemory::new("import-test", 4096).unwrap().into(),
            format: HalFormat::RGBA_8888,
            width: 256,
            height: 4,
            usage: GrallocUsage::HW_TEXTURE,
            stride,
        }
    }

    #[test]
    fn tiling_is_discovered() {
        init_logger();
        let manager = MockMemoryManager::new();
        manager.configure(|state| state.import_tiling = TilingMode::Y);
        let importer = BufferImporter::new(manager.clone());

        let mut bo = importer.import(&handle(1024)).unwrap();
        assert_eq!(bo.tiling(), TilingMode::Y);
        assert_eq!(bo.stride(), 1024);
        assert_eq!(bo.origin(), BufferOrigin::Imported);
        assert!(bo.descriptor().is_none());

        // Re-exporting creates the descriptor on demand.
        bo.export_handle().unwrap();
        assert!(bo.descriptor().is_some());

        bo.free();
        assert_eq!(manager.live_handles(), 0);
    }

    #[test]
    fn failed_tiling_query_releases_store() {
        init_logger();
        let manager = MockMemoryManager::new();
        manager.configure(|state| state.fail_get_tiling = true);
        let importer = BufferImporter::new(manager.clone());

        assert!(matches!(
            importer.import(&handle(1024)),
            Err(GrallocError::ImportFailed(_))
        ));
        assert_eq!(manager.live_handles(), 0);
        assert!(matches!(
            manager.calls().last(),
            Some(ManagerCall::Release(_))
        ));
    }

    #[test]
    fn unresolvable_descriptor() {
        init_logger();
        let manager = MockMemoryManager::new();
        manager.configure(|state| state.fail_import = true);
        let importer = BufferImporter::new(manager.clone());

        assert!(matches!(
            importer.import(&handle(1024)),
            Err(GrallocError::ImportFailed(_))
        ));
        assert_eq!(manager.calls(), vec![ManagerCall::Import]);
    }

    #[test]
    fn inconsistent_metadata() {
        let manager = MockMemoryManager::new();
        let importer = BufferImporter::new(manager.clone());

        assert!(matches!(
            importer.import(&handle(1000)),
            Err(GrallocError::ImportFailed(_))
        ));

        let mut bad_format = handle(1024);
        bad_format.format = HalFormat(0x42);
        assert!(matches!(
            importer.import(&bad_format),
            Err(GrallocError::UnsupportedFormat(0x42))
        ));
        assert!(manager.calls().is_empty());
    }
}
