// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! allocator: Turns an allocation request into a buffer object backed by freshly allocated
//! memory.

use std::sync::Arc;

use log::error;
use log::warn;

use crate::gralloc::buffer::*;
use crate::gralloc::formats::*;
use crate::gralloc::geometry::GeometryAligner;
use crate::gralloc::manager::*;
use crate::gralloc::tiling::*;
use crate::gralloc_utils::*;

/// Allocates buffers through a `MemoryManager`.
pub struct BufferAllocator {
    aligner: GeometryAligner,
    selector: TilingSelector,
    manager: Arc<dyn MemoryManager>,
    explicit_sync: bool,
}

impl BufferAllocator {
    pub fn new(
        aligner: GeometryAligner,
        selector: TilingSelector,
        manager: Arc<dyn MemoryManager>,
    ) -> BufferAllocator {
        BufferAllocator {
            aligner,
            selector,
            manager,
            explicit_sync: true,
        }
    }

    /// With explicit sync (the default), implicit synchronization is turned off on every new
    /// backing store.
    pub fn use_explicit_sync(mut self, e: bool) -> BufferAllocator {
        self.explicit_sync = e;
        self
    }

    /// Allocates a buffer for `request`.  Either a fully initialized buffer object is returned,
    /// or nothing is left allocated.
    pub fn allocate(&self, request: &AllocationRequest) -> GrallocResult<BufferObject> {
        if request.width == 0 || request.height == 0 {
            error!(
                "invalid buffer dimensions {}x{}",
                request.width, request.height
            );
            return Err(GrallocError::InvalidGrallocDimensions);
        }

        let bpp = bytes_per_pixel(request.format)?;
        let format = to_wire_format(request.format)?;
        let (width, height) =
            self.aligner
                .align_geometry(format, request.usage, request.width, request.height)?;

        let plan = self.selector.select(format, request.usage, request.width);
        let params = TiledAllocParams {
            name: plan.name,
            width,
            height,
            bpp,
            tiling: plan.tiling,
            flags: plan.flags,
        };

        let allocation = match plan.max_pitch {
            Some(max_pitch) => self.allocate_scanout(params, max_pitch, format),
            None => self.allocate_once(&params, format),
        };

        let allocation = allocation.map_err(|e| {
            error!(
                "failed to allocate buffer {}x{} (format {:?}): {}",
                request.width, request.height, format, e
            );
            e
        })?;

        let store = BackingStore::new(self.manager.clone(), allocation.handle);
        let stride = allocation.stride;
        let min_stride = checked_arithmetic!(width * bpp)?;
        checked_range!(min_stride <= stride)?;

        if plan.is_display() {
            if let Err(e) = self.manager.disable_reuse(store.handle()) {
                warn!("cannot disable reuse of {:?}: {}", store.handle(), e);
            }
        }

        if self.explicit_sync {
            self.manager.disable_implicit_sync(store.handle())?;
        }

        let descriptor = self
            .manager
            .export_descriptor(store.handle())
            .map_err(|e| {
                error!("failed to export {:?}: {}", store.handle(), e);
                e
            })?;

        Ok(BufferObject::new(
            store,
            allocation.tiling,
            stride,
            Some(descriptor),
            *request,
            BufferOrigin::Allocated,
        ))
    }

    fn allocate_once(
        &self,
        params: &TiledAllocParams,
        format: DrmFormat,
    ) -> GrallocResult<TiledAllocation> {
        self.manager.allocate_tiled(params).map_err(|e| {
            error!("{}: tiling {} failed: {}", params.name, params.tiling, e);
            match e {
                GrallocError::ManagerError(_) => GrallocError::AllocationFailed {
                    width: params.width,
                    height: params.height,
                    format: format.0,
                },
                e => e,
            }
        })
    }

    /// Framebuffers and cursors must fit the display engine's pitch limit.  A tiled layout that
    /// fails or comes back too wide is retried once untiled, against the full 32 KiB limit.
    fn allocate_scanout(
        &self,
        mut params: TiledAllocParams,
        max_pitch: u32,
        format: DrmFormat,
    ) -> GrallocResult<TiledAllocation> {
        let mut max_pitch = max_pitch;
        let width = params.width;
        let bpp = params.bpp;

        let pitch = checked_arithmetic!(width * bpp)?;
        if pitch > max_pitch {
            params.tiling = TilingMode::None;
            max_pitch = MAX_SCANOUT_PITCH;
            if pitch > max_pitch {
                return Err(GrallocError::CapacityExceeded { pitch, max_pitch });
            }
            warn!("{}: pitch {} forces untiled layout", params.name, pitch);
        }

        loop {
            let failure = match self.allocate_once(&params, format) {
                Ok(allocation) if allocation.stride <= max_pitch => return Ok(allocation),
                Ok(allocation) => {
                    self.manager.release_reference(allocation.handle);
                    GrallocError::CapacityExceeded {
                        pitch: allocation.stride,
                        max_pitch,
                    }
                }
                Err(e) => e,
            };

            if params.tiling.is_linear() {
                return Err(failure);
            }

            warn!(
                "{}: {} with tiling {}, retrying untiled",
                params.name, failure, params.tiling
            );
            params.tiling = TilingMode::None;
            max_pitch = MAX_SCANOUT_PITCH;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gralloc::test_utils::*;
    use crate::gralloc::usage::GrallocUsage;

    fn allocator(manager: &Arc<MockMemoryManager>, generation: GenerationTier) -> BufferAllocator {
        init_logger();
        BufferAllocator::new(
            GeometryAligner::default(),
            TilingSelector::new(generation),
            manager.clone(),
        )
    }

    fn tilings(manager: &MockMemoryManager) -> Vec<TilingMode> {
        manager
            .allocations()
            .into_iter()
            .filter_map(|call| match call {
                ManagerCall::Allocate { tiling, .. } => Some(tiling),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn framebuffer_stays_tiled() {
        let manager = MockMemoryManager::new();
        let allocator = allocator(&manager, GenerationTier::Gen4);
        let request = AllocationRequest::new(HalFormat::RGBA_8888, 800, 600, GrallocUsage::HW_FB);

        let bo = allocator.allocate(&request).unwrap();
        assert_eq!(bo.tiling(), TilingMode::X);
        assert!(bo.stride() >= 800 * 4);
        assert!(bo.descriptor().is_some());
        assert_eq!(bo.origin(), BufferOrigin::Allocated);

        let handle = bo.native_handle();
        let calls = manager.calls();
        assert_eq!(
            calls[0],
            ManagerCall::Allocate {
                name: "gralloc-fb".to_string(),
                width: 832,
                height: 600,
                tiling: TilingMode::X,
                flags: AllocFlags::FOR_RENDER,
            }
        );
        assert_eq!(
            &calls[1..],
            &[
                ManagerCall::DisableReuse(handle),
                ManagerCall::DisableImplicitSync(handle),
                ManagerCall::Export(handle),
            ]
        );
    }

    #[test]
    fn wide_pitch_forces_untiled() {
        let manager = MockMemoryManager::new();
        let allocator = allocator(&manager, GenerationTier::Gen3);

        // 2560 * 4 exceeds the 8 KiB limit of the oldest tier but not 32 KiB.
        let request = AllocationRequest::new(HalFormat::RGBA_8888, 2560, 16, GrallocUsage::HW_FB);
        let bo = allocator.allocate(&request).unwrap();
        assert_eq!(bo.tiling(), TilingMode::None);
        assert_eq!(tilings(&manager), vec![TilingMode::None]);
    }

    #[test]
    fn unsupported_width() {
        let manager = MockMemoryManager::new();
        let allocator = allocator(&manager, GenerationTier::Gen7);

        let request = AllocationRequest::new(HalFormat::RGBA_8888, 8200, 16, GrallocUsage::HW_FB);
        assert!(matches!(
            allocator.allocate(&request),
            Err(GrallocError::CapacityExceeded {
                max_pitch: MAX_SCANOUT_PITCH,
                ..
            })
        ));
        assert!(manager.allocations().is_empty());
    }

    #[test]
    fn oversize_tiled_pitch_falls_back() {
        let manager = MockMemoryManager::new();
        manager.configure(|state| state.tiled_stride = Some(16 * 1024 + 512));
        let allocator = allocator(&manager, GenerationTier::Gen4);

        let request = AllocationRequest::new(HalFormat::RGBA_8888, 3840, 16, GrallocUsage::HW_FB);
        let bo = allocator.allocate(&request).unwrap();
        assert_eq!(bo.tiling(), TilingMode::None);
        assert_eq!(bo.stride(), 3840 * 4);
        assert_eq!(tilings(&manager), vec![TilingMode::X, TilingMode::None]);

        // The oversized store was given back.
        assert_eq!(manager.live_handles(), 1);
    }

    #[test]
    fn failed_tiled_allocation_falls_back() {
        let manager = MockMemoryManager::new();
        manager.configure(|state| state.fail_tiled = true);
        let allocator = allocator(&manager, GenerationTier::Gen7);

        let request = AllocationRequest::new(HalFormat::BGRA_8888, 1024, 768, GrallocUsage::HW_FB);
        let bo = allocator.allocate(&request).unwrap();
        assert_eq!(bo.tiling(), TilingMode::None);
    }

    #[test]
    fn fallback_is_attempted_once() {
        let manager = MockMemoryManager::new();
        manager.configure(|state| {
            state.fail_tiled = true;
            state.fail_untiled = true;
        });
        let allocator = allocator(&manager, GenerationTier::Gen7);

        let request = AllocationRequest::new(HalFormat::RGBA_8888, 64, 64, GrallocUsage::HW_FB);
        assert!(matches!(
            allocator.allocate(&request),
            Err(GrallocError::AllocationFailed { .. })
        ));
        assert_eq!(tilings(&manager), vec![TilingMode::X, TilingMode::None]);
        assert_eq!(manager.live_handles(), 0);
    }

    #[test]
    fn oversize_untiled_pitch_is_terminal() {
        let manager = MockMemoryManager::new();
        manager.configure(|state| state.untiled_stride = Some(MAX_SCANOUT_PITCH * 2));
        let allocator = allocator(&manager, GenerationTier::Gen7);

        let request = AllocationRequest::new(HalFormat::RGBA_8888, 64, 64, GrallocUsage::CURSOR);
        assert!(matches!(
            allocator.allocate(&request),
            Err(GrallocError::CapacityExceeded { .. })
        ));
        assert_eq!(tilings(&manager), vec![TilingMode::None]);
        assert_eq!(manager.live_handles(), 0);
    }

    #[test]
    fn general_buffers_do_not_retry() {
        let manager = MockMemoryManager::new();
        manager.configure(|state| state.fail_tiled = true);
        let allocator = allocator(&manager, GenerationTier::Gen7);

        let request =
            AllocationRequest::new(HalFormat::RGBA_8888, 256, 256, GrallocUsage::HW_RENDER);
        assert!(matches!(
            allocator.allocate(&request),
            Err(GrallocError::AllocationFailed { .. })
        ));
        assert_eq!(tilings(&manager), vec![TilingMode::X]);

        // General buffers stay reusable.
        manager.configure(|state| state.fail_tiled = false);
        let bo = allocator.allocate(&request).unwrap();
        assert!(!manager
            .calls()
            .contains(&ManagerCall::DisableReuse(bo.native_handle())));
    }

    #[test]
    fn failed_export_releases_store() {
        let manager = MockMemoryManager::new();
        manager.configure(|state| state.fail_export = true);
        let allocator = allocator(&manager, GenerationTier::Gen7);

        let request = AllocationRequest::new(HalFormat::RGB_565, 64, 64, GrallocUsage::HW_TEXTURE);
        assert!(allocator.allocate(&request).is_err());
        assert_eq!(manager.live_handles(), 0);
    }

    #[test]
    fn invalid_requests() {
        let manager = MockMemoryManager::new();
        let allocator = allocator(&manager, GenerationTier::Gen7);

        let request = AllocationRequest::new(HalFormat(0x77), 64, 64, GrallocUsage::HW_TEXTURE);
        assert!(matches!(
            allocator.allocate(&request),
            Err(GrallocError::UnsupportedFormat(0x77))
        ));

        let request = AllocationRequest::new(HalFormat::RGBA_8888, 0, 64, GrallocUsage::HW_TEXTURE);
        assert!(matches!(
            allocator.allocate(&request),
            Err(GrallocError::InvalidGrallocDimensions)
        ));
        assert!(manager.calls().is_empty());
    }

    #[test]
    fn implicit_sync_can_stay_enabled() {
        let manager = MockMemoryManager::new();
        let allocator = allocator(&manager, GenerationTier::Gen7).use_explicit_sync(false);

        let request = AllocationRequest::new(HalFormat::YV12, 640, 480, GrallocUsage::HW_TEXTURE);
        let bo = allocator.allocate(&request).unwrap();
        assert_eq!(bo.tiling(), TilingMode::None);
        assert!(!manager
            .calls()
            .iter()
            .any(|call| matches!(call, ManagerCall::DisableImplicitSync(_))));
        assert_eq!(
            manager.allocations()[0],
            ManagerCall::Allocate {
                name: "gralloc-videotexture".to_string(),
                width: 640,
                height: 720,
                tiling: TilingMode::None,
                flags: AllocFlags::empty(),
            }
        );
    }
}
