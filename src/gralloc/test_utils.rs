// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Test doubles for the memory manager and device capability collaborators.

use std::collections::BTreeMap as Map;
use std::sync::Arc;
use std::sync::Mutex;

use crate::gralloc::capabilities::DeviceCapabilities;
use crate::gralloc::manager::*;
use crate::gralloc::tiling::GenerationTier;
use crate::gralloc::tiling::TilingMode;
use crate::gralloc_os::SafeDescriptor;
use crate::gralloc_os::SharedMemory;
use crate::gralloc_utils::*;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManagerCall {
    Allocate {
        name: String,
        width: u32,
        height: u32,
        tiling: TilingMode,
        flags: AllocFlags,
    },
    Release(BoHandle),
    DisableReuse(BoHandle),
    DisableImplicitSync(BoHandle),
    GetTiling(BoHandle),
    MapLinear(BoHandle, bool),
    MapAperture(BoHandle),
    UnmapLinear(BoHandle),
    UnmapAperture(BoHandle),
    Export(BoHandle),
    Import,
}

/// Scripted behavior of `MockMemoryManager`.
#[derive(Default)]
pub struct MockState {
    pub calls: Vec<ManagerCall>,
    /// Live handles and their reference counts.
    pub live: Map<BoHandle, (TilingMode, u32)>,
    /// Pitch reported for tiled allocations instead of `width * bpp`.
    pub tiled_stride: Option<u32>,
    /// Pitch reported for untiled allocations instead of `width * bpp`.
    pub untiled_stride: Option<u32>,
    pub fail_tiled: bool,
    pub fail_untiled: bool,
    pub fail_export: bool,
    pub fail_import: bool,
    pub fail_get_tiling: bool,
    /// Fails both map variants.
    pub fail_map: bool,
    /// Tiling reported for imported stores.
    pub import_tiling: TilingMode,
    next_handle: u32,
}

impl MockState {
    fn insert(&mut self, tiling: TilingMode) -> BoHandle {
        self.next_handle += 1;
        let handle = BoHandle(self.next_handle);
        self.live.insert(handle, (tiling, 1));
        handle
    }
}

/// A memory manager that records every call and hands out fake handles.
#[derive(Default)]
pub struct MockMemoryManager {
    pub state: Mutex<MockState>,
}

impl MockMemoryManager {
    pub fn new() -> Arc<MockMemoryManager> {
        Arc::new(Default::default())
    }

    pub fn configure<F: FnOnce(&mut MockState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<ManagerCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn allocations(&self) -> Vec<ManagerCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, ManagerCall::Allocate { .. }))
            .collect()
    }

    pub fn live_handles(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    fn record(&self, call: ManagerCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn map(&self, call: ManagerCall) -> GrallocResult<GrallocMapping> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.fail_map {
            return Err(GrallocError::MapFailed("aperture exhausted"));
        }

        Ok(GrallocMapping {
            ptr: std::ptr::null_mut(),
            size: 0,
        })
    }
}

impl MemoryManager for MockMemoryManager {
    fn allocate_tiled(&self, params: &TiledAllocParams) -> GrallocResult<TiledAllocation> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ManagerCall::Allocate {
            name: params.name.to_string(),
            width: params.width,
            height: params.height,
            tiling: params.tiling,
            flags: params.flags,
        });

        let (fail, stride) = if params.tiling.is_linear() {
            (state.fail_untiled, state.untiled_stride)
        } else {
            (state.fail_tiled, state.tiled_stride)
        };

        if fail {
            return Err(GrallocError::ManagerError(-libc::ENOMEM));
        }

        let stride = stride.unwrap_or(params.width * params.bpp);
        let handle = state.insert(params.tiling);
        Ok(TiledAllocation {
            handle,
            tiling: params.tiling,
            stride,
            size: stride as u64 * params.height as u64,
        })
    }

    fn release_reference(&self, handle: BoHandle) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ManagerCall::Release(handle));
        let remove = match state.live.get_mut(&handle) {
            Some((_, refs)) => {
                *refs -= 1;
                *refs == 0
            }
            None => panic!("release of unknown handle {:?}", handle),
        };

        if remove {
            state.live.remove(&handle);
        }
    }

    fn disable_reuse(&self, handle: BoHandle) -> GrallocResult<()> {
        self.record(ManagerCall::DisableReuse(handle));
        Ok(())
    }

    fn disable_implicit_sync(&self, handle: BoHandle) -> GrallocResult<()> {
        self.record(ManagerCall::DisableImplicitSync(handle));
        Ok(())
    }

    fn get_tiling(&self, handle: BoHandle) -> GrallocResult<TilingMode> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ManagerCall::GetTiling(handle));
        if state.fail_get_tiling {
            return Err(GrallocError::ManagerError(-libc::EINVAL));
        }

        state
            .live
            .get(&handle)
            .map(|(tiling, _)| *tiling)
            .ok_or(GrallocError::ManagerError(-libc::ENOENT))
    }

    fn map_linear(&self, handle: BoHandle, writable: bool) -> GrallocResult<GrallocMapping> {
        self.map(ManagerCall::MapLinear(handle, writable))
    }

    fn map_aperture(&self, handle: BoHandle) -> GrallocResult<GrallocMapping> {
        self.map(ManagerCall::MapAperture(handle))
    }

    fn unmap_linear(&self, handle: BoHandle) -> GrallocResult<()> {
        self.record(ManagerCall::UnmapLinear(handle));
        Ok(())
    }

    fn unmap_aperture(&self, handle: BoHandle) -> GrallocResult<()> {
        self.record(ManagerCall::UnmapAperture(handle));
        Ok(())
    }

    fn export_descriptor(&self, handle: BoHandle) -> GrallocResult<SafeDescriptor> {
        let fail = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(ManagerCall::Export(handle));
            state.fail_export
        };

        if fail {
            return Err(GrallocError::ManagerError(-libc::EIO));
        }

        let shm = SharedMemory::new(format!("mock-{}", handle.0), 4096)?;
        Ok(shm.into())
    }

    fn import_descriptor(&self, _descriptor: &SafeDescriptor) -> GrallocResult<BoHandle> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ManagerCall::Import);
        if state.fail_import {
            return Err(GrallocError::ImportFailed("unknown descriptor"));
        }

        let tiling = state.import_tiling;
        Ok(state.insert(tiling))
    }
}

/// Device capabilities with a scripted cursor query.  `None` makes the query fail.
pub struct MockCapabilities {
    pub cursor_size: Option<(u32, u32)>,
    pub generation: GenerationTier,
}

impl DeviceCapabilities for MockCapabilities {
    fn preferred_cursor_size(&self) -> GrallocResult<(u32, u32)> {
        self.cursor_size
            .ok_or(GrallocError::ManagerError(-libc::ENOTTY))
    }

    fn generation(&self) -> GenerationTier {
        self.generation
    }
}
