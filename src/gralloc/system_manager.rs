// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Utility file for a memory manager backed by exportable system memory.  On Linux systems, this
//! is done with memfd.
//!
//! The tiling mode is part of the memfd name, so it survives a trip to another process and can be
//! rediscovered on import just like a kernel buffer manager reports it.

use std::collections::BTreeMap as Map;
use std::sync::Mutex;

use log::debug;
use log::error;
use nix::sys::stat::fstat;
use nix::sys::stat::FileStat;

use crate::gralloc::geometry::align;
use crate::gralloc::manager::*;
use crate::gralloc::tiling::TilingMode;
use crate::gralloc_os::descriptor_path;
use crate::gralloc_os::round_up_to_page_size;
use crate::gralloc_os::AsRawDescriptor;
use crate::gralloc_os::MappedRegion;
use crate::gralloc_os::MemoryMapping;
use crate::gralloc_os::SafeDescriptor;
use crate::gralloc_os::SharedMemory;
use crate::gralloc_utils::*;

const MEMFD_PREFIX: &str = "/memfd:";
const DELETED_SUFFIX: &str = " (deleted)";

/// (device, inode) of the file behind a descriptor.
type Identity = (libc::dev_t, libc::ino_t);

struct ActiveMapping {
    variant: MapVariant,
    region: MemoryMapping,
    count: u32,
}

struct StoreEntry {
    descriptor: SafeDescriptor,
    identity: Identity,
    size: u64,
    /// None for foreign stores whose name carried no tiling.
    tiling: Option<TilingMode>,
    refcount: u32,
    reusable: bool,
    implicit_sync: bool,
    mapping: Option<ActiveMapping>,
}

struct SystemState {
    next_handle: u32,
    stores: Map<BoHandle, StoreEntry>,
}

impl SystemState {
    fn entry(&mut self, handle: BoHandle) -> GrallocResult<&mut StoreEntry> {
        self.stores
            .get_mut(&handle)
            .ok_or(GrallocError::ManagerError(-libc::ENOENT))
    }

    fn insert(&mut self, entry: StoreEntry) -> BoHandle {
        let handle = BoHandle(self.next_handle);
        self.next_handle += 1;
        self.stores.insert(handle, entry);
        handle
    }

    fn allocated_size(&self) -> u64 {
        self.stores.values().map(|entry| entry.size).sum()
    }
}

fn identity(stat: &FileStat) -> Identity {
    (stat.st_dev, stat.st_ino)
}

/// Pitch and height granularity of each tiling mode.
fn tile_geometry(tiling: TilingMode) -> (u32, u32) {
    match tiling {
        TilingMode::None => (64, 2),
        TilingMode::X => (512, 8),
        TilingMode::Y => (128, 32),
    }
}

/// Parses the tiling tag out of a `/memfd:<name>:<tiling>` path.
fn tiling_from_path(path: &str) -> Option<TilingMode> {
    let name = path.strip_prefix(MEMFD_PREFIX)?;
    let name = name.strip_suffix(DELETED_SUFFIX).unwrap_or(name);
    let (_, tag) = name.rsplit_once(':')?;
    TilingMode::from_tag(tag)
}

/// A memory manager allocating from system memory.
pub struct SystemMemoryManager {
    state: Mutex<SystemState>,
    capacity: Option<u64>,
}

impl Default for SystemMemoryManager {
    fn default() -> Self {
        SystemMemoryManager::new()
    }
}

impl SystemMemoryManager {
    pub fn new() -> SystemMemoryManager {
        SystemMemoryManager {
            state: Mutex::new(SystemState {
                next_handle: 1,
                stores: Default::default(),
            }),
            capacity: None,
        }
    }

    /// Limits the total size of live stores.  Allocations beyond it fail like an exhausted
    /// aperture would.
    pub fn with_capacity(capacity: u64) -> SystemMemoryManager {
        SystemMemoryManager {
            capacity: Some(capacity),
            ..SystemMemoryManager::new()
        }
    }

    /// Number of live stores.
    pub fn num_stores(&self) -> usize {
        self.state.lock().unwrap().stores.len()
    }

    /// Number of references held on `handle`, 0 once it has been freed.
    pub fn reference_count(&self, handle: BoHandle) -> u32 {
        let state = self.state.lock().unwrap();
        state.stores.get(&handle).map_or(0, |entry| entry.refcount)
    }

    /// Returns (reusable, implicit_sync) for `handle`.
    pub fn store_flags(&self, handle: BoHandle) -> Option<(bool, bool)> {
        let state = self.state.lock().unwrap();
        state
            .stores
            .get(&handle)
            .map(|entry| (entry.reusable, entry.implicit_sync))
    }

    fn map(&self, handle: BoHandle, variant: MapVariant) -> GrallocResult<GrallocMapping> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entry(handle)
            .map_err(|_| GrallocError::MapFailed("unknown buffer"))?;

        if entry.mapping.is_none() {
            let size: usize = entry.size.try_into()?;
            let region = MemoryMapping::from_descriptor(&entry.descriptor, size, true)?;
            entry.mapping = Some(ActiveMapping {
                variant,
                region,
                count: 0,
            });
        }

        match entry.mapping.as_mut() {
            Some(active) if active.variant == variant => {
                active.count += 1;
                Ok(GrallocMapping {
                    ptr: active.region.as_ptr(),
                    size: active.region.size(),
                })
            }
            _ => Err(GrallocError::MapFailed("mapping variant mismatch")),
        }
    }

    fn unmap(&self, handle: BoHandle, variant: MapVariant) -> GrallocResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entry(handle)
            .map_err(|_| GrallocError::MapFailed("unknown buffer"))?;

        let active = entry
            .mapping
            .as_mut()
            .ok_or(GrallocError::MapFailed("buffer is not mapped"))?;
        if active.variant != variant {
            return Err(GrallocError::MapFailed("mapping variant mismatch"));
        }

        active.count -= 1;
        if active.count == 0 {
            entry.mapping = None;
        }

        Ok(())
    }
}

impl MemoryManager for SystemMemoryManager {
    fn allocate_tiled(&self, params: &TiledAllocParams) -> GrallocResult<TiledAllocation> {
        let (pitch_alignment, height_alignment) = tile_geometry(params.tiling);
        let width = params.width;
        let bpp = params.bpp;
        let row = checked_arithmetic!(width * bpp)?;
        let stride = align(row, pitch_alignment)?;
        let height = align(params.height, height_alignment)?;
        let size = round_up_to_page_size(stride as u64 * height as u64)?;

        let mut state = self.state.lock().unwrap();
        if let Some(capacity) = self.capacity {
            if state.allocated_size() + size > capacity {
                error!(
                    "{}: {} bytes do not fit in the remaining capacity",
                    params.name, size
                );
                return Err(GrallocError::ManagerError(-libc::ENOMEM));
            }
        }

        let shm = SharedMemory::new(format!("{}:{}", params.name, params.tiling.tag()), size)?;
        let descriptor: SafeDescriptor = shm.into();
        let identity = identity(&fstat(descriptor.as_raw_descriptor())?);
        let handle = state.insert(StoreEntry {
            descriptor,
            identity,
            size,
            tiling: Some(params.tiling),
            refcount: 1,
            reusable: true,
            implicit_sync: true,
            mapping: None,
        });

        debug!(
            "{}: {:?} {} bytes, stride {}, tiling {}, flags {:?}",
            params.name, handle, size, stride, params.tiling, params.flags
        );

        Ok(TiledAllocation {
            handle,
            tiling: params.tiling,
            stride,
            size,
        })
    }

    fn release_reference(&self, handle: BoHandle) {
        let mut state = self.state.lock().unwrap();
        let remove = match state.stores.get_mut(&handle) {
            Some(entry) => {
                entry.refcount -= 1;
                entry.refcount == 0
            }
            None => {
                error!("release of unknown buffer {:?}", handle);
                false
            }
        };

        if remove {
            state.stores.remove(&handle);
        }
    }

    fn disable_reuse(&self, handle: BoHandle) -> GrallocResult<()> {
        self.state.lock().unwrap().entry(handle)?.reusable = false;
        Ok(())
    }

    fn disable_implicit_sync(&self, handle: BoHandle) -> GrallocResult<()> {
        self.state.lock().unwrap().entry(handle)?.implicit_sync = false;
        Ok(())
    }

    fn get_tiling(&self, handle: BoHandle) -> GrallocResult<TilingMode> {
        self.state
            .lock()
            .unwrap()
            .entry(handle)?
            .tiling
            .ok_or(GrallocError::ManagerError(-libc::EINVAL))
    }

    fn map_linear(&self, handle: BoHandle, writable: bool) -> GrallocResult<GrallocMapping> {
        debug!("linear map of {:?}, writable {}", handle, writable);
        self.map(handle, MapVariant::Linear)
    }

    fn map_aperture(&self, handle: BoHandle) -> GrallocResult<GrallocMapping> {
        self.map(handle, MapVariant::Aperture)
    }

    fn unmap_linear(&self, handle: BoHandle) -> GrallocResult<()> {
        self.unmap(handle, MapVariant::Linear)
    }

    fn unmap_aperture(&self, handle: BoHandle) -> GrallocResult<()> {
        self.unmap(handle, MapVariant::Aperture)
    }

    fn export_descriptor(&self, handle: BoHandle) -> GrallocResult<SafeDescriptor> {
        let mut state = self.state.lock().unwrap();
        let descriptor = state.entry(handle)?.descriptor.try_clone()?;
        Ok(descriptor)
    }

    fn import_descriptor(&self, descriptor: &SafeDescriptor) -> GrallocResult<BoHandle> {
        // The caller's file offset must not move.
        let stat = fstat(descriptor.as_raw_descriptor())
            .map_err(|_| GrallocError::ImportFailed("descriptor could not be inspected"))?;
        let identity = identity(&stat);

        let mut state = self.state.lock().unwrap();
        let local = state
            .stores
            .iter_mut()
            .find(|(_, entry)| entry.identity == identity);
        if let Some((handle, entry)) = local {
            entry.refcount += 1;
            return Ok(*handle);
        }

        let path = descriptor_path(descriptor)?;
        if !path.starts_with(MEMFD_PREFIX) {
            error!("cannot import {:?}: not a shared memory buffer", path);
            return Err(GrallocError::ImportFailed("descriptor is not a shared memory buffer"));
        }

        let size: u64 = stat.st_size.try_into()?;
        let tiling = tiling_from_path(&path);
        let handle = state.insert(StoreEntry {
            descriptor: descriptor.try_clone()?,
            identity,
            size,
            tiling,
            refcount: 1,
            reusable: true,
            implicit_sync: true,
            mapping: None,
        });

        debug!("imported {:?} as {:?}, tiling {:?}", path, handle, tiling);
        Ok(handle)
    }
}
