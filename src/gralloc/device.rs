// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! device: The entry point of the crate.  `Gralloc` ties the allocator, the importer and the
//! export resolver to one memory manager and one set of device capabilities.

use std::sync::Arc;

use log::debug;

use crate::gralloc::allocator::BufferAllocator;
use crate::gralloc::buffer::*;
use crate::gralloc::capabilities::*;
use crate::gralloc::export::*;
use crate::gralloc::formats::*;
use crate::gralloc::geometry::*;
use crate::gralloc::importer::BufferImporter;
use crate::gralloc::manager::MemoryManager;
use crate::gralloc::system_manager::SystemMemoryManager;
use crate::gralloc::tiling::*;
use crate::gralloc::usage::GrallocUsage;
use crate::gralloc_utils::*;

/// Configuration of a `Gralloc` instance.
pub struct GrallocBuilder {
    manager: Option<Arc<dyn MemoryManager>>,
    capabilities: Option<Box<dyn DeviceCapabilities>>,
    generation: Option<GenerationTier>,
    cursor_size: Option<(u32, u32)>,
    explicit_sync: bool,
}

impl Default for GrallocBuilder {
    fn default() -> GrallocBuilder {
        GrallocBuilder::new()
    }
}

impl GrallocBuilder {
    /// Create a new GrallocBuilder.  Without further configuration, buffers come from system
    /// memory and the newest generation tier is assumed.
    pub fn new() -> GrallocBuilder {
        GrallocBuilder {
            manager: None,
            capabilities: None,
            generation: None,
            cursor_size: None,
            explicit_sync: true,
        }
    }

    /// Set the memory manager every buffer is allocated from or imported into.
    pub fn set_memory_manager(mut self, manager: Arc<dyn MemoryManager>) -> GrallocBuilder {
        self.manager = Some(manager);
        self
    }

    /// Set the source of the cursor size and generation tier.
    pub fn set_capabilities(mut self, capabilities: Box<dyn DeviceCapabilities>) -> GrallocBuilder {
        self.capabilities = Some(capabilities);
        self
    }

    /// Overrides the generation tier reported by the capabilities.
    pub fn set_generation(mut self, generation: GenerationTier) -> GrallocBuilder {
        self.generation = Some(generation);
        self
    }

    /// Overrides the cursor size reported by the capabilities.
    pub fn set_cursor_size(mut self, width: u32, height: u32) -> GrallocBuilder {
        self.cursor_size = Some((width, height));
        self
    }

    /// Sets whether implicit synchronization is disabled on new buffers.
    pub fn set_explicit_sync(mut self, v: bool) -> GrallocBuilder {
        self.explicit_sync = v;
        self
    }

    /// Builds Gralloc.  The capabilities are queried here, once.
    pub fn build(self) -> GrallocResult<Gralloc> {
        let capabilities = self
            .capabilities
            .unwrap_or_else(|| Box::new(FixedCapabilities::default()));

        let (cursor_width, cursor_height) = match self.cursor_size {
            Some(size) => size,
            None => query_cursor_size(capabilities.as_ref()),
        };
        let generation = self
            .generation
            .unwrap_or_else(|| capabilities.generation());

        let manager = self
            .manager
            .unwrap_or_else(|| Arc::new(SystemMemoryManager::new()));

        let aligner = GeometryAligner::new(cursor_width, cursor_height);
        let selector = TilingSelector::new(generation);
        debug!(
            "gralloc: {:?}, cursor {:?}, explicit sync {}",
            generation,
            aligner.cursor_size(),
            self.explicit_sync
        );

        Ok(Gralloc {
            allocator: BufferAllocator::new(aligner, selector, manager.clone())
                .use_explicit_sync(self.explicit_sync),
            importer: BufferImporter::new(manager.clone()),
            resolver: ExportResolver::new(aligner),
            aligner,
            selector,
            manager,
        })
    }
}

/// Allocates, imports and describes buffers.
pub struct Gralloc {
    allocator: BufferAllocator,
    importer: BufferImporter,
    resolver: ExportResolver,
    aligner: GeometryAligner,
    selector: TilingSelector,
    manager: Arc<dyn MemoryManager>,
}

impl Gralloc {
    pub fn generation(&self) -> GenerationTier {
        self.selector.generation()
    }

    pub fn cursor_size(&self) -> (u32, u32) {
        self.aligner.cursor_size()
    }

    pub fn memory_manager(&self) -> Arc<dyn MemoryManager> {
        self.manager.clone()
    }

    /// Returns the aligned (width, height) a buffer of `format` and `usage` would get.
    pub fn align_geometry(
        &self,
        format: HalFormat,
        usage: GrallocUsage,
        width: u32,
        height: u32,
    ) -> GrallocResult<(u32, u32)> {
        let format = to_wire_format(format)?;
        self.aligner.align_geometry(format, usage, width, height)
    }

    pub fn allocate(&self, request: &AllocationRequest) -> GrallocResult<BufferObject> {
        self.allocator.allocate(request)
    }

    pub fn import(&self, handle: &BufferHandle) -> GrallocResult<BufferObject> {
        self.importer.import(handle)
    }

    /// Releases `bo`, unmapping it first if needed.  Equivalent to dropping it.
    pub fn free(&self, bo: BufferObject) {
        bo.free()
    }

    pub fn map(
        &self,
        bo: &mut BufferObject,
        region: Rect,
        writable: bool,
    ) -> GrallocResult<GrallocMapping> {
        bo.map(region, writable)
    }

    pub fn unmap(&self, bo: &mut BufferObject) -> GrallocResult<()> {
        bo.unmap()
    }

    pub fn resolve_planes(&self, bo: &BufferObject) -> GrallocResult<PlaneLayout> {
        self.resolver.resolve_planes(bo)
    }

    /// Describes `bo` to a consumer with its own memory manager, e.g. the display side.
    pub fn resolve_buffer(
        &self,
        bo: &mut BufferObject,
        consumer: Arc<dyn MemoryManager>,
    ) -> GrallocResult<ConsumerBuffer> {
        self.resolver.resolve_buffer(bo, consumer)
    }

    pub fn to_wire_format(&self, format: HalFormat) -> GrallocResult<DrmFormat> {
        to_wire_format(format)
    }
}
