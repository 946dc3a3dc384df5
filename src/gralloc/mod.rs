// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This module implements allocation of window system buffers on GPUs whose memory is laid out
//! in tiles.  It is modeled after "gralloc", the Android hardware abstraction layer (HAL).
//!
//! <https://source.android.com/devices/graphics/arch-bq-gralloc>

mod allocator;
mod buffer;
mod capabilities;
mod device;
mod drm_caps;
mod export;
mod formats;
mod geometry;
mod importer;
mod manager;
mod system_manager;
#[cfg(test)]
mod test_utils;
mod tiling;
mod usage;

pub use allocator::BufferAllocator;
pub use buffer::AllocationRequest;
pub use buffer::BufferHandle;
pub use buffer::BufferObject;
pub use buffer::BufferOrigin;
pub use capabilities::DeviceCapabilities;
pub use capabilities::FixedCapabilities;
pub use device::Gralloc;
pub use device::GrallocBuilder;
pub use drm_caps::DrmCapabilities;
pub use export::ConsumerBuffer;
pub use export::ExportResolver;
pub use formats::to_wire_format;
pub use formats::wire_format_for;
pub use formats::DrmFormat;
pub use formats::HalFormat;
pub use formats::PlanarLayout;
pub use geometry::GeometryAligner;
pub use geometry::PlaneLayout;
pub use importer::BufferImporter;
pub use manager::AllocFlags;
pub use manager::BackingStore;
pub use manager::BoHandle;
pub use manager::MapVariant;
pub use manager::MemoryManager;
pub use manager::TiledAllocParams;
pub use manager::TiledAllocation;
pub use system_manager::SystemMemoryManager;
pub use tiling::GenerationTier;
pub use tiling::TilingMode;
pub use tiling::TilingPlan;
pub use tiling::TilingSelector;
pub use usage::GrallocUsage;
