// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A crate for allocating window system buffers on GPUs with tiled memory
//! layouts, importing buffers shared by other processes, and describing their
//! plane geometry to consumers such as a display controller.

#[macro_use]
mod macros;
mod gralloc;
mod gralloc_os;
mod gralloc_utils;

pub use crate::gralloc::to_wire_format;
pub use crate::gralloc::wire_format_for;
pub use crate::gralloc::AllocFlags;
pub use crate::gralloc::AllocationRequest;
pub use crate::gralloc::BackingStore;
pub use crate::gralloc::BoHandle;
pub use crate::gralloc::BufferAllocator;
pub use crate::gralloc::BufferHandle;
pub use crate::gralloc::BufferImporter;
pub use crate::gralloc::BufferObject;
pub use crate::gralloc::BufferOrigin;
pub use crate::gralloc::ConsumerBuffer;
pub use crate::gralloc::DeviceCapabilities;
pub use crate::gralloc::DrmCapabilities;
pub use crate::gralloc::DrmFormat;
pub use crate::gralloc::ExportResolver;
pub use crate::gralloc::FixedCapabilities;
pub use crate::gralloc::GenerationTier;
pub use crate::gralloc::GeometryAligner;
pub use crate::gralloc::Gralloc;
pub use crate::gralloc::GrallocBuilder;
pub use crate::gralloc::GrallocUsage;
pub use crate::gralloc::HalFormat;
pub use crate::gralloc::MapVariant;
pub use crate::gralloc::MemoryManager;
pub use crate::gralloc::PlanarLayout;
pub use crate::gralloc::PlaneLayout;
pub use crate::gralloc::SystemMemoryManager;
pub use crate::gralloc::TiledAllocParams;
pub use crate::gralloc::TiledAllocation;
pub use crate::gralloc::TilingMode;
pub use crate::gralloc::TilingPlan;
pub use crate::gralloc::TilingSelector;
pub use crate::gralloc_os::AsRawDescriptor;
pub use crate::gralloc_os::FromRawDescriptor as GrallocFromRawDescriptor;
pub use crate::gralloc_os::IntoRawDescriptor as GrallocIntoRawDescriptor;
pub use crate::gralloc_os::SafeDescriptor as GrallocDescriptor;
pub use crate::gralloc_utils::*;
