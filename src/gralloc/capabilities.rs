// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use log::error;

use crate::gralloc::geometry::DEFAULT_CURSOR_HEIGHT;
use crate::gralloc::geometry::DEFAULT_CURSOR_WIDTH;
use crate::gralloc::tiling::GenerationTier;
use crate::gralloc_utils::*;

/// Device properties the allocator depends on.  Implementations answer from whatever the device
/// reports; the allocator never talks to the device directly.
pub trait DeviceCapabilities: Send {
    /// Returns the (width, height) of cursor images preferred by the display engine.  A zero
    /// component means the device did not report it.
    fn preferred_cursor_size(&self) -> GrallocResult<(u32, u32)>;

    /// Returns the generation tier of the GPU.
    fn generation(&self) -> GenerationTier;
}

/// Capabilities known ahead of time, e.g. from configuration.
#[derive(Copy, Clone, Debug, Default)]
pub struct FixedCapabilities {
    cursor_size: Option<(u32, u32)>,
    generation: GenerationTier,
}

impl FixedCapabilities {
    pub fn new(cursor_size: Option<(u32, u32)>, generation: GenerationTier) -> FixedCapabilities {
        FixedCapabilities {
            cursor_size,
            generation,
        }
    }
}

impl DeviceCapabilities for FixedCapabilities {
    fn preferred_cursor_size(&self) -> GrallocResult<(u32, u32)> {
        Ok(self
            .cursor_size
            .unwrap_or((DEFAULT_CURSOR_WIDTH, DEFAULT_CURSOR_HEIGHT)))
    }

    fn generation(&self) -> GenerationTier {
        self.generation
    }
}

/// Queries the cursor size, falling back to 64x64 if the device cannot tell.
pub fn query_cursor_size(caps: &dyn DeviceCapabilities) -> (u32, u32) {
    match caps.preferred_cursor_size() {
        Ok(size) => size,
        Err(e) => {
            error!("cannot get cursor size: {}", e);
            (DEFAULT_CURSOR_WIDTH, DEFAULT_CURSOR_HEIGHT)
        }
    }
}
