// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for constructing a buffer object.  Values match Android's `GRALLOC_USAGE_*`
    /// so that handles can be passed through unchanged.
    #[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
    pub struct GrallocUsage: u32 {
        const SW_READ_RARELY = 0x0000_0002;
        const SW_READ_OFTEN = 0x0000_0003;
        const SW_WRITE_RARELY = 0x0000_0020;
        const SW_WRITE_OFTEN = 0x0000_0030;
        const HW_TEXTURE = 0x0000_0100;
        const HW_RENDER = 0x0000_0200;
        const HW_2D = 0x0000_0400;
        const HW_COMPOSER = 0x0000_0800;
        const HW_FB = 0x0000_1000;
        const CURSOR = 0x0000_8000;
    }
}

impl GrallocUsage {
    /// Returns true if the buffer is a cursor image.
    #[inline(always)]
    pub fn uses_cursor(self) -> bool {
        self.contains(GrallocUsage::CURSOR)
    }

    /// Returns true if the buffer will be scanned out as a framebuffer.
    #[inline(always)]
    pub fn uses_scanout(self) -> bool {
        self.contains(GrallocUsage::HW_FB)
    }

    /// Returns true if the buffer will be sampled from by the GPU.
    #[inline(always)]
    pub fn uses_texturing(self) -> bool {
        self.contains(GrallocUsage::HW_TEXTURE)
    }

    /// Returns true if the rendering flag is set.
    #[inline(always)]
    pub fn uses_rendering(self) -> bool {
        self.contains(GrallocUsage::HW_RENDER)
    }

    /// Returns true if the buffer is consumed by the display engine, either as a framebuffer or
    /// as a cursor.
    #[inline(always)]
    pub fn uses_display(self) -> bool {
        self.intersects(GrallocUsage::HW_FB | GrallocUsage::CURSOR)
    }

    /// Returns true if the CPU touches the memory.  Any software access bit counts, matching how
    /// the `OFTEN` masks overlap their `RARELY` counterparts.
    #[inline(always)]
    pub fn host_visible(self) -> bool {
        self.intersects(GrallocUsage::SW_READ_OFTEN | GrallocUsage::SW_WRITE_OFTEN)
    }
}

impl From<u32> for GrallocUsage {
    fn from(raw: u32) -> GrallocUsage {
        GrallocUsage::from_bits_retain(raw)
    }
}
