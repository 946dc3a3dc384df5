// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! geometry: Converts a logical width/height into the aligned geometry the hardware needs, and
//! describes where each plane of a buffer lives.
//!
//! Both the allocation path and the export path go through the same functions here, so the plane
//! geometry advertised to consumers always matches what was allocated.

use crate::gralloc::formats::*;
use crate::gralloc::usage::GrallocUsage;
use crate::gralloc_utils::*;

pub const DEFAULT_CURSOR_WIDTH: u32 = 64;
pub const DEFAULT_CURSOR_HEIGHT: u32 = 64;

/// Rounds `value` up to the next multiple of `alignment`.
pub fn align(value: u32, alignment: u32) -> GrallocResult<u32> {
    checked_arithmetic!(value align alignment)
}

/// Computes hardware-legal buffer geometry.  The only device state involved is the cursor size
/// preferred by the display engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GeometryAligner {
    cursor_width: u32,
    cursor_height: u32,
}

impl Default for GeometryAligner {
    fn default() -> GeometryAligner {
        GeometryAligner::new(DEFAULT_CURSOR_WIDTH, DEFAULT_CURSOR_HEIGHT)
    }
}

impl GeometryAligner {
    /// A zero dimension means the display engine did not report one, and the 64 pixel default is
    /// used instead.
    pub fn new(cursor_width: u32, cursor_height: u32) -> GeometryAligner {
        GeometryAligner {
            cursor_width: if cursor_width == 0 {
                DEFAULT_CURSOR_WIDTH
            } else {
                cursor_width
            },
            cursor_height: if cursor_height == 0 {
                DEFAULT_CURSOR_HEIGHT
            } else {
                cursor_height
            },
        }
    }

    pub fn cursor_size(&self) -> (u32, u32) {
        (self.cursor_width, self.cursor_height)
    }

    /// Returns the aligned (width, height) for `format` and `usage`.
    ///
    /// The steps below do not commute.  Subsampled chroma rows are reserved below the luma rows
    /// before any usage alignment is applied, and planar 4:2:0 gets a final macroblock-row
    /// alignment on top of everything else.
    pub fn align_geometry(
        &self,
        format: DrmFormat,
        usage: GrallocUsage,
        width: u32,
        height: u32,
    ) -> GrallocResult<(u32, u32)> {
        let (width_alignment, height_alignment, extra_height_div) = match format.to_bytes() {
            DRM_FORMAT_YUV420 => (32, 2, 2),
            DRM_FORMAT_NV16 => (2, 1, 1),
            DRM_FORMAT_YUYV => (2, 1, 0),
            DRM_FORMAT_NV12 | DRM_FORMAT_NV21 => (2, 2, 2),
            _ => (1, 1, 0),
        };

        let mut width = align(width, width_alignment)?;
        let mut height = align(height, height_alignment)?;

        if extra_height_div != 0 {
            let extra_height = height / extra_height_div;
            height = checked_arithmetic!(height + extra_height)?;
        }

        if usage.uses_cursor() {
            width = align(width, self.cursor_width)?;
            height = align(height, self.cursor_height)?;
        } else if usage.uses_scanout() {
            width = align(width, 64)?;
        } else if usage.uses_texturing() {
            // 2D texture layout of the sampler: 4x2 pixel granularity.
            width = align(width, 4)?;
            height = align(height, 2)?;
        }

        if format.is_planar_yuv420() {
            width = align(width, 128)?;
        }

        Ok((width, height))
    }
}

/// Row pitch, offset and memory-manager handle of up to `GRALLOC_MAX_PLANES` planes.  Unused
/// planes are zero.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaneLayout {
    pub format: DrmFormat,
    pub pitches: [u32; GRALLOC_MAX_PLANES],
    pub offsets: [u32; GRALLOC_MAX_PLANES],
    pub handles: [u32; GRALLOC_MAX_PLANES],
}

/// Describes the planes of a buffer whose plane 0 has row pitch `stride` and lives in `handle`.
///
/// Planar 4:2:0 stores both chroma planes in the same allocation after `height` luma rows.  The
/// plane at index 2 comes first (the V-before-U order of YV12), followed by the plane at index 1.
pub fn plane_layout(
    format: DrmFormat,
    stride: u32,
    handle: u32,
    height: u32,
) -> GrallocResult<PlaneLayout> {
    let mut layout = PlaneLayout {
        format,
        ..Default::default()
    };

    layout.pitches[0] = stride;
    layout.handles[0] = handle;

    if format.is_planar_yuv420() {
        let half_pitch = stride / 2;
        let chroma_pitch = align(half_pitch, 16)?;
        layout.pitches[1] = chroma_pitch;
        layout.pitches[2] = chroma_pitch;

        let luma_offset = layout.offsets[0];
        let luma_size = checked_arithmetic!(stride * height)?;
        let second_offset = checked_arithmetic!(luma_offset + luma_size)?;
        let chroma_rows = checked_arithmetic!(chroma_pitch * height)? / 2;
        let first_offset = checked_arithmetic!(second_offset + chroma_rows)?;
        layout.offsets[2] = second_offset;
        layout.offsets[1] = first_offset;

        layout.handles[1] = handle;
        layout.handles[2] = handle;
    }

    Ok(layout)
}
