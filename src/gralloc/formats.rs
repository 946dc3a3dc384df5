// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! formats: Utility file for dealing with logical (HAL) and DRM formats, and
//! canonical size calculations.

use std::fmt;

use log::info;

use crate::gralloc::usage::GrallocUsage;
use crate::gralloc_utils::*;

/*
 * Fourcc codes for every format the HAL translation below can produce.  Formats never requested
 * by Android userspace are left out for simplicity.
 */

pub const DRM_FORMAT_RGB565: [u8; 4] = [b'R', b'G', b'1', b'6'];
pub const DRM_FORMAT_BGR888: [u8; 4] = [b'B', b'G', b'2', b'4'];

pub const DRM_FORMAT_XBGR8888: [u8; 4] = [b'X', b'B', b'2', b'4'];
pub const DRM_FORMAT_ARGB8888: [u8; 4] = [b'A', b'R', b'2', b'4'];
pub const DRM_FORMAT_ABGR8888: [u8; 4] = [b'A', b'B', b'2', b'4'];

pub const DRM_FORMAT_YUYV: [u8; 4] = [b'Y', b'U', b'Y', b'V'];
pub const DRM_FORMAT_NV12: [u8; 4] = [b'N', b'V', b'1', b'2'];
pub const DRM_FORMAT_NV21: [u8; 4] = [b'N', b'V', b'2', b'1'];
pub const DRM_FORMAT_NV16: [u8; 4] = [b'N', b'V', b'1', b'6'];
pub const DRM_FORMAT_YUV420: [u8; 4] = [b'Y', b'U', b'1', b'2'];

/// A logical pixel format as requested by Android userspace (`HAL_PIXEL_FORMAT_*`).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct HalFormat(pub u32);

impl HalFormat {
    pub const RGBA_8888: HalFormat = HalFormat(1);
    pub const RGBX_8888: HalFormat = HalFormat(2);
    pub const RGB_888: HalFormat = HalFormat(3);
    pub const RGB_565: HalFormat = HalFormat(4);
    pub const BGRA_8888: HalFormat = HalFormat(5);
    pub const YCBCR_422_SP: HalFormat = HalFormat(0x10);
    pub const YCRCB_420_SP: HalFormat = HalFormat(0x11);
    pub const YCBCR_422_I: HalFormat = HalFormat(0x14);
    pub const YCBCR_420_888: HalFormat = HalFormat(0x23);
    pub const YV12: HalFormat = HalFormat(0x3231_5659);
}

impl fmt::Debug for HalFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "hal(0x{:x})", self.0)
    }
}

impl From<u32> for HalFormat {
    fn from(u: u32) -> HalFormat {
        HalFormat(u)
    }
}

/// A [fourcc](https://en.wikipedia.org/wiki/FourCC) format identifier.
#[derive(Copy, Clone, Eq, PartialEq, Default)]
pub struct DrmFormat(pub u32);

/// Planar properties associated with each `DrmFormat`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlanarLayout {
    pub num_planes: usize,
    horizontal_subsampling: [u32; 3],
    vertical_subsampling: [u32; 3],
    bytes_per_pixel: [u32; 3],
}

impl PlanarLayout {
    /// Bytes per pixel of the given plane, 0 for planes the format does not have.
    pub fn bytes_per_pixel(&self, plane: usize) -> u32 {
        self.bytes_per_pixel.get(plane).copied().unwrap_or(0)
    }

    /// Horizontal and vertical subsampling of the given plane relative to plane 0.
    pub fn subsampling(&self, plane: usize) -> (u32, u32) {
        match (
            self.horizontal_subsampling.get(plane),
            self.vertical_subsampling.get(plane),
        ) {
            (Some(&h), Some(&v)) => (h, v),
            _ => (0, 0),
        }
    }
}

static PACKED_2BPP: PlanarLayout = PlanarLayout {
    num_planes: 1,
    horizontal_subsampling: [1, 0, 0],
    vertical_subsampling: [1, 0, 0],
    bytes_per_pixel: [2, 0, 0],
};

static PACKED_3BPP: PlanarLayout = PlanarLayout {
    num_planes: 1,
    horizontal_subsampling: [1, 0, 0],
    vertical_subsampling: [1, 0, 0],
    bytes_per_pixel: [3, 0, 0],
};

static PACKED_4BPP: PlanarLayout = PlanarLayout {
    num_planes: 1,
    horizontal_subsampling: [1, 0, 0],
    vertical_subsampling: [1, 0, 0],
    bytes_per_pixel: [4, 0, 0],
};

static BIPLANAR_YUV420: PlanarLayout = PlanarLayout {
    num_planes: 2,
    horizontal_subsampling: [1, 2, 0],
    vertical_subsampling: [1, 2, 0],
    bytes_per_pixel: [1, 2, 0],
};

static BIPLANAR_YUV422: PlanarLayout = PlanarLayout {
    num_planes: 2,
    horizontal_subsampling: [1, 2, 0],
    vertical_subsampling: [1, 1, 0],
    bytes_per_pixel: [1, 2, 0],
};

static TRIPLANAR_YUV420: PlanarLayout = PlanarLayout {
    num_planes: 3,
    horizontal_subsampling: [1, 2, 2],
    vertical_subsampling: [1, 2, 2],
    bytes_per_pixel: [1, 1, 1],
};

impl DrmFormat {
    /// Constructs a format identifer using a fourcc byte sequence.
    #[inline(always)]
    pub fn new(a: u8, b: u8, c: u8, d: u8) -> DrmFormat {
        DrmFormat(a as u32 | (b as u32) << 8 | (c as u32) << 16 | (d as u32) << 24)
    }

    /// Constructs a format identifier from one of the `DRM_FORMAT_*` byte arrays.
    #[inline(always)]
    pub fn from_bytes(b: [u8; 4]) -> DrmFormat {
        DrmFormat::new(b[0], b[1], b[2], b[3])
    }

    /// Returns the fourcc code as a sequence of bytes.
    #[inline(always)]
    pub fn to_bytes(&self) -> [u8; 4] {
        let f = self.0;
        [f as u8, (f >> 8) as u8, (f >> 16) as u8, (f >> 24) as u8]
    }

    /// Returns the planar layout of the format.
    pub fn planar_layout(&self) -> GrallocResult<PlanarLayout> {
        match self.to_bytes() {
            DRM_FORMAT_RGB565 | DRM_FORMAT_YUYV => Ok(PACKED_2BPP),
            DRM_FORMAT_BGR888 => Ok(PACKED_3BPP),
            DRM_FORMAT_ABGR8888 | DRM_FORMAT_XBGR8888 | DRM_FORMAT_ARGB8888 => Ok(PACKED_4BPP),
            DRM_FORMAT_NV12 | DRM_FORMAT_NV21 => Ok(BIPLANAR_YUV420),
            DRM_FORMAT_NV16 => Ok(BIPLANAR_YUV422),
            DRM_FORMAT_YUV420 => Ok(TRIPLANAR_YUV420),
            _ => Err(GrallocError::UnsupportedFormat(self.0)),
        }
    }

    /// Returns true for the three-plane 4:2:0 format whose chroma planes follow the luma plane.
    pub fn is_planar_yuv420(&self) -> bool {
        self.to_bytes() == DRM_FORMAT_YUV420
    }
}

impl From<u32> for DrmFormat {
    fn from(u: u32) -> DrmFormat {
        DrmFormat(u)
    }
}

impl From<DrmFormat> for u32 {
    fn from(f: DrmFormat) -> u32 {
        f.0
    }
}

impl fmt::Debug for DrmFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = self.to_bytes();
        if b.iter().all(u8::is_ascii_graphic) {
            write!(
                f,
                "fourcc({}{}{}{})",
                b[0] as char, b[1] as char, b[2] as char, b[3] as char
            )
        } else {
            write!(
                f,
                "fourcc(0x{:02x}{:02x}{:02x}{:02x})",
                b[0], b[1], b[2], b[3]
            )
        }
    }
}

/// Translates a logical format into the fourcc code shared with display and compositor consumers.
pub fn to_wire_format(format: HalFormat) -> GrallocResult<DrmFormat> {
    let fourcc = match format {
        HalFormat::RGBA_8888 => DRM_FORMAT_ABGR8888,
        HalFormat::RGBX_8888 => DRM_FORMAT_XBGR8888,
        HalFormat::RGB_888 => DRM_FORMAT_BGR888,
        HalFormat::BGRA_8888 => DRM_FORMAT_ARGB8888,
        HalFormat::RGB_565 => DRM_FORMAT_RGB565,
        HalFormat::YV12 | HalFormat::YCBCR_420_888 => DRM_FORMAT_YUV420,
        HalFormat::YCBCR_422_I => DRM_FORMAT_YUYV,
        HalFormat::YCBCR_422_SP => DRM_FORMAT_NV16,
        HalFormat::YCRCB_420_SP => DRM_FORMAT_NV21,
        _ => {
            info!("Unknown HAL Format 0x{:x}", format.0);
            return Err(GrallocError::UnsupportedFormat(format.0));
        }
    };

    Ok(DrmFormat::from_bytes(fourcc))
}

/// Like `to_wire_format`, but cursor images are always described as 32-bit ARGB since cursor
/// planes only composite that representation.
pub fn wire_format_for(format: HalFormat, usage: GrallocUsage) -> GrallocResult<DrmFormat> {
    let wire_format = to_wire_format(format)?;
    if usage.uses_cursor() {
        return Ok(DrmFormat::from_bytes(DRM_FORMAT_ARGB8888));
    }

    Ok(wire_format)
}

/// Returns the bytes per pixel of plane 0, which is what the memory manager sizes rows by.
pub fn bytes_per_pixel(format: HalFormat) -> GrallocResult<u32> {
    let layout = to_wire_format(format)?.planar_layout()?;
    Ok(layout.bytes_per_pixel(0))
}
