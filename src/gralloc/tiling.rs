// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! tiling: Picks the memory layout of a new buffer and the scanout pitch limits that apply to it.

use std::fmt;

use log::debug;

use crate::gralloc::formats::DrmFormat;
use crate::gralloc::manager::AllocFlags;
use crate::gralloc::usage::GrallocUsage;

/// Largest row pitch, in bytes, the display engine of the newest generations can scan out.
pub const MAX_SCANOUT_PITCH: u32 = 32 * 1024;

/// Textures narrower than this stay linear unless they are also render targets.
const MIN_TILED_TEXTURE_WIDTH: u32 = 64;

/// Memory layout of a backing store.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub enum TilingMode {
    /// Row-major.
    #[default]
    None,
    /// 512 byte x 8 row tiles.
    X,
    /// 128 byte x 32 row tiles.
    Y,
}

impl TilingMode {
    /// Short tag used when the tiling mode travels with a descriptor.
    pub fn tag(self) -> &'static str {
        match self {
            TilingMode::None => "none",
            TilingMode::X => "x",
            TilingMode::Y => "y",
        }
    }

    pub fn from_tag(tag: &str) -> Option<TilingMode> {
        match tag {
            "none" => Some(TilingMode::None),
            "x" => Some(TilingMode::X),
            "y" => Some(TilingMode::Y),
            _ => None,
        }
    }

    pub fn is_linear(self) -> bool {
        self == TilingMode::None
    }
}

impl fmt::Display for TilingMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Coarse hardware generation.  Only the display engine's pitch limit depends on it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum GenerationTier {
    Gen3,
    Gen4,
    Gen5,
    Gen6,
    Gen7,
}

impl Default for GenerationTier {
    fn default() -> GenerationTier {
        GenerationTier::Gen7
    }
}

impl GenerationTier {
    /// Maximum scanout pitch: 32 KiB, halved before Gen5 and halved again before Gen4.
    pub fn max_scanout_pitch(self) -> u32 {
        let mut max_pitch = MAX_SCANOUT_PITCH;
        if self < GenerationTier::Gen5 {
            max_pitch /= 2;
        }
        if self < GenerationTier::Gen4 {
            max_pitch /= 2;
        }
        max_pitch
    }
}

/// Initial layout decision for an allocation request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TilingPlan {
    /// Debug name handed to the memory manager.
    pub name: &'static str,
    pub tiling: TilingMode,
    pub flags: AllocFlags,
    /// Pitch limit of the display engine.  Only display buffers have one, and only those go
    /// through the untiled fallback.
    pub max_pitch: Option<u32>,
}

impl TilingPlan {
    pub fn is_display(&self) -> bool {
        self.max_pitch.is_some()
    }
}

/// Chooses tiling for new buffers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TilingSelector {
    generation: GenerationTier,
}

impl TilingSelector {
    pub fn new(generation: GenerationTier) -> TilingSelector {
        TilingSelector { generation }
    }

    pub fn generation(&self) -> GenerationTier {
        self.generation
    }

    /// Selects the initial layout for a buffer of `format` and `usage`.  `width` is the requested
    /// (unaligned) width.
    pub fn select(&self, format: DrmFormat, usage: GrallocUsage, width: u32) -> TilingPlan {
        let plan = if usage.uses_display() {
            let (name, tiling) = if usage.uses_cursor() {
                ("gralloc-cursor", TilingMode::None)
            } else {
                ("gralloc-fb", TilingMode::X)
            };

            TilingPlan {
                name,
                tiling,
                flags: AllocFlags::FOR_RENDER,
                max_pitch: Some(self.generation.max_scanout_pitch()),
            }
        } else {
            let mut name = if usage.uses_texturing() {
                "gralloc-texture"
            } else {
                "gralloc-buffer"
            };

            let tiling = if format.is_planar_yuv420() {
                name = "gralloc-videotexture";
                TilingMode::None
            } else if usage.host_visible() {
                TilingMode::None
            } else if usage.uses_rendering()
                || (usage.uses_texturing() && width >= MIN_TILED_TEXTURE_WIDTH)
            {
                TilingMode::X
            } else {
                TilingMode::None
            };

            let flags = if usage.uses_rendering() {
                AllocFlags::FOR_RENDER
            } else {
                AllocFlags::empty()
            };

            TilingPlan {
                name,
                tiling,
                flags,
                max_pitch: None,
            }
        };

        debug!(
            "{:?} usage {:?} width {}: {} tiling {}",
            format, usage, width, plan.name, plan.tiling
        );
        plan
    }
}
