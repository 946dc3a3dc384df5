// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! gralloc_utils: Utility enums, structs, and implementations needed by the rest of the crate.

use std::ffi::NulError;
use std::io::Error as IoError;
use std::num::TryFromIntError;

#[cfg(unix)]
use nix::Error as NixError;
use remain::sorted;
use thiserror::Error;

/// Maximum number of planes any supported format can describe to a consumer.
pub const GRALLOC_MAX_PLANES: usize = 4;

/// A rectangle in pixels.  Used to describe the region of a CPU mapping.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Rect {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

/// A CPU-visible view of a buffer's backing store.
#[derive(Copy, Clone, Debug)]
pub struct GrallocMapping {
    pub ptr: *mut u8,
    pub size: usize,
}

// The pointer refers to shared memory owned by the memory manager, which keeps it mapped until
// the matching unmap.
unsafe impl Send for GrallocMapping {}
unsafe impl Sync for GrallocMapping {}

/// An error generated while using this crate.
#[sorted]
#[derive(Error, Debug)]
pub enum GrallocError {
    /// The memory manager returned no memory, even after the untiled fallback.
    #[error("failed to allocate buffer {width}x{height} (format {format:#x})")]
    AllocationFailed { width: u32, height: u32, format: u32 },
    /// The row pitch exceeds the largest pitch the display engine can scan out.
    #[error("pitch {pitch} exceeds the maximum scanout pitch {max_pitch}")]
    CapacityExceeded { pitch: u32, max_pitch: u32 },
    /// Checked Arithmetic error
    #[error("arithmetic failed: {}({}) {op} {}({})", .field1.0, .field1.1, .field2.0, .field2.1)]
    CheckedArithmetic {
        field1: (&'static str, usize),
        field2: (&'static str, usize),
        op: &'static str,
    },
    /// Checked Range error
    #[error("range check failed: {}({}) vs {}({})", .field1.0, .field1.1, .field2.0, .field2.1)]
    CheckedRange {
        field1: (&'static str, usize),
        field2: (&'static str, usize),
    },
    /// A foreign descriptor could not be turned into a local buffer.
    #[error("failed to import buffer: {0}")]
    ImportFailed(&'static str),
    /// Invalid gralloc dimensions.
    #[error("invalid gralloc dimensions")]
    InvalidGrallocDimensions,
    /// An input/output error occured.
    #[error("an input/output error occur: {0}")]
    IoError(IoError),
    /// The memory manager failed with an errno-style code.
    #[error("memory manager failed with error {0}")]
    ManagerError(i32),
    /// The mapping failed.
    #[error("the mapping failed: {0}")]
    MapFailed(&'static str),
    /// Nix crate error.
    #[cfg(unix)]
    #[error("The errno is {0}")]
    NixError(NixError),
    #[error("Nul Error occured {0}")]
    NulError(NulError),
    /// An attempted integer conversion failed.
    #[error("int conversion failed: {0}")]
    TryFromIntError(TryFromIntError),
    /// The format has no known bytes-per-pixel or plane layout.
    #[error("unsupported format {0:#x}")]
    UnsupportedFormat(u32),
}

#[cfg(unix)]
impl From<NixError> for GrallocError {
    fn from(e: NixError) -> GrallocError {
        GrallocError::NixError(e)
    }
}

impl From<NulError> for GrallocError {
    fn from(e: NulError) -> GrallocError {
        GrallocError::NulError(e)
    }
}

impl From<IoError> for GrallocError {
    fn from(e: IoError) -> GrallocError {
        GrallocError::IoError(e)
    }
}

impl From<TryFromIntError> for GrallocError {
    fn from(e: TryFromIntError) -> GrallocError {
        GrallocError::TryFromIntError(e)
    }
}

/// The result of an operation in this crate.
pub type GrallocResult<T> = std::result::Result<T, GrallocError>;
