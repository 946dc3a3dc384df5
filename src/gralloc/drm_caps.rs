// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! drm_caps: Reads display capabilities from a DRM card node.

use std::fs::File;
use std::fs::OpenOptions;
use std::os::raw::c_uint;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use log::error;
use nix::ioctl_readwrite;

use crate::gralloc::capabilities::DeviceCapabilities;
use crate::gralloc::tiling::GenerationTier;
use crate::gralloc_utils::*;

const DRM_IOCTL_BASE: c_uint = 0x64;
const DRM_IOCTL_GET_CAP: c_uint = 0x0c;

const DRM_CAP_CURSOR_WIDTH: u64 = 0x8;
const DRM_CAP_CURSOR_HEIGHT: u64 = 0x9;

#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct drm_get_cap {
    capability: u64,
    value: u64,
}

ioctl_readwrite!(
    drm_ioctl_get_cap,
    DRM_IOCTL_BASE,
    DRM_IOCTL_GET_CAP,
    drm_get_cap
);

fn get_cap(fd: &File, capability: u64) -> GrallocResult<u64> {
    let mut cap = drm_get_cap {
        capability,
        value: 0,
    };

    // Safe because the kernel only writes the value field of a properly sized struct.
    unsafe {
        drm_ioctl_get_cap(fd.as_raw_fd(), &mut cap)?;
    }

    Ok(cap.value)
}

/// Capabilities of a DRM display device.  The generation is not probed here and has to be
/// supplied by the caller.
pub struct DrmCapabilities {
    fd: File,
    generation: GenerationTier,
}

impl DrmCapabilities {
    /// Opens the first DRM card node in `/dev/dri/` that answers capability queries.
    pub fn open(generation: GenerationTier) -> GrallocResult<DrmCapabilities> {
        const DRM_DIR_NAME: &str = "/dev/dri";
        const DRM_MAX_MINOR: u32 = 15;

        for n in 0..=DRM_MAX_MINOR {
            let path = Path::new(DRM_DIR_NAME).join(format!("card{}", n));
            if let Ok(caps) = DrmCapabilities::open_path(&path, generation) {
                return Ok(caps);
            }
        }

        Err(GrallocError::ManagerError(-libc::ENODEV))
    }

    /// Opens the DRM device at `path`.
    pub fn open_path(path: &Path, generation: GenerationTier) -> GrallocResult<DrmCapabilities> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        // Reject anything that is not a DRM device up front.
        get_cap(&fd, DRM_CAP_CURSOR_WIDTH)?;
        Ok(DrmCapabilities { fd, generation })
    }
}

impl DeviceCapabilities for DrmCapabilities {
    fn preferred_cursor_size(&self) -> GrallocResult<(u32, u32)> {
        let width = get_cap(&self.fd, DRM_CAP_CURSOR_WIDTH)?;
        let height = match get_cap(&self.fd, DRM_CAP_CURSOR_HEIGHT) {
            Ok(height) => height,
            Err(e) => {
                error!("cannot get cursor height: {}", e);
                0
            }
        };

        let width: u32 = width.try_into()?;
        let height: u32 = height.try_into()?;
        Ok((width, height))
    }

    fn generation(&self) -> GenerationTier {
        self.generation
    }
}
