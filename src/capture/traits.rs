//! Traits for hardware capability discovery

use super::capability::CapabilitySet;
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Source of device capability data.
///
/// Probes never fail: a probe that cannot run or parse yields an empty set.
/// Device discovery does fail, with a distinct error kind per cause.
pub trait CapabilityProvider {
    /// Resolutions the attached display accepts (`WxH@refresh`)
    fn probe_display(&self) -> CapabilitySet;

    /// Resolutions a V4L2 capture node offers (`WxH`)
    fn probe_camera(&self, device: &Path) -> CapabilitySet;

    /// Media node of the MIPI capture pipeline
    fn find_mipi_device(&self) -> Result<PathBuf>;

    /// Video node of the single USB camera, optionally restricted to one media id
    fn find_usb_device(&self, media_id: Option<u32>) -> Result<PathBuf>;

    fn device_ready(&self, path: &Path) -> bool;

    /// Whether the process may touch the hardware nodes at all
    fn is_privileged(&self) -> bool;
}
