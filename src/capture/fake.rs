//! In-memory capability provider for tests

use super::capability::CapabilitySet;
use super::probe::{UsbCandidate, select_usb_candidate};
use super::traits::CapabilityProvider;
use crate::error::{LaunchError, Result};
use std::cell::Cell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub struct FakeProbe {
    pub display: CapabilitySet,
    pub camera: CapabilitySet,
    pub mipi: Option<PathBuf>,
    pub usb: Vec<UsbCandidate>,
    pub ready: HashSet<PathBuf>,
    pub privileged: bool,
    /// Number of probe or discovery calls made
    pub calls: Cell<usize>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self {
            display: ["1920x1080@60", "3840x2160@30"].into_iter().collect(),
            camera: CapabilitySet::new(),
            mipi: Some(PathBuf::from("/dev/media0")),
            usb: Vec::new(),
            ready: ["/dev/allegroIP", "/dev/allegroDecodeIP"]
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            privileged: true,
            calls: Cell::new(0),
        }
    }

    pub fn with_usb_camera(mut self, media: &str, video: &str, sizes: &[&str]) -> Self {
        self.usb.push(UsbCandidate {
            media: PathBuf::from(media),
            video: Some(PathBuf::from(video)),
        });
        self.camera = sizes.iter().copied().collect();
        self
    }

    fn touch(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

impl CapabilityProvider for FakeProbe {
    fn probe_display(&self) -> CapabilitySet {
        self.touch();
        self.display.clone()
    }

    fn probe_camera(&self, _device: &Path) -> CapabilitySet {
        self.touch();
        self.camera.clone()
    }

    fn find_mipi_device(&self) -> Result<PathBuf> {
        self.touch();
        self.mipi
            .clone()
            .ok_or_else(|| LaunchError::DeviceNotReady("no MIPI media node".to_string()))
    }

    fn find_usb_device(&self, media_id: Option<u32>) -> Result<PathBuf> {
        self.touch();
        let candidates = self
            .usb
            .iter()
            .filter(|c| match media_id {
                Some(id) => c.media == Path::new(&format!("/dev/media{}", id)),
                None => true,
            })
            .cloned()
            .collect();
        select_usb_candidate(candidates)
    }

    fn device_ready(&self, path: &Path) -> bool {
        self.ready.contains(path)
    }

    fn is_privileged(&self) -> bool {
        self.privileged
    }
}
