//! Subprocess-backed capability provider.
//!
//! Invokes `modetest`, `media-ctl` and `v4l2-ctl` synchronously. These run
//! once, serially, during startup validation.

use super::capability::CapabilitySet;
use super::parse;
use super::traits::CapabilityProvider;
use crate::error::{LaunchError, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::Command;

const MIPI_DRIVER: &str = "xilinx-video";
const USB_DRIVER: &str = "uvcvideo";
const DISPLAY_DRIVER: &str = "xlnx";

/// Media node paired with the first video node of its topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbCandidate {
    pub media: PathBuf,
    pub video: Option<PathBuf>,
}

pub struct SystemProbe {
    dev_dir: PathBuf,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::with_dev_dir("/dev")
    }

    pub fn with_dev_dir(dev_dir: impl Into<PathBuf>) -> Self {
        Self { dev_dir: dev_dir.into() }
    }

    /// `<dev>/media*` nodes ordered by their numeric suffix
    fn media_nodes(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.dev_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {}: {}", self.dev_dir.display(), e);
                return Vec::new();
            }
        };

        let mut nodes: Vec<(u32, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let id = name.to_str()?.strip_prefix("media")?.parse::<u32>().ok()?;
                Some((id, entry.path()))
            })
            .collect();
        nodes.sort_by_key(|(id, _)| *id);
        nodes.into_iter().map(|(_, path)| path).collect()
    }

    fn media_topology(&self, node: &Path) -> Option<String> {
        let node = node.to_string_lossy();
        run_tool("media-ctl", &["-d", node.as_ref(), "-p"])
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityProvider for SystemProbe {
    fn probe_display(&self) -> CapabilitySet {
        let modes = run_tool("modetest", &["-M", DISPLAY_DRIVER, "-c"])
            .map(|out| parse::parse_modetest_modes(&out))
            .unwrap_or_default();
        if modes.is_empty() {
            warn!("No display modes reported by modetest");
        }
        modes
    }

    fn probe_camera(&self, device: &Path) -> CapabilitySet {
        let node = device.to_string_lossy();
        let sizes = run_tool("v4l2-ctl", &["--list-formats-ext", "-d", node.as_ref()])
            .map(|out| parse::parse_v4l2_sizes(&out))
            .unwrap_or_default();
        if sizes.is_empty() {
            warn!("No frame sizes reported for {}", device.display());
        }
        sizes
    }

    fn find_mipi_device(&self) -> Result<PathBuf> {
        for node in self.media_nodes() {
            let driver = self
                .media_topology(&node)
                .and_then(|out| parse::parse_media_driver(&out));
            debug!("{}: driver {:?}", node.display(), driver);
            if driver.as_deref() == Some(MIPI_DRIVER) {
                return Ok(node);
            }
        }
        Err(LaunchError::DeviceNotReady(format!(
            "no media node with driver '{}' found, check the MIPI camera connection and loaded firmware",
            MIPI_DRIVER
        )))
    }

    fn find_usb_device(&self, media_id: Option<u32>) -> Result<PathBuf> {
        let nodes = match media_id {
            Some(id) => {
                let node = self.dev_dir.join(format!("media{}", id));
                if node.exists() { vec![node] } else { Vec::new() }
            }
            None => self.media_nodes(),
        };

        let candidates = nodes
            .into_iter()
            .filter_map(|node| {
                let topology = self.media_topology(&node)?;
                if parse::parse_media_driver(&topology).as_deref() != Some(USB_DRIVER) {
                    return None;
                }
                let video = parse::parse_media_video_node(&topology).map(PathBuf::from);
                Some(UsbCandidate { media: node, video })
            })
            .collect();

        select_usb_candidate(candidates)
    }

    fn device_ready(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_privileged(&self) -> bool {
        // SAFETY: geteuid has no preconditions and cannot fail
        unsafe { libc::geteuid() == 0 }
    }
}

/// Zero candidates is not found, more than one is ambiguous
pub fn select_usb_candidate(candidates: Vec<UsbCandidate>) -> Result<PathBuf> {
    match candidates.as_slice() {
        [] => Err(LaunchError::DeviceNotFound(
            "no USB camera found, check the connection".to_string(),
        )),
        [single] => single.video.clone().ok_or_else(|| {
            LaunchError::DeviceNotFound(format!(
                "USB camera at {} exposes no video node",
                single.media.display()
            ))
        }),
        many => {
            let listing = many
                .iter()
                .map(|c| c.media.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Err(LaunchError::AmbiguousDevice(format!(
                "multiple USB cameras found ({}), select one with --usb <media id>",
                listing
            )))
        }
    }
}

/// Run a diagnostic tool, returning stdout on success
fn run_tool(program: &str, args: &[&str]) -> Option<String> {
    match Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(output) => {
            warn!(
                "{} {} exited with {}: {}",
                program,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            None
        }
        Err(e) => {
            warn!("Failed to run {}: {}", program, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(media: &str, video: Option<&str>) -> UsbCandidate {
        UsbCandidate {
            media: PathBuf::from(media),
            video: video.map(PathBuf::from),
        }
    }

    #[test]
    fn test_usb_selection_outcomes() {
        assert!(matches!(
            select_usb_candidate(Vec::new()),
            Err(LaunchError::DeviceNotFound(_))
        ));

        let one = select_usb_candidate(vec![candidate("/dev/media1", Some("/dev/video2"))]);
        assert_eq!(one.unwrap(), PathBuf::from("/dev/video2"));

        match select_usb_candidate(vec![
            candidate("/dev/media1", Some("/dev/video2")),
            candidate("/dev/media3", Some("/dev/video4")),
        ]) {
            Err(LaunchError::AmbiguousDevice(msg)) => {
                assert!(msg.contains("/dev/media1"));
                assert!(msg.contains("/dev/media3"));
            }
            other => panic!("expected ambiguous device, got {:?}", other),
        }
    }

    #[test]
    fn test_single_candidate_without_video_node() {
        let result = select_usb_candidate(vec![candidate("/dev/media1", None)]);
        assert!(matches!(result, Err(LaunchError::DeviceNotFound(_))));
    }

    #[test]
    fn test_media_nodes_sorted_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["media10", "media2", "video0", "mediaX", "media0"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let probe = SystemProbe::with_dev_dir(dir.path());
        let names: Vec<String> = probe
            .media_nodes()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["media0", "media2", "media10"]);
    }

    #[test]
    fn test_mipi_missing_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let probe = SystemProbe::with_dev_dir(dir.path());
        assert!(matches!(
            probe.find_mipi_device(),
            Err(LaunchError::DeviceNotReady(_))
        ));
    }

    #[test]
    fn test_usb_hint_for_absent_node() {
        let dir = tempfile::tempdir().unwrap();
        let probe = SystemProbe::with_dev_dir(dir.path());
        assert!(matches!(
            probe.find_usb_device(Some(7)),
            Err(LaunchError::DeviceNotFound(_))
        ));
    }
}
