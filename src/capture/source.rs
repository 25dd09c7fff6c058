//! Input source selection and validation.
//!
//! Exactly one source is active per run. Precedence is file, then MIPI, then
//! USB; lower precedence flags are reported back as ignored inputs.

use super::capability::Resolution;
use super::traits::CapabilityProvider;
use crate::error::{LaunchError, Result};
use crate::pipeline::types::{Codec, TargetSpec};
use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Resolutions the MIPI sensor pipeline is built for
pub const MIPI_RESOLUTIONS: [Resolution; 2] = [Resolution::FHD, Resolution::UHD];

/// How the USB camera was requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UsbSelect {
    Autodetect,
    MediaId(u32),
}

impl UsbSelect {
    fn media_id(self) -> Option<u32> {
        match self {
            UsbSelect::Autodetect => None,
            UsbSelect::MediaId(id) => Some(id),
        }
    }
}

/// Raw source flags as given by the operator
#[derive(Debug, Clone, Default)]
pub struct SourceFlags {
    pub file: Option<PathBuf>,
    pub infile_type: Codec,
    pub mipi: bool,
    pub usb: Option<UsbSelect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    File,
    Mipi,
    Usb,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::File => write!(f, "input file"),
            SourceKind::Mipi => write!(f, "MIPI camera"),
            SourceKind::Usb => write!(f, "USB camera"),
        }
    }
}

/// The single active input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SourceConfig {
    File { path: PathBuf, codec: Codec },
    MipiCamera { device: PathBuf },
    UsbCamera { select: UsbSelect, device: PathBuf },
}

impl SourceConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceConfig::File { .. } => SourceKind::File,
            SourceConfig::MipiCamera { .. } => SourceKind::Mipi,
            SourceConfig::UsbCamera { .. } => SourceKind::Usb,
        }
    }
}

/// A source flag that lost to a higher precedence one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgnoredInput {
    pub ignored: SourceKind,
    pub active: SourceKind,
}

impl fmt::Display for IgnoredInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ignored {
            SourceKind::Mipi => write!(
                f,
                "--mipi is ignored: the {} takes precedence over the MIPI camera",
                self.active
            ),
            SourceKind::Usb => write!(
                f,
                "--usb is ignored: the {} takes precedence over the USB camera",
                self.active
            ),
            SourceKind::File => write!(f, "--file is ignored in favour of the {}", self.active),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub source: SourceConfig,
    pub warnings: Vec<IgnoredInput>,
}

pub struct SourceResolver<'a> {
    probe: &'a dyn CapabilityProvider,
}

impl<'a> SourceResolver<'a> {
    pub fn new(probe: &'a dyn CapabilityProvider) -> Self {
        Self { probe }
    }

    /// Select the active source and validate the requested resolution
    pub fn resolve(
        &self,
        flags: &SourceFlags,
        resolution: Resolution,
        target: &TargetSpec,
    ) -> Result<ResolvedSource> {
        let present = present_kinds(flags);
        let Some(&active) = present.first() else {
            return Err(LaunchError::Config(
                "no input specified, use one of --file, --mipi or --usb".to_string(),
            ));
        };

        let warnings: Vec<IgnoredInput> = present[1..]
            .iter()
            .map(|&ignored| IgnoredInput { ignored, active })
            .collect();
        for warning in &warnings {
            warn!("{}", warning);
        }

        let source = match active {
            SourceKind::File => self.resolve_file(flags)?,
            SourceKind::Mipi => self.resolve_mipi(resolution)?,
            SourceKind::Usb => self.resolve_usb(flags, resolution)?,
        };

        if matches!(target, TargetSpec::Display) {
            let display = self.probe.probe_display();
            if !display.supports(resolution) {
                return Err(LaunchError::CapabilityMismatch(format!(
                    "display does not support {}, supported resolutions: {}",
                    resolution,
                    display.describe()
                )));
            }
        }

        info!("Input source: {}", source.kind());
        Ok(ResolvedSource { source, warnings })
    }

    fn resolve_file(&self, flags: &SourceFlags) -> Result<SourceConfig> {
        let path = flags.file.clone().unwrap_or_default();
        if !path.is_file() {
            return Err(LaunchError::Config(format!(
                "file not found: {}",
                path.display()
            )));
        }
        Ok(SourceConfig::File {
            path,
            codec: flags.infile_type,
        })
    }

    fn resolve_mipi(&self, resolution: Resolution) -> Result<SourceConfig> {
        // fixed sensor modes, checked before touching any device
        if !MIPI_RESOLUTIONS.contains(&resolution) {
            return Err(LaunchError::Config(format!(
                "MIPI camera supports only 1920x1080 or 3840x2160, got {}",
                resolution
            )));
        }
        let device = self.probe.find_mipi_device()?;
        Ok(SourceConfig::MipiCamera { device })
    }

    fn resolve_usb(&self, flags: &SourceFlags, resolution: Resolution) -> Result<SourceConfig> {
        let select = flags.usb.unwrap_or(UsbSelect::Autodetect);
        let device = self.probe.find_usb_device(select.media_id())?;

        let supported = self.probe.probe_camera(&device);
        if !supported.supports(resolution) {
            return Err(LaunchError::CapabilityMismatch(format!(
                "USB camera {} does not support {}, supported resolutions: {}",
                device.display(),
                resolution,
                supported.describe()
            )));
        }
        Ok(SourceConfig::UsbCamera { select, device })
    }
}

/// Present source flags in precedence order
fn present_kinds(flags: &SourceFlags) -> Vec<SourceKind> {
    let mut kinds = Vec::with_capacity(3);
    if flags.file.is_some() {
        kinds.push(SourceKind::File);
    }
    if flags.mipi {
        kinds.push(SourceKind::Mipi);
    }
    if flags.usb.is_some() {
        kinds.push(SourceKind::Usb);
    }
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::fake::FakeProbe;

    fn stream() -> TargetSpec {
        TargetSpec::NetworkStream { port: 554 }
    }

    fn input_file() -> tempfile::NamedTempFile {
        tempfile::Builder::new().suffix(".h264").tempfile().unwrap()
    }

    #[test]
    fn test_no_input_is_config_error() {
        let probe = FakeProbe::new();
        let err = SourceResolver::new(&probe)
            .resolve(&SourceFlags::default(), Resolution::FHD, &stream())
            .unwrap_err();
        assert!(matches!(err, LaunchError::Config(msg) if msg.contains("no input")));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let probe = FakeProbe::new();
        let flags = SourceFlags {
            file: Some(PathBuf::from("/nonexistent/clip.h264")),
            ..Default::default()
        };
        let err = SourceResolver::new(&probe)
            .resolve(&flags, Resolution::FHD, &stream())
            .unwrap_err();
        assert!(matches!(err, LaunchError::Config(msg) if msg.contains("file not found")));
    }

    #[test]
    fn test_precedence_and_warnings() {
        let file = input_file();
        let probe = FakeProbe::new().with_usb_camera("/dev/media1", "/dev/video2", &["1920x1080"]);
        let resolver = SourceResolver::new(&probe);

        let all = SourceFlags {
            file: Some(file.path().to_path_buf()),
            infile_type: Codec::H265,
            mipi: true,
            usb: Some(UsbSelect::Autodetect),
        };
        let resolved = resolver.resolve(&all, Resolution::FHD, &stream()).unwrap();
        assert_eq!(
            resolved.source,
            SourceConfig::File {
                path: file.path().to_path_buf(),
                codec: Codec::H265
            }
        );
        assert_eq!(resolved.warnings.len(), 2);
        assert_eq!(resolved.warnings[0].ignored, SourceKind::Mipi);
        assert_eq!(resolved.warnings[1].ignored, SourceKind::Usb);
        assert_ne!(
            resolved.warnings[0].to_string(),
            resolved.warnings[1].to_string()
        );

        let mipi_usb = SourceFlags {
            mipi: true,
            usb: Some(UsbSelect::Autodetect),
            ..Default::default()
        };
        let resolved = resolver.resolve(&mipi_usb, Resolution::FHD, &stream()).unwrap();
        assert_eq!(resolved.source.kind(), SourceKind::Mipi);
        assert_eq!(
            resolved.warnings,
            vec![IgnoredInput {
                ignored: SourceKind::Usb,
                active: SourceKind::Mipi
            }]
        );

        let usb_only = SourceFlags {
            usb: Some(UsbSelect::Autodetect),
            ..Default::default()
        };
        let resolved = resolver.resolve(&usb_only, Resolution::FHD, &stream()).unwrap();
        assert_eq!(resolved.source.kind(), SourceKind::Usb);
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn test_mipi_resolution_checked_before_probing() {
        let probe = FakeProbe::new();
        let flags = SourceFlags {
            mipi: true,
            ..Default::default()
        };
        let err = SourceResolver::new(&probe)
            .resolve(&flags, Resolution::new(1280, 720), &TargetSpec::Display)
            .unwrap_err();
        assert!(matches!(err, LaunchError::Config(_)));
        assert_eq!(probe.calls.get(), 0);
    }

    #[test]
    fn test_mipi_without_node_is_not_ready() {
        let mut probe = FakeProbe::new();
        probe.mipi = None;
        let flags = SourceFlags {
            mipi: true,
            ..Default::default()
        };
        let err = SourceResolver::new(&probe)
            .resolve(&flags, Resolution::UHD, &stream())
            .unwrap_err();
        assert!(matches!(err, LaunchError::DeviceNotReady(_)));
    }

    #[test]
    fn test_usb_resolution_mismatch_lists_supported() {
        let probe = FakeProbe::new().with_usb_camera(
            "/dev/media1",
            "/dev/video2",
            &["640x480", "1280x720"],
        );
        let flags = SourceFlags {
            usb: Some(UsbSelect::Autodetect),
            ..Default::default()
        };
        match SourceResolver::new(&probe).resolve(&flags, Resolution::FHD, &stream()) {
            Err(LaunchError::CapabilityMismatch(msg)) => {
                assert!(msg.contains("640x480"));
                assert!(msg.contains("1280x720"));
            }
            other => panic!("expected capability mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_usb_media_id_hint() {
        let probe = FakeProbe::new()
            .with_usb_camera("/dev/media1", "/dev/video2", &["1920x1080"])
            .with_usb_camera("/dev/media3", "/dev/video4", &["1920x1080"]);
        let resolver = SourceResolver::new(&probe);

        let auto = SourceFlags {
            usb: Some(UsbSelect::Autodetect),
            ..Default::default()
        };
        assert!(matches!(
            resolver.resolve(&auto, Resolution::FHD, &stream()),
            Err(LaunchError::AmbiguousDevice(_))
        ));

        let pinned = SourceFlags {
            usb: Some(UsbSelect::MediaId(3)),
            ..Default::default()
        };
        let resolved = resolver.resolve(&pinned, Resolution::FHD, &stream()).unwrap();
        assert_eq!(
            resolved.source,
            SourceConfig::UsbCamera {
                select: UsbSelect::MediaId(3),
                device: PathBuf::from("/dev/video4")
            }
        );
    }

    #[test]
    fn test_display_target_checks_display_modes() {
        let file = input_file();
        let mut probe = FakeProbe::new();
        probe.display = ["3840x2160@30"].into_iter().collect();
        let flags = SourceFlags {
            file: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let resolver = SourceResolver::new(&probe);

        let err = resolver
            .resolve(&flags, Resolution::FHD, &TargetSpec::Display)
            .unwrap_err();
        assert!(matches!(err, LaunchError::CapabilityMismatch(msg) if msg.contains("3840x2160@30")));

        // other targets never consult the display
        assert!(resolver.resolve(&flags, Resolution::FHD, &stream()).is_ok());
    }
}
