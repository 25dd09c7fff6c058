//! Pipeline graph synthesis
//!
//! Turns a validated source and pipeline configuration into the stage graph
//! up to the pre-sink boundary. The sink (and any audio chain) is added by
//! the target session controller.

use super::types::{Caps, Chain, Codec, Element, PipelineGraph, Stage, StageKind, TargetSpec};
use crate::capture::Resolution;
use crate::capture::source::SourceConfig;
use crate::config::PipelineConfig;
use crate::error::{LaunchError, Result};
use crate::kernel::{DrawConfig, PreprocessConfig};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// VCU decoder device node
pub const DECODER_DEVICE: &str = "/dev/allegroDecodeIP";

const PREPROCESS_CONFIG: &str = "preprocess.json";
const INFERENCE_CONFIG: &str = "aiinference.json";
const DRAW_CONFIG: &str = "drawresult.json";

const ROI_QP_DELTA: i32 = -10;
const ROI_MAX_NUM: u32 = 10;

/// Per-task kernel configuration files of the detection branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionResources {
    pub preprocess: PathBuf,
    pub inference: PathBuf,
    pub draw: PathBuf,
}

impl DetectionResources {
    /// Locate and validate `<confdir>/<task>/{preprocess,aiinference,drawresult}.json`
    pub fn locate(confdir: Option<&Path>, task: &str) -> Result<Self> {
        let dir = task_dir(confdir, task)?;
        let resources = Self {
            preprocess: require_file(&dir, PREPROCESS_CONFIG)?,
            inference: require_file(&dir, INFERENCE_CONFIG)?,
            draw: require_file(&dir, DRAW_CONFIG)?,
        };

        PreprocessConfig::load(&resources.preprocess).map_err(|e| {
            LaunchError::GraphConstruction(format!("{}: {}", resources.preprocess.display(), e))
        })?;
        DrawConfig::load(&resources.draw).map_err(|e| {
            LaunchError::GraphConstruction(format!("{}: {}", resources.draw.display(), e))
        })?;

        Ok(resources)
    }
}

fn task_dir(confdir: Option<&Path>, task: &str) -> Result<PathBuf> {
    let confdir = confdir.ok_or_else(|| {
        LaunchError::GraphConstruction(
            "detection is enabled but no configuration directory was given".to_string(),
        )
    })?;
    let dir = confdir.join(task);
    if !dir.is_dir() {
        return Err(LaunchError::GraphConstruction(format!(
            "configuration directory {} for AI task '{}' does not exist",
            dir.display(),
            task
        )));
    }
    Ok(dir)
}

fn require_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(LaunchError::GraphConstruction(format!(
            "missing kernel configuration {}",
            path.display()
        )))
    }
}

pub struct PipelineGraphBuilder<'a> {
    config: &'a PipelineConfig,
}

impl<'a> PipelineGraphBuilder<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// File input already in the output codec, no detection, streamed out:
    /// the parsed elementary stream is payloaded as is.
    pub fn is_passthrough(&self, source: &SourceConfig, target: &TargetSpec) -> bool {
        match source {
            SourceConfig::File { codec, .. } => {
                *codec == self.config.out_codec
                    && !self.config.detection
                    && matches!(target, TargetSpec::NetworkStream { .. })
            }
            _ => false,
        }
    }

    pub fn build(&self, source: &SourceConfig, target: &TargetSpec) -> Result<PipelineGraph> {
        let mut graph = PipelineGraph::new();
        graph.push(self.ingest_stage(source, target));

        if self.is_passthrough(source, target) {
            info!("Input codec matches output codec, skipping decode and encode");
            return Ok(graph);
        }

        if let SourceConfig::File { codec, .. } = source {
            graph.push(self.decode_stage(*codec));
        }

        if self.config.detection {
            let resources =
                DetectionResources::locate(self.config.confdir.as_deref(), &self.config.aitask)?;
            graph.push(detect_stage(&resources));
        } else if self.config.screen_fps {
            self.push_overlay_only(&mut graph);
        }

        if target.needs_encode() {
            if self.config.roi {
                graph.push(roi_stage());
            }
            graph.push(
                self.config
                    .encoder
                    .encode_stage(self.config.out_codec, self.config.roi),
            );
        }

        debug!("Pre-sink graph: {:?}", graph.kinds());
        Ok(graph)
    }

    fn ingest_stage(&self, source: &SourceConfig, target: &TargetSpec) -> Stage {
        let resolution = self.config.resolution;
        let raw_caps = || {
            Caps::new("video/x-raw")
                .field("width", resolution.width)
                .field("height", resolution.height)
        };

        let chain = match source {
            SourceConfig::File { path, codec } => Chain::new()
                .then(Element::new("filesrc").path_prop("location", path))
                .then(Element::new(format!("{}parse", codec)))
                .then(Element::new("queue")),
            SourceConfig::MipiCamera { device } => {
                let mut src = Element::new("mediasrcbin")
                    .prop("name", "videosrc")
                    .prop("media-device", device.display());
                if resolution == Resolution::FHD
                    && matches!(target, TargetSpec::Display)
                {
                    src = src
                        .prop("v4l2src0::io-mode", "dmabuf")
                        .prop("v4l2src0::stride-align", 256);
                }
                Chain::new().then(src).then(
                    raw_caps()
                        .field("format", "NV12")
                        .field("framerate", format!("{}/1", self.config.framerate)),
                )
            }
            SourceConfig::UsbCamera { device, .. } => Chain::new()
                .then(
                    Element::new("v4l2src")
                        .prop("name", "videosrc")
                        .prop("device", device.display())
                        .prop("io-mode", "mmap"),
                )
                .then(raw_caps())
                .then(Element::new("videoconvert"))
                .then(Caps::new("video/x-raw").field("format", "NV12")),
        };

        Stage::new(StageKind::Ingest, chain)
    }

    fn decode_stage(&self, codec: Codec) -> Stage {
        let resolution = self.config.resolution;
        Stage::new(
            StageKind::Decode,
            Chain::new()
                .then(Element::new(format!("omx{}dec", codec)))
                .then(
                    Caps::new("video/x-raw")
                        .field("width", resolution.width)
                        .field("height", resolution.height)
                        .field("format", "NV12")
                        .field("framerate", format!("{}/1", self.config.framerate)),
                ),
        )
        .requires(DECODER_DEVICE)
    }

    /// Draw cached metadata (and the FPS readout) without running inference
    fn push_overlay_only(&self, graph: &mut PipelineGraph) {
        let draw = task_dir(self.config.confdir.as_deref(), &self.config.aitask)
            .and_then(|dir| require_file(&dir, DRAW_CONFIG));
        match draw {
            Ok(draw) => graph.push(Stage::new(
                StageKind::Overlay,
                Chain::new()
                    .then(Element::new("queue"))
                    .then(Element::new("vvas_xfilter").path_prop("kernels-config", &draw)),
            )),
            Err(e) => warn!("On-screen FPS disabled: {}", e),
        }
    }
}

/// Tee into preprocess -> inference -> metadata merge, rejoin, then draw
fn detect_stage(resources: &DetectionResources) -> Stage {
    Stage::branched(
        StageKind::Detect,
        vec![
            Chain::new()
                .then(Element::new("tee").prop("name", "t"))
                .then(Element::new("queue"))
                .then(Element::new("vvas_xmultisrc").path_prop("kconfig", &resources.preprocess))
                .then(Element::new("queue"))
                .then(Element::new("vvas_xfilter").path_prop("kernels-config", &resources.inference))
                .pad("ima.sink_master"),
            Chain::new().then(Element::new("vvas_xmetaaffixer").prop("name", "ima")),
            Chain::new().pad("ima.src_master").then(Element::new("fakesink")),
            Chain::new()
                .pad("t.")
                .then(
                    Element::new("queue")
                        .prop("max-size-buffers", 1)
                        .prop("leaky", 2),
                )
                .pad("ima.sink_slave_0"),
            Chain::new()
                .pad("ima.src_slave_0")
                .then(Element::new("queue"))
                .then(Element::new("vvas_xfilter").path_prop("kernels-config", &resources.draw)),
        ],
    )
}

fn roi_stage() -> Stage {
    Stage::new(
        StageKind::Roi,
        Chain::new().then(Element::new("queue")).then(
            Element::new("vvas_xroigen")
                .prop("roi-type", 1)
                .prop("roi-qp-delta", ROI_QP_DELTA)
                .prop("roi-max-num", ROI_MAX_NUM),
        ),
    )
}
