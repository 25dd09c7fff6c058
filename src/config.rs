use crate::capture::Resolution;
use crate::capture::source::{SourceFlags, UsbSelect};
use crate::encoder::EncoderParams;
use crate::error::{LaunchError, Result};
use crate::pipeline::types::{Codec, TargetSpec};
use crate::workers::SinkOptions;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use serde::Serialize;
use std::path::PathBuf;

/// Where the per-task kernel configs are installed
pub const DEFAULT_CONFDIR: &str = "/opt/xilinx/kv260-smartcam/share/vvas";

pub const AI_TASKS: [&str; 3] = ["facedetect", "ssd", "refinedet"];

/// Everything the graph builder needs beyond the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    pub resolution: Resolution,
    pub framerate: u32,
    pub aitask: String,
    pub detection: bool,
    pub roi: bool,
    pub encoder: EncoderParams,
    pub out_codec: Codec,
    pub audio: bool,
    /// `perf` element before the sink
    pub report_fps: bool,
    /// On-screen framerate from the draw kernel
    pub screen_fps: bool,
    pub confdir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::FHD,
            framerate: 30,
            aitask: AI_TASKS[0].to_string(),
            detection: true,
            roi: true,
            encoder: EncoderParams::default(),
            out_codec: Codec::H264,
            audio: false,
            report_fps: false,
            screen_fps: false,
            confdir: Some(PathBuf::from(DEFAULT_CONFDIR)),
        }
    }
}

/// Immutable run configuration, built once from the command line
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: SourceFlags,
    pub target: TargetSpec,
    pub pipeline: PipelineConfig,
    /// Print the launch description instead of running it
    pub dry_run: bool,
}

impl AppConfig {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let codec = |id: &str| -> Result<Codec> {
            matches
                .get_one::<String>(id)
                .map(|s| s.parse::<Codec>())
                .transpose()
                .map_err(LaunchError::Config)
                .map(Option::unwrap_or_default)
        };
        let number = |id: &str| -> Result<u32> {
            match matches.get_one::<u32>(id).copied() {
                Some(0) => Err(LaunchError::Config(format!("--{} must be positive", id))),
                Some(v) => Ok(v),
                None => Err(LaunchError::Config(format!("--{} is required", id))),
            }
        };
        let text = |id: &str| matches.get_one::<String>(id).cloned();

        let usb = if matches.contains_id("usb") {
            Some(match matches.get_one::<u32>("usb") {
                Some(id) => UsbSelect::MediaId(*id),
                None => UsbSelect::Autodetect,
            })
        } else {
            None
        };

        let source = SourceFlags {
            file: matches.get_one::<String>("file").map(PathBuf::from),
            infile_type: codec("infile-type")?,
            mipi: matches.get_flag("mipi"),
            usb,
        };

        let out_codec = codec("outmedia-type")?;
        let port = matches.get_one::<u16>("port").copied().unwrap_or(554);
        let target = match matches.get_one::<String>("target").map(String::as_str) {
            Some("rtsp") => TargetSpec::NetworkStream { port },
            Some("file") => TargetSpec::file_for(out_codec),
            Some("dp") | None => TargetSpec::Display,
            Some(other) => {
                return Err(LaunchError::Config(format!("unknown target '{}'", other)));
            }
        };

        let encoder = EncoderParams {
            control_rate: text("control-rate").unwrap_or_else(|| "low-latency".to_string()),
            target_bitrate: number("target-bitrate")?,
            gop_length: number("gop-length")?,
            profile: text("profile"),
            level: text("level"),
            tier: text("tier"),
            enhanced: text("encodeEnhancedParam"),
        };

        let pipeline = PipelineConfig {
            resolution: Resolution::new(number("width")?, number("height")?),
            framerate: number("framerate")?,
            aitask: text("aitask").unwrap_or_else(|| AI_TASKS[0].to_string()),
            detection: !matches.get_flag("nodet"),
            roi: !matches.get_flag("ROI-off"),
            encoder,
            out_codec,
            audio: matches.get_flag("audio"),
            report_fps: matches.get_flag("report"),
            screen_fps: matches.get_flag("screenfps"),
            confdir: matches.get_one::<String>("confdir").map(PathBuf::from),
        };

        Ok(Self {
            source,
            target,
            pipeline,
            dry_run: matches.get_flag("dry-run"),
        })
    }

    /// Options handed to the target controller
    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            codec: self.pipeline.out_codec,
            report: self.pipeline.report_fps,
            audio: self.pipeline.audio,
            aitask: self
                .pipeline
                .detection
                .then(|| self.pipeline.aitask.clone()),
        }
    }
}

fn flag(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(id).help(help).action(ArgAction::SetTrue)
}

/// Command line definition
pub fn command() -> Command {
    Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("PATH")
                .help("Location of an h26x file as input"),
        )
        .arg(flag("mipi", "Use the MIPI camera as input").short('m'))
        .arg(
            Arg::new("usb")
                .short('u')
                .long("usb")
                .value_name("MEDIA_ID")
                .help("Use a USB camera, optionally the one at /dev/media<MEDIA_ID>")
                .num_args(0..=1)
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("infile-type")
                .long("infile-type")
                .value_name("CODEC")
                .help("Codec of the input file")
                .value_parser(["h264", "h265"])
                .default_value("h264"),
        )
        .arg(
            Arg::new("width")
                .short('W')
                .long("width")
                .help("Input width")
                .value_parser(value_parser!(u32))
                .default_value("1920"),
        )
        .arg(
            Arg::new("height")
                .short('H')
                .long("height")
                .help("Input height")
                .value_parser(value_parser!(u32))
                .default_value("1080"),
        )
        .arg(
            Arg::new("framerate")
                .short('r')
                .long("framerate")
                .help("Input framerate")
                .value_parser(value_parser!(u32))
                .default_value("30"),
        )
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .help("Output target")
                .value_parser(["dp", "rtsp", "file"])
                .default_value("dp"),
        )
        .arg(
            Arg::new("outmedia-type")
                .long("outmedia-type")
                .value_name("CODEC")
                .help("Codec of the encoded output")
                .value_parser(["h264", "h265"])
                .default_value("h264"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("RTSP port")
                .value_parser(value_parser!(u16))
                .default_value("554"),
        )
        .arg(
            Arg::new("aitask")
                .short('a')
                .long("aitask")
                .help("AI task to run")
                .value_parser(AI_TASKS)
                .default_value(AI_TASKS[0]),
        )
        .arg(flag("nodet", "Disable AI inference").short('n'))
        .arg(flag("audio", "Include audio").short('A'))
        .arg(flag("report", "Report FPS").short('R'))
        .arg(flag("screenfps", "Display FPS on screen").short('s'))
        .arg(flag("ROI-off", "Disable ROI-based encoding"))
        .arg(
            Arg::new("control-rate")
                .long("control-rate")
                .help("Encoder rate control mode")
                .default_value("low-latency"),
        )
        .arg(
            Arg::new("target-bitrate")
                .long("target-bitrate")
                .help("Encoder target bitrate in kbps")
                .value_parser(value_parser!(u32))
                .default_value("3000"),
        )
        .arg(
            Arg::new("gop-length")
                .long("gop-length")
                .help("Encoder GOP length")
                .value_parser(value_parser!(u32))
                .default_value("60"),
        )
        .arg(Arg::new("profile").long("profile").help("Encoder profile"))
        .arg(Arg::new("level").long("level").help("Encoder level"))
        .arg(Arg::new("tier").long("tier").help("Encoder tier"))
        .arg(
            Arg::new("encodeEnhancedParam")
                .long("encodeEnhancedParam")
                .value_name("K=V,...")
                .help("Encoder parameters replacing the default tuning block"),
        )
        .arg(
            Arg::new("confdir")
                .long("confdir")
                .value_name("DIR")
                .help("Directory holding the per-task kernel configs")
                .default_value(DEFAULT_CONFDIR),
        )
        .arg(flag(
            "dry-run",
            "Print the launch description and exit",
        ))
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
