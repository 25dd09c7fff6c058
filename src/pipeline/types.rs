//! Core types for the pipeline graph
//!
//! A graph is an ordered list of typed stages. Each stage holds one or more
//! chains of nodes; nodes inside a chain are linked with ` ! `, chains inside
//! a stage are separated by a space (used by the tee/affixer branch). The
//! first chain of a stage links onto the last chain of the previous one.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Video elementary stream codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    H264,
    H265,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::H265 => "h265",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" => Ok(Codec::H264),
            "h265" => Ok(Codec::H265),
            other => Err(format!("unsupported codec '{}', expected h264 or h265", other)),
        }
    }
}

/// Where the processed video goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TargetSpec {
    Display,
    NetworkStream { port: u16 },
    FileCapture { path: PathBuf },
}

impl TargetSpec {
    /// File capture target writing `./out.<codec>`
    pub fn file_for(codec: Codec) -> Self {
        TargetSpec::FileCapture {
            path: PathBuf::from(format!("./out.{}", codec)),
        }
    }

    pub fn needs_encode(&self) -> bool {
        !matches!(self, TargetSpec::Display)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TargetSpec::Display => "dp",
            TargetSpec::NetworkStream { .. } => "rtsp",
            TargetSpec::FileCapture { .. } => "file",
        }
    }
}

/// A named element with ordered properties: `factory name=x key=value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub factory: String,
    pub props: Vec<(String, String)>,
    /// Pre-rendered parameter text appended verbatim
    pub extra: Option<String>,
}

impl Element {
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            props: Vec::new(),
            extra: None,
        }
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.props.push((key.into(), value.to_string()));
        self
    }

    /// Quoted property value, for paths
    pub fn path_prop(self, key: impl Into<String>, path: &Path) -> Self {
        self.prop(key, format!("\"{}\"", path.display()))
    }

    pub fn extra(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.extra = Some(text.trim().to_string());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.factory)?;
        for (key, value) in &self.props {
            write!(f, " {}={}", key, value)?;
        }
        if let Some(extra) = &self.extra {
            write!(f, " {}", extra)?;
        }
        Ok(())
    }
}

/// Caps filter: `video/x-raw, width=1920, height=1080`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caps {
    pub media: String,
    pub fields: Vec<(String, String)>,
}

impl Caps {
    pub fn new(media: impl Into<String>) -> Self {
        Self {
            media: media.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.media)?;
        for (key, value) in &self.fields {
            write!(f, ", {}={}", key, value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Node {
    Element(Element),
    Caps(Caps),
    /// Reference to a named pad or element, e.g. `t.` or `ima.sink_master`
    Pad(String),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Element(element) => write!(f, "{}", element),
            Node::Caps(caps) => write!(f, "{}", caps),
            Node::Pad(pad) => f.write_str(pad),
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

impl From<Caps> for Node {
    fn from(caps: Caps) -> Self {
        Node::Caps(caps)
    }
}

/// Nodes linked with ` ! `
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Chain(pub Vec<Node>);

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, node: impl Into<Node>) -> Self {
        self.0.push(node.into());
        self
    }

    pub fn pad(self, pad: impl Into<String>) -> Self {
        self.then(Node::Pad(pad.into()))
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ! ")?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageKind {
    Ingest,
    Decode,
    Detect,
    Overlay,
    Roi,
    Encode,
    Sink,
    Audio,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub kind: StageKind,
    pub chains: Vec<Chain>,
    /// Device nodes this stage needs at runtime
    pub devices: Vec<PathBuf>,
    /// Starts its own chain instead of linking onto the previous stage
    pub detached: bool,
}

impl Stage {
    pub fn new(kind: StageKind, chain: Chain) -> Self {
        Self {
            kind,
            chains: vec![chain],
            devices: Vec::new(),
            detached: false,
        }
    }

    pub fn branched(kind: StageKind, chains: Vec<Chain>) -> Self {
        Self {
            kind,
            chains,
            devices: Vec::new(),
            detached: false,
        }
    }

    pub fn requires(mut self, device: impl Into<PathBuf>) -> Self {
        self.devices.push(device.into());
        self
    }

    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// All elements in this stage, in description order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.chains.iter().flat_map(|c| c.0.iter()).filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn element(&self, factory_prefix: &str) -> Option<&Element> {
        self.elements().find(|e| e.factory.starts_with(factory_prefix))
    }

    pub fn caps(&self) -> impl Iterator<Item = &Caps> {
        self.chains.iter().flat_map(|c| c.0.iter()).filter_map(|n| match n {
            Node::Caps(c) => Some(c),
            _ => None,
        })
    }
}

/// Ordered stage list, serialized to a launch description at the engine boundary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineGraph {
    pub stages: Vec<Stage>,
    /// Wrap the whole description in `( ... )`, as a media factory expects
    pub bin: bool,
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn has(&self, kind: StageKind) -> bool {
        self.stages.iter().any(|s| s.kind == kind)
    }

    pub fn stage(&self, kind: StageKind) -> Option<&Stage> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind).collect()
    }

    /// Device nodes needed by any stage, without duplicates
    pub fn required_devices(&self) -> Vec<PathBuf> {
        let mut devices: Vec<PathBuf> = Vec::new();
        for device in self.stages.iter().flat_map(|s| s.devices.iter()) {
            if !devices.contains(device) {
                devices.push(device.clone());
            }
        }
        devices
    }

    /// Flattened launch description
    pub fn description(&self) -> String {
        let mut out = String::new();
        for stage in &self.stages {
            for (i, chain) in stage.chains.iter().enumerate() {
                if !out.is_empty() {
                    out.push_str(if i == 0 && !stage.detached { " ! " } else { " " });
                }
                out.push_str(&chain.to_string());
            }
        }

        if self.bin {
            format!("( {} )", out)
        } else {
            out
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for PipelineGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}
