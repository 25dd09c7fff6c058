//! Target session controllers
//!
//! Each output target contributes the tail of the graph (sink and optional
//! audio chain), decides how the engine is launched, and owns the target's
//! lifecycle policy and final report.

pub mod display;
pub mod save_stream;
pub mod stream;

use crate::engine::{EngineMessage, LaunchRequest};
use crate::pipeline::state::RuntimeSession;
use crate::pipeline::types::{Chain, Codec, Element, PipelineGraph, Stage, StageKind, TargetSpec};
use std::path::PathBuf;

pub use display::DisplayTarget;
pub use save_stream::FileCapture;
pub use stream::NetworkStream;

/// How the supervisor treats end of stream and fatal errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPolicy {
    /// First EOS or fatal error ends the run
    OneShot,
    /// Runs until stopped; client EOS and errors stay per client
    Persistent,
}

/// Sink-side knobs shared by every target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkOptions {
    pub codec: Codec,
    /// Insert the `perf` FPS reporter before the sink
    pub report: bool,
    pub audio: bool,
    /// AI task named in reports, `None` when detection is off
    pub aitask: Option<String>,
}

/// Outcome of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub target: &'static str,
    pub artifact: Option<PathBuf>,
    pub message: String,
}

pub trait TargetSessionController {
    fn target(&self) -> &TargetSpec;

    fn options(&self) -> &SinkOptions;

    /// Terminal stage of the video path
    fn sink_stage(&self) -> Stage;

    /// Audio chain, only asked for when audio is requested
    fn audio_stage(&self) -> Option<Stage> {
        None
    }

    /// Wrap the description in `( ... )`
    fn wraps_in_bin(&self) -> bool {
        false
    }

    /// Complete a pre-sink graph with this target's tail
    fn attach(&self, graph: &mut PipelineGraph) {
        graph.push(self.sink_stage());
        if self.options().audio {
            if let Some(audio) = self.audio_stage() {
                graph.push(audio);
            }
        }
        graph.bin = self.wraps_in_bin();
    }

    fn prepare(&mut self, graph: &PipelineGraph) -> LaunchRequest {
        LaunchRequest::Pipeline {
            description: graph.description(),
        }
    }

    fn policy(&self) -> SessionPolicy;

    /// Per-client bookkeeping, returns the number of evicted clients
    fn on_client_event(&mut self, _event: &EngineMessage) -> usize {
        0
    }

    fn finish(&self, session: &RuntimeSession) -> SessionReport;
}

/// Controller for `target`
pub fn controller_for(target: &TargetSpec, options: SinkOptions) -> Box<dyn TargetSessionController> {
    match target {
        TargetSpec::Display => Box::new(DisplayTarget::new(options)),
        TargetSpec::NetworkStream { port } => Box::new(NetworkStream::new(*port, options)),
        TargetSpec::FileCapture { path } => Box::new(FileCapture::new(path.clone(), options)),
    }
}

/// `queue [! perf] ! <sink>`
pub(crate) fn sink_chain(report: bool, sink: Element) -> Chain {
    let mut chain = Chain::new().then(Element::new("queue"));
    if report {
        chain = chain.then(Element::new("perf"));
    }
    chain.then(sink)
}

pub(crate) fn sink(report: bool, element: Element) -> Stage {
    Stage::new(StageKind::Sink, sink_chain(report, element))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_picks_policy() {
        let opts = SinkOptions::default();
        assert_eq!(
            controller_for(&TargetSpec::Display, opts.clone()).policy(),
            SessionPolicy::OneShot
        );
        assert_eq!(
            controller_for(&TargetSpec::NetworkStream { port: 554 }, opts.clone()).policy(),
            SessionPolicy::Persistent
        );
        assert_eq!(
            controller_for(&TargetSpec::file_for(Codec::H264), opts).policy(),
            SessionPolicy::OneShot
        );
    }

    #[test]
    fn test_sink_chain_report() {
        let sink = Element::new("fakesink");
        assert_eq!(sink_chain(false, sink.clone()).to_string(), "queue ! fakesink");
        assert_eq!(sink_chain(true, sink).to_string(), "queue ! perf ! fakesink");
    }
}
