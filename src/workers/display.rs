use super::{SessionPolicy, SessionReport, SinkOptions, TargetSessionController, sink};
use crate::pipeline::state::{RuntimeSession, SessionState};
use crate::pipeline::types::{Chain, Element, Stage, StageKind, TargetSpec};

/// Primary plane of the DP output
const DISPLAY_PLANE: u32 = 39;

/// Local DisplayPort playback, played once
pub struct DisplayTarget {
    target: TargetSpec,
    options: SinkOptions,
}

impl DisplayTarget {
    pub fn new(options: SinkOptions) -> Self {
        Self {
            target: TargetSpec::Display,
            options,
        }
    }
}

impl TargetSessionController for DisplayTarget {
    fn target(&self) -> &TargetSpec {
        &self.target
    }

    fn options(&self) -> &SinkOptions {
        &self.options
    }

    fn sink_stage(&self) -> Stage {
        sink(
            self.options.report,
            Element::new("kmssink")
                .prop("driver-name", "xlnx")
                .prop("plane-id", DISPLAY_PLANE)
                .prop("sync", false)
                .prop("fullscreen-overlay", true),
        )
    }

    fn audio_stage(&self) -> Option<Stage> {
        Some(
            Stage::new(
                StageKind::Audio,
                Chain::new()
                    .then(Element::new("alsasrc").prop("device", "hw:1,1"))
                    .then(Element::new("queue"))
                    .then(Element::new("audioconvert"))
                    .then(Element::new("audioresample"))
                    .then(Element::new("alsasink")),
            )
            .detached(),
        )
    }

    fn policy(&self) -> SessionPolicy {
        SessionPolicy::OneShot
    }

    fn finish(&self, session: &RuntimeSession) -> SessionReport {
        let message = match session.state() {
            SessionState::Error => "Display playback stopped on error".to_string(),
            _ => "Display playback finished".to_string(),
        };
        SessionReport {
            target: self.target.name(),
            artifact: None,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::PipelineGraph;

    #[test]
    fn test_display_sink() {
        let target = DisplayTarget::new(SinkOptions::default());
        assert_eq!(
            target.sink_stage().chains[0].to_string(),
            "queue ! kmssink driver-name=xlnx plane-id=39 sync=false fullscreen-overlay=true"
        );
    }

    #[test]
    fn test_display_audio_is_separate_chain() {
        let target = DisplayTarget::new(SinkOptions {
            audio: true,
            report: true,
            ..SinkOptions::default()
        });
        let mut graph = PipelineGraph::new();
        graph.push(Stage::new(
            StageKind::Ingest,
            Chain::new().then(Element::new("videotestsrc")),
        ));
        target.attach(&mut graph);

        assert!(!graph.bin);
        assert_eq!(
            graph.description(),
            "videotestsrc ! queue ! perf ! kmssink driver-name=xlnx plane-id=39 sync=false \
             fullscreen-overlay=true alsasrc device=hw:1,1 ! queue ! audioconvert ! audioresample ! alsasink"
        );
    }
}
