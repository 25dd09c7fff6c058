use super::{SessionPolicy, SessionReport, SinkOptions, TargetSessionController, sink};
use crate::pipeline::state::{RuntimeSession, SessionState};
use crate::pipeline::types::{Element, Stage, TargetSpec};
use log::warn;
use std::path::PathBuf;

/// Writes the encoded elementary stream to disk, once to end of input
pub struct FileCapture {
    target: TargetSpec,
    path: PathBuf,
    options: SinkOptions,
}

impl FileCapture {
    pub fn new(path: PathBuf, options: SinkOptions) -> Self {
        Self {
            target: TargetSpec::FileCapture { path: path.clone() },
            path,
            options,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl TargetSessionController for FileCapture {
    fn target(&self) -> &TargetSpec {
        &self.target
    }

    fn options(&self) -> &SinkOptions {
        &self.options
    }

    fn sink_stage(&self) -> Stage {
        sink(
            self.options.report,
            Element::new("filesink").path_prop("location", &self.path),
        )
    }

    fn audio_stage(&self) -> Option<Stage> {
        warn!("Audio cannot be stored in a raw elementary stream, ignoring --audio");
        None
    }

    fn policy(&self) -> SessionPolicy {
        SessionPolicy::OneShot
    }

    fn finish(&self, session: &RuntimeSession) -> SessionReport {
        let task = match &self.options.aitask {
            Some(task) => format!("AI task {}", task),
            None => "no AI task".to_string(),
        };
        let message = match session.state() {
            SessionState::Error => format!(
                "Capture to {} stopped on error ({})",
                self.path.display(),
                task
            ),
            _ => format!(
                "Captured {} stream to {} ({}), play it back with a {} decoder",
                self.options.codec,
                self.path.display(),
                task,
                self.options.codec
            ),
        };
        SessionReport {
            target: self.target.name(),
            artifact: Some(self.path.clone()),
            message,
        }
    }
}
