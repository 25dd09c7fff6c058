//! One launcher run: validate, synthesize, launch, supervise

use crate::capture::{CapabilityProvider, SourceResolver};
use crate::config::AppConfig;
use crate::engine::MediaEngine;
use crate::error::{LaunchError, Result};
use crate::pipeline::{PipelineGraph, PipelineGraphBuilder, RuntimeSupervisor};
use crate::workers::{self, SessionReport};
use log::{debug, info};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// `--dry-run`: the description that would have been launched
    DryRun(String),
    Finished(SessionReport),
}

pub struct Runner<'a> {
    config: &'a AppConfig,
    probe: &'a dyn CapabilityProvider,
    engine: &'a dyn MediaEngine,
}

impl<'a> Runner<'a> {
    pub fn new(
        config: &'a AppConfig,
        probe: &'a dyn CapabilityProvider,
        engine: &'a dyn MediaEngine,
    ) -> Self {
        Self {
            config,
            probe,
            engine,
        }
    }

    /// Every check that must pass before a session may exist
    pub fn plan(&self) -> Result<(PipelineGraph, Box<dyn workers::TargetSessionController>)> {
        if !self.probe.is_privileged() {
            return Err(LaunchError::NotPrivileged(
                "the launcher must be run as root".to_string(),
            ));
        }

        let resolved = SourceResolver::new(self.probe).resolve(
            &self.config.source,
            self.config.pipeline.resolution,
            &self.config.target,
        )?;

        let mut graph = PipelineGraphBuilder::new(&self.config.pipeline)
            .build(&resolved.source, &self.config.target)?;

        let controller = workers::controller_for(&self.config.target, self.config.sink_options());
        controller.attach(&mut graph);

        for device in graph.required_devices() {
            if !self.probe.device_ready(&device) {
                return Err(LaunchError::DeviceNotReady(format!(
                    "{} is missing, is the accelerator firmware loaded?",
                    device.display()
                )));
            }
        }

        debug!("Graph: {:?}", graph.kinds());
        Ok((graph, controller))
    }

    pub async fn run(&self, quit: CancellationToken) -> Result<RunOutcome> {
        let (graph, mut controller) = self.plan()?;

        if self.config.dry_run {
            return Ok(RunOutcome::DryRun(graph.description()));
        }

        let request = controller.prepare(&graph);
        let report = RuntimeSupervisor::new(controller.as_mut(), quit)
            .run(self.engine, request)
            .await?;
        info!("{}", report.message);
        Ok(RunOutcome::Finished(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::fake::FakeProbe;
    use crate::capture::source::SourceFlags;
    use crate::config::PipelineConfig;
    use crate::engine::fake::ScriptedEngine;
    use crate::engine::{EngineMessage, LaunchRequest};
    use crate::pipeline::builder::fixtures;
    use crate::pipeline::{Codec, TargetSpec};
    use std::path::{Path, PathBuf};

    fn file_config(input: &Path, confdir: &Path, target: TargetSpec) -> AppConfig {
        AppConfig {
            source: SourceFlags {
                file: Some(input.to_path_buf()),
                infile_type: Codec::H264,
                ..SourceFlags::default()
            },
            target,
            pipeline: PipelineConfig {
                out_codec: Codec::H265,
                aitask: "facedetect".to_string(),
                confdir: Some(confdir.to_path_buf()),
                ..PipelineConfig::default()
            },
            dry_run: false,
        }
    }

    fn workspace() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_task_dir(dir.path(), "facedetect");
        let input = dir.path().join("clip.h264");
        std::fs::write(&input, b"\x00\x00\x00\x01").unwrap();
        (dir, input)
    }

    #[tokio::test]
    async fn test_file_capture_end_to_end() {
        let (dir, input) = workspace();
        let config = file_config(&input, dir.path(), TargetSpec::file_for(Codec::H265));
        let probe = FakeProbe::new();
        let engine = ScriptedEngine::new(vec![
            EngineMessage::Info("Setting pipeline to PLAYING ...".into()),
            EngineMessage::Eos { client: None },
        ]);

        let outcome = Runner::new(&config, &probe, &engine)
            .run(CancellationToken::new())
            .await
            .unwrap();

        let RunOutcome::Finished(report) = outcome else {
            panic!("expected a finished run");
        };
        assert_eq!(report.artifact, Some(PathBuf::from("./out.h265")));
        assert!(report.message.contains("facedetect"));

        let Some(LaunchRequest::Pipeline { description }) = engine.last_request() else {
            panic!("expected a pipeline launch");
        };
        assert!(description.starts_with(&format!("filesrc location=\"{}\"", input.display())));
        assert!(description.contains("omxh264dec"));
        assert!(description.contains("vvas_xroigen"));
        assert!(description.contains("omxh265enc qp-mode=1"));
        assert!(description.ends_with("! queue ! filesink location=\"./out.h265\""));
    }

    #[tokio::test]
    async fn test_dry_run_does_not_launch() {
        let (dir, input) = workspace();
        let mut config = file_config(&input, dir.path(), TargetSpec::NetworkStream { port: 554 });
        config.dry_run = true;
        let probe = FakeProbe::new();
        let engine = ScriptedEngine::new(Vec::new());

        let outcome = Runner::new(&config, &probe, &engine)
            .run(CancellationToken::new())
            .await
            .unwrap();
        match outcome {
            RunOutcome::DryRun(description) => {
                assert!(description.starts_with("( filesrc"));
                assert!(description.ends_with("rtph265pay name=pay0 pt=96 )"));
            }
            other => panic!("expected dry run, got {:?}", other),
        }
        assert!(engine.last_request().is_none());
    }

    #[test]
    fn test_unprivileged_run_is_refused() {
        let (dir, input) = workspace();
        let config = file_config(&input, dir.path(), TargetSpec::Display);
        let mut probe = FakeProbe::new();
        probe.privileged = false;
        let engine = ScriptedEngine::new(Vec::new());

        let err = Runner::new(&config, &probe, &engine).plan().err().unwrap();
        assert!(matches!(err, LaunchError::NotPrivileged(_)));
    }

    #[test]
    fn test_missing_encoder_node_is_not_ready() {
        let (dir, input) = workspace();
        let config = file_config(&input, dir.path(), TargetSpec::file_for(Codec::H265));
        let mut probe = FakeProbe::new();
        probe.ready.remove(Path::new("/dev/allegroIP"));
        let engine = ScriptedEngine::new(Vec::new());

        match Runner::new(&config, &probe, &engine).plan() {
            Err(LaunchError::DeviceNotReady(msg)) => assert!(msg.contains("/dev/allegroIP")),
            Err(other) => panic!("expected device not ready, got {:?}", other),
            Ok(_) => panic!("expected device not ready"),
        }
    }

    #[test]
    fn test_no_source_is_config_error() {
        let config = AppConfig {
            source: SourceFlags::default(),
            target: TargetSpec::Display,
            pipeline: PipelineConfig::default(),
            dry_run: false,
        };
        let probe = FakeProbe::new();
        let engine = ScriptedEngine::new(Vec::new());
        let err = Runner::new(&config, &probe, &engine).plan().err().unwrap();
        assert!(matches!(err, LaunchError::Config(_)));
        assert!(err.is_pre_launch());
    }

    #[tokio::test]
    async fn test_runtime_error_on_file_target_fails_run() {
        let (dir, input) = workspace();
        let config = file_config(&input, dir.path(), TargetSpec::file_for(Codec::H265));
        let probe = FakeProbe::new();
        let engine = ScriptedEngine::new(vec![EngineMessage::error(
            "/GstPipeline:pipeline0/GstOMXH264Dec-omxh264dec:omxh264dec-omxh264dec0",
            "Could not configure supporting library.",
        )]);

        let err = Runner::new(&config, &probe, &engine)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::RuntimeMedia(_)));
        assert!(!err.is_pre_launch());
    }
}
