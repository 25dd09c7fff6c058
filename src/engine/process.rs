//! Engine backed by the stock launcher binaries
//!
//! One-shot pipelines run under `gst-launch-1.0 -e`, stream servers under an
//! RTSP launcher (`test-launch -p <port> -m <mount> <description>`). Output
//! lines are classified into engine messages. The server process gets the
//! client session cap in `SMARTCAM_MAX_SESSIONS`; launchers that honour it
//! report clients as `client <id> connected|closed` lines.

use super::{EngineMessage, LaunchRequest, MediaEngine, MediaSession};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

pub const GST_LAUNCH_ENV: &str = "SMARTCAM_GST_LAUNCH";
pub const RTSP_LAUNCHER_ENV: &str = "SMARTCAM_RTSP_LAUNCHER";
/// Client session cap handed to the stream server process
pub const MAX_SESSIONS_ENV: &str = "SMARTCAM_MAX_SESSIONS";

const GST_LAUNCH: &str = "gst-launch-1.0";
const RTSP_LAUNCHER: &str = "test-launch";

/// Grace period between the interrupt and the hard kill on stop
const STOP_GRACE: Duration = Duration::from_secs(5);

pub struct ProcessEngine {
    gst_launch: String,
    rtsp_launcher: String,
    env: Vec<(String, String)>,
}

impl ProcessEngine {
    /// Binaries from the environment overrides, stock names otherwise
    pub fn from_env() -> Self {
        Self {
            gst_launch: std::env::var(GST_LAUNCH_ENV).unwrap_or_else(|_| GST_LAUNCH.to_string()),
            rtsp_launcher: std::env::var(RTSP_LAUNCHER_ENV)
                .unwrap_or_else(|_| RTSP_LAUNCHER.to_string()),
            env: Vec::new(),
        }
    }

    /// Extra environment for the launched process
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The stock `test-launch` serves every client and reports none of them;
    /// any other launcher is expected to honour `SMARTCAM_MAX_SESSIONS` and
    /// print `client <id> connected|closed` lines.
    pub fn enforces_session_cap(&self) -> bool {
        std::path::Path::new(&self.rtsp_launcher)
            .file_name()
            .is_some_and(|name| name != RTSP_LAUNCHER)
    }

    fn command(&self, request: &LaunchRequest) -> Command {
        let mut cmd = match request {
            LaunchRequest::Pipeline { description } => {
                let mut cmd = Command::new(&self.gst_launch);
                cmd.arg("-e").args(split_description(description));
                cmd
            }
            LaunchRequest::Server {
                port,
                mount,
                description,
                max_sessions,
            } => {
                let mut cmd = Command::new(&self.rtsp_launcher);
                cmd.env(MAX_SESSIONS_ENV, max_sessions.to_string())
                    .arg("-p")
                    .arg(port.to_string())
                    .arg("-m")
                    .arg(mount)
                    .arg(description);
                cmd
            }
        };
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::from_env()
    }
}

#[async_trait]
impl MediaEngine for ProcessEngine {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn MediaSession>> {
        if let LaunchRequest::Server { max_sessions, .. } = &request {
            if self.enforces_session_cap() {
                debug!("ProcessEngine: server accepts up to {} sessions", max_sessions);
            } else {
                warn!(
                    "{} neither limits nor reports client sessions, the cap of {} is NOT enforced; \
                     point {} at a launcher that reads {}",
                    self.rtsp_launcher, max_sessions, RTSP_LAUNCHER_ENV, MAX_SESSIONS_ENV
                );
            }
        }

        let mut cmd = self.command(&request);
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to start {:?}", cmd.as_std().get_program()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx);
        }

        Ok(Box::new(ProcessSession {
            child,
            rx,
            saw_eos: false,
            exited: false,
        }))
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<EngineMessage>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if tx.send(classify_line(line)).is_err() {
                break;
            }
        }
    });
}

/// Split a launch description into argv words, keeping quoted runs intact
/// and dropping the quotes, as a shell would.
pub fn split_description(description: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;

    for c in description.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    words.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        words.push(current);
    }
    words
}

/// Map one line of launcher output to a message
pub fn classify_line(line: &str) -> EngineMessage {
    if let Some(rest) = line.strip_prefix("ERROR:") {
        let rest = rest.trim();
        let (source, detail) = match rest.strip_prefix("from element ") {
            Some(from) => match from.split_once(": ") {
                Some((source, detail)) => (source.to_string(), detail.to_string()),
                None => (from.to_string(), String::new()),
            },
            None => ("engine".to_string(), rest.to_string()),
        };
        EngineMessage::error(source, detail)
    } else if let Some(rest) = line.strip_prefix("WARNING:") {
        EngineMessage::Warning(rest.trim().to_string())
    } else if line.starts_with("Got EOS") {
        EngineMessage::Eos { client: None }
    } else if let Some(event) = classify_client_line(line) {
        event
    } else {
        EngineMessage::Info(line.to_string())
    }
}

/// `client <id> connected` / `client <id> closed`
fn classify_client_line(line: &str) -> Option<EngineMessage> {
    let mut words = line.strip_prefix("client ")?.split_whitespace();
    let id = words.next()?.parse::<u32>().ok()?;
    let event = match words.next()? {
        "connected" => EngineMessage::ClientConnected(id),
        "closed" => EngineMessage::ClientClosed(id),
        _ => return None,
    };
    words.next().is_none().then_some(event)
}

pub struct ProcessSession {
    child: Child,
    rx: mpsc::UnboundedReceiver<EngineMessage>,
    saw_eos: bool,
    exited: bool,
}

#[async_trait]
impl MediaSession for ProcessSession {
    async fn next_message(&mut self) -> Option<EngineMessage> {
        if let Some(message) = self.rx.recv().await {
            if matches!(message, EngineMessage::Eos { .. }) {
                self.saw_eos = true;
            }
            return Some(message);
        }

        // both pipes closed: the process is gone or about to be
        if self.exited {
            return None;
        }
        self.exited = true;
        let status = self.child.wait().await;
        if self.saw_eos {
            return None;
        }
        let detail = match status {
            Ok(status) => format!("engine exited before end of stream ({})", status),
            Err(e) => format!("engine wait failed: {}", e),
        };
        Some(EngineMessage::error("engine", detail))
    }

    async fn stop(&mut self) -> Result<()> {
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }

        // an interrupt lets `-e` push EOS through so the output is finalized
        if let Some(pid) = self.child.id() {
            // SAFETY: pid belongs to our own child, which has not been reaped yet
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGINT);
            }
        }
        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(status) => {
                debug!("ProcessEngine: engine exited with {:?}", status);
                Ok(())
            }
            Err(_) => {
                warn!("ProcessEngine: engine ignored interrupt, killing it");
                self.child.kill().await.context("failed to kill engine")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error_line() {
        let msg = classify_line(
            "ERROR: from element /GstPipeline:pipeline0/GstFileSrc:filesrc0: Resource not found.",
        );
        assert_eq!(
            msg,
            EngineMessage::error("/GstPipeline:pipeline0/GstFileSrc:filesrc0", "Resource not found.")
        );

        let msg = classify_line("ERROR: pipeline could not be constructed: no element \"foo\".");
        assert!(matches!(msg, EngineMessage::Error { ref source, .. } if source == "engine"));
    }

    #[test]
    fn test_classify_other_lines() {
        assert_eq!(
            classify_line("Got EOS from element \"pipeline0\"."),
            EngineMessage::Eos { client: None }
        );
        assert!(matches!(
            classify_line("WARNING: from element /GstPipeline:pipeline0/GstKMSSink:kmssink0: late"),
            EngineMessage::Warning(_)
        ));
        assert_eq!(
            classify_line("Setting pipeline to PLAYING ..."),
            EngineMessage::Info("Setting pipeline to PLAYING ...".to_string())
        );
    }

    #[test]
    fn test_classify_client_lines() {
        assert_eq!(classify_line("client 7 connected"), EngineMessage::ClientConnected(7));
        assert_eq!(classify_line("client 7 closed"), EngineMessage::ClientClosed(7));
        assert!(matches!(classify_line("client 7 left early"), EngineMessage::Info(_)));
        assert!(matches!(classify_line("client x connected"), EngineMessage::Info(_)));
    }

    fn server_request() -> LaunchRequest {
        LaunchRequest::Server {
            port: 554,
            mount: "/test".to_string(),
            description: "( videotestsrc ! rtph264pay name=pay0 )".to_string(),
            max_sessions: 255,
        }
    }

    #[test]
    fn test_server_command_carries_session_cap() {
        let engine = ProcessEngine {
            gst_launch: GST_LAUNCH.to_string(),
            rtsp_launcher: "/usr/bin/smartcam-rtsp".to_string(),
            env: Vec::new(),
        };
        let cmd = engine.command(&server_request());
        let inner = cmd.as_std();

        let cap = inner
            .get_envs()
            .find(|(key, _)| *key == MAX_SESSIONS_ENV)
            .and_then(|(_, value)| value);
        assert_eq!(cap.and_then(|v| v.to_str()), Some("255"));

        let args: Vec<_> = inner.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args[..4], ["-p", "554", "-m", "/test"]);
        assert!(engine.enforces_session_cap());
    }

    #[test]
    fn test_stock_launcher_cannot_enforce_cap() {
        let stock = ProcessEngine {
            gst_launch: GST_LAUNCH.to_string(),
            rtsp_launcher: RTSP_LAUNCHER.to_string(),
            env: Vec::new(),
        };
        assert!(!stock.enforces_session_cap());

        let installed = ProcessEngine {
            rtsp_launcher: "/usr/bin/test-launch".to_string(),
            ..stock
        };
        assert!(!installed.enforces_session_cap());
    }

    #[test]
    fn test_split_description_keeps_quoted_paths() {
        let words = split_description(
            "filesrc location=/a.h264 ! vvas_xfilter kernels-config=\"/opt/x y/draw.json\"",
        );
        assert_eq!(
            words,
            vec![
                "filesrc",
                "location=/a.h264",
                "!",
                "vvas_xfilter",
                "kernels-config=/opt/x y/draw.json"
            ]
        );
    }

    #[tokio::test]
    async fn test_process_exit_without_eos_is_error() {
        let engine = ProcessEngine {
            gst_launch: "true".to_string(),
            rtsp_launcher: RTSP_LAUNCHER.to_string(),
            env: Vec::new(),
        };
        let mut session = engine
            .launch(LaunchRequest::Pipeline {
                description: "fakesrc ! fakesink".to_string(),
            })
            .await
            .unwrap();

        let msg = session.next_message().await;
        assert!(matches!(msg, Some(EngineMessage::Error { .. })));
        assert_eq!(session.next_message().await, None);
        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_binary_fails_launch() {
        let engine = ProcessEngine {
            gst_launch: "/nonexistent/gst-launch".to_string(),
            rtsp_launcher: RTSP_LAUNCHER.to_string(),
            env: Vec::new(),
        };
        let result = engine
            .launch(LaunchRequest::Pipeline {
                description: "fakesrc ! fakesink".to_string(),
            })
            .await;
        assert!(result.is_err());
    }
}
