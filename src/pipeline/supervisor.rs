//! Runtime supervision of one launched session
//!
//! Runs on the single-threaded event loop: waits on the session's message
//! stream and the external stop token, dispatches each message once, and
//! always releases the session on the way out.

use super::health::SessionStats;
use super::state::{RuntimeSession, SessionState};
use crate::engine::{EngineMessage, LaunchRequest, MediaEngine, MediaSession};
use crate::error::{LaunchError, Result};
use crate::workers::{SessionPolicy, SessionReport, TargetSessionController};
use log::{debug, error, info, warn};
use std::ops::ControlFlow;
use tokio_util::sync::CancellationToken;

/// Why the loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// External stop request
    Stopped,
    Eos,
    /// Fatal media error
    Failed(String),
    /// Engine stopped talking
    Closed,
}

pub struct RuntimeSupervisor<'a> {
    controller: &'a mut dyn TargetSessionController,
    quit: CancellationToken,
    session: RuntimeSession,
    stats: SessionStats,
    last_error: Option<String>,
}

impl<'a> RuntimeSupervisor<'a> {
    pub fn new(controller: &'a mut dyn TargetSessionController, quit: CancellationToken) -> Self {
        Self {
            controller,
            quit,
            session: RuntimeSession::new(),
            stats: SessionStats::new(),
            last_error: None,
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Launch the request and supervise it to the end
    pub async fn run(
        mut self,
        engine: &dyn MediaEngine,
        request: LaunchRequest,
    ) -> Result<SessionReport> {
        info!(
            "Supervisor: launching {} session (created {})",
            self.controller.target().name(),
            self.session.created_at().format("%Y-%m-%d %H:%M:%S")
        );
        debug!("Supervisor: {}", request.description());

        let mut media = match engine.launch(request).await {
            Ok(media) => media,
            Err(e) => {
                self.session.transition(SessionState::Error);
                return Err(LaunchError::Engine(format!("{:#}", e)));
            }
        };
        self.session.transition(SessionState::running());

        let exit = self.event_loop(media.as_mut()).await;

        // teardown runs on every exit path
        if let Err(e) = media.stop().await {
            warn!("Supervisor: failed to release session: {:#}", e);
        }
        drop(media);

        let final_state = match exit {
            Exit::Failed(_) => SessionState::Error,
            _ => SessionState::Terminated,
        };
        self.session.transition(final_state);
        info!(
            "Supervisor: session {} ({:?}). {}",
            self.session.state(),
            exit,
            self.stats.summary(self.session.elapsed())
        );

        let report = self.controller.finish(&self.session);
        match exit {
            Exit::Failed(detail) => Err(LaunchError::RuntimeMedia(detail)),
            _ => Ok(report),
        }
    }

    async fn event_loop(&mut self, media: &mut dyn MediaSession) -> Exit {
        loop {
            let message = tokio::select! {
                _ = self.quit.cancelled() => {
                    info!("Supervisor: stop requested");
                    return Exit::Stopped;
                }
                message = media.next_message() => message,
            };

            match message {
                Some(message) => {
                    if let ControlFlow::Break(exit) = self.dispatch(message) {
                        return exit;
                    }
                }
                None => {
                    return match self.last_error.take() {
                        Some(detail) => Exit::Failed(detail),
                        None => Exit::Closed,
                    };
                }
            }
        }
    }

    /// Handle one message; consumes it
    pub fn dispatch(&mut self, message: EngineMessage) -> ControlFlow<Exit> {
        let policy = self.controller.policy();

        match message {
            EngineMessage::Info(text) => {
                self.stats.record_info();
                info!("{}", text);
            }
            EngineMessage::Warning(text) => {
                self.stats.record_warning();
                warn!("{}", text);
            }
            EngineMessage::Error {
                source,
                detail,
                client: Some(id),
            } if policy == SessionPolicy::Persistent => {
                self.stats.record_error(true);
                warn!("Client {}: error from {}: {}", id, source, detail);
            }
            EngineMessage::Error { source, detail, .. } => {
                self.stats.record_error(false);
                error!("Error from {}: {}", source, detail);
                let text = format!("{}: {}", source, detail);
                if policy == SessionPolicy::OneShot {
                    return ControlFlow::Break(Exit::Failed(text));
                }
                self.last_error = Some(text);
            }
            EngineMessage::Eos { client: Some(id) } if policy == SessionPolicy::Persistent => {
                self.stats.record_eos();
                info!("Client {}: end of stream", id);
                self.controller
                    .on_client_event(&EngineMessage::Eos { client: Some(id) });
            }
            EngineMessage::Eos { .. } => {
                self.stats.record_eos();
                info!("End of stream");
                return ControlFlow::Break(Exit::Eos);
            }
            event @ EngineMessage::ClientConnected(_) => {
                let evicted = self.controller.on_client_event(&event);
                self.stats.record_connect(evicted);
            }
            event @ EngineMessage::ClientClosed(_) => {
                self.controller.on_client_event(&event);
                self.stats.record_close();
            }
        }
        ControlFlow::Continue(())
    }
}
