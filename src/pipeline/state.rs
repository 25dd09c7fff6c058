//! Runtime session state management

use chrono::{DateTime, Local};
use std::time::Instant;

/// Session state machine
///
/// A session is created Idle once the target controller has accepted the
/// graph, moves to Running when the engine accepts it, and ends in
/// Terminated (clean) or Error (fatal media failure). Both end states are
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Graph handed over, engine not yet started
    Idle,

    /// Engine is processing media
    Running {
        /// When the engine accepted the graph
        started_at: Instant,
    },

    /// A fatal media error ended the session
    Error,

    /// Session ended on EOS or external stop
    Terminated,
}

impl SessionState {
    pub fn running() -> Self {
        SessionState::Running {
            started_at: Instant::now(),
        }
    }

    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        use SessionState::*;

        match (self, target) {
            (Idle, Running { .. }) => true,
            // launch failure or stop before start
            (Idle, Error) | (Idle, Terminated) => true,

            (Running { .. }, Error) => true,
            (Running { .. }, Terminated) => true,

            (Error, _) | (Terminated, _) => false,

            (a, b) if a == b => true,

            _ => false,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Running { .. } => "Running",
            SessionState::Error => "Error",
            SessionState::Terminated => "Terminated",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running { .. })
    }

    pub fn is_final(&self) -> bool {
        matches!(self, SessionState::Error | SessionState::Terminated)
    }

    /// Get the duration since the session started (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        if let SessionState::Running { started_at } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// The session record owned by the supervisor
#[derive(Debug)]
pub struct RuntimeSession {
    state: SessionState,
    created_at: DateTime<Local>,
    elapsed: Option<std::time::Duration>,
}

impl RuntimeSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            created_at: Local::now(),
            elapsed: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    /// Time spent Running, available once the session left that state
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        self.elapsed.or_else(|| self.state.running_duration())
    }

    /// Apply a transition; invalid ones are refused and logged
    pub fn transition(&mut self, target: SessionState) -> bool {
        if !self.state.can_transition_to(&target) {
            log::warn!("Refusing session transition {} -> {}", self.state, target);
            return false;
        }
        if self.state != target {
            log::debug!("Session {} -> {}", self.state, target);
            if let Some(duration) = self.state.running_duration() {
                self.elapsed = Some(duration);
            }
        }
        self.state = target;
        true
    }
}

impl Default for RuntimeSession {
    fn default() -> Self {
        Self::new()
    }
}
