//! Media engine boundary
//!
//! The launcher never touches pixels: a flattened launch description is
//! handed to an external engine which reports back through a stream of
//! owned messages. `MediaEngine` is the seam between the supervisor and
//! whatever actually runs the graph.

pub mod process;

#[cfg(test)]
pub mod fake;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

/// Mount point under which the stream server publishes the pipeline
pub const STREAM_MOUNT: &str = "/test";

/// Concurrent client sessions accepted by the stream server
pub const MAX_STREAM_SESSIONS: usize = 255;

/// What to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchRequest {
    /// Single pipeline played once
    Pipeline { description: String },
    /// Media factory served per client
    Server {
        port: u16,
        mount: String,
        description: String,
        max_sessions: usize,
    },
}

impl LaunchRequest {
    pub fn description(&self) -> &str {
        match self {
            LaunchRequest::Pipeline { description } => description,
            LaunchRequest::Server { description, .. } => description,
        }
    }
}

/// Message posted by a running session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    Info(String),
    Warning(String),
    Error {
        source: String,
        detail: String,
        /// Stream client the error belongs to, if any
        client: Option<u32>,
    },
    Eos {
        client: Option<u32>,
    },
    ClientConnected(u32),
    ClientClosed(u32),
}

impl EngineMessage {
    pub fn error(source: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineMessage::Error {
            source: source.into(),
            detail: detail.into(),
            client: None,
        }
    }

    /// Client id of per-client messages
    pub fn client(&self) -> Option<u32> {
        match self {
            EngineMessage::Error { client, .. } | EngineMessage::Eos { client } => *client,
            EngineMessage::ClientConnected(id) | EngineMessage::ClientClosed(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for EngineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMessage::Info(text) => write!(f, "{}", text),
            EngineMessage::Warning(text) => write!(f, "warning: {}", text),
            EngineMessage::Error { source, detail, .. } => {
                write!(f, "error from {}: {}", source, detail)
            }
            EngineMessage::Eos { client: None } => f.write_str("end of stream"),
            EngineMessage::Eos { client: Some(id) } => write!(f, "end of stream on client {}", id),
            EngineMessage::ClientConnected(id) => write!(f, "client {} connected", id),
            EngineMessage::ClientClosed(id) => write!(f, "client {} closed", id),
        }
    }
}

/// Starts sessions from launch requests
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn MediaSession>>;
}

/// A running session
#[async_trait]
pub trait MediaSession: Send {
    /// Next message, `None` once the session has nothing more to say
    async fn next_message(&mut self) -> Option<EngineMessage>;

    /// Release the session; safe to call after it ended on its own
    async fn stop(&mut self) -> Result<()>;
}
