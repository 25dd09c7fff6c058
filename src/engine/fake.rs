//! Scripted engine for supervisor and runner tests

use super::{EngineMessage, LaunchRequest, MediaEngine, MediaSession};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Replays a fixed message script for every launch
#[derive(Default)]
pub struct ScriptedEngine {
    script: Vec<EngineMessage>,
    /// Keep the session open after the script, like a server would
    hold_open: bool,
    fail_launch: bool,
    pub launched: Mutex<Vec<LaunchRequest>>,
    pub stopped: Arc<AtomicBool>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<EngineMessage>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<LaunchRequest> {
        self.launched.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn MediaSession>> {
        if self.fail_launch {
            bail!("no such engine");
        }
        self.launched.lock().unwrap().push(request);
        Ok(Box::new(ScriptedSession {
            messages: self.script.iter().cloned().collect(),
            hold_open: self.hold_open,
            stopped: self.stopped.clone(),
        }))
    }
}

pub struct ScriptedSession {
    messages: VecDeque<EngineMessage>,
    hold_open: bool,
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl MediaSession for ScriptedSession {
    async fn next_message(&mut self) -> Option<EngineMessage> {
        match self.messages.pop_front() {
            Some(message) => Some(message),
            None if self.hold_open => std::future::pending().await,
            None => None,
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}
