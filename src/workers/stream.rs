use super::{SessionPolicy, SessionReport, SinkOptions, TargetSessionController, sink};
use crate::engine::{EngineMessage, LaunchRequest, MAX_STREAM_SESSIONS, STREAM_MOUNT};
use crate::pipeline::state::RuntimeSession;
use crate::pipeline::types::{Caps, Chain, Element, PipelineGraph, Stage, StageKind, TargetSpec};
use log::{info, warn};
use std::collections::{HashMap, VecDeque};

/// Mount path -> served description
#[derive(Debug, Default)]
pub struct MountPoints {
    factories: HashMap<String, String>,
}

impl MountPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory served at `mount`
    pub fn add_factory(&mut self, mount: impl Into<String>, description: impl Into<String>) {
        self.factories.insert(mount.into(), description.into());
    }

    pub fn get(&self, mount: &str) -> Option<&str> {
        self.factories.get(mount).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Live client sessions in connection order, oldest first
#[derive(Debug)]
pub struct SessionPool {
    capacity: usize,
    clients: VecDeque<u32>,
}

impl SessionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clients: VecDeque::new(),
        }
    }

    /// Admit a client, evicting the oldest ones while the pool is full
    pub fn admit(&mut self, client: u32) -> Vec<u32> {
        if self.clients.contains(&client) {
            return Vec::new();
        }
        let mut evicted = Vec::new();
        while self.capacity > 0 && self.clients.len() >= self.capacity {
            if let Some(oldest) = self.clients.pop_front() {
                evicted.push(oldest);
            }
        }
        self.clients.push_back(client);
        evicted
    }

    pub fn release(&mut self, client: u32) -> bool {
        match self.clients.iter().position(|c| *c == client) {
            Some(pos) => {
                self.clients.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, client: u32) -> bool {
        self.clients.contains(&client)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// RTSP server publishing one shared factory
pub struct NetworkStream {
    target: TargetSpec,
    port: u16,
    options: SinkOptions,
    mounts: MountPoints,
    pool: SessionPool,
}

impl NetworkStream {
    pub fn new(port: u16, options: SinkOptions) -> Self {
        Self {
            target: TargetSpec::NetworkStream { port },
            port,
            options,
            mounts: MountPoints::new(),
            pool: SessionPool::new(MAX_STREAM_SESSIONS),
        }
    }

    pub fn url(&self) -> String {
        format!("rtsp://{}:{}{}", host_name(), self.port, STREAM_MOUNT)
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    pub fn mounts(&self) -> &MountPoints {
        &self.mounts
    }

    /// Register the graph under the shared mount and build the server request
    pub fn register(&mut self, graph: &PipelineGraph) -> LaunchRequest {
        let description = graph.description();
        self.mounts.add_factory(STREAM_MOUNT, description.clone());
        LaunchRequest::Server {
            port: self.port,
            mount: STREAM_MOUNT.to_string(),
            description,
            max_sessions: self.pool.capacity(),
        }
    }
}

impl TargetSessionController for NetworkStream {
    fn target(&self) -> &TargetSpec {
        &self.target
    }

    fn options(&self) -> &SinkOptions {
        &self.options
    }

    fn sink_stage(&self) -> Stage {
        sink(
            self.options.report,
            Element::new(format!("rtp{}pay", self.options.codec))
                .prop("name", "pay0")
                .prop("pt", 96),
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
                    .then(
                        Caps::new("audio/x-raw")
                            .field("rate", 48000)
                            .field("channels", 2),
                    )
                    .then(Element::new("rtpL16pay").prop("name", "pay1").prop("pt", 97)),
            )
            .detached(),
        )
    }

    fn wraps_in_bin(&self) -> bool {
        true
    }

    fn prepare(&mut self, graph: &PipelineGraph) -> LaunchRequest {
        let request = self.register(graph);
        info!("Stream ready at {}", self.url());
        request
    }

    fn policy(&self) -> SessionPolicy {
        SessionPolicy::Persistent
    }

    fn on_client_event(&mut self, event: &EngineMessage) -> usize {
        match event {
            EngineMessage::ClientConnected(id) => {
                let evicted = self.pool.admit(*id);
                for old in &evicted {
                    warn!("Session pool full, evicting client {}", old);
                }
                info!("Client {} connected ({} active)", id, self.pool.len());
                evicted.len()
            }
            EngineMessage::ClientClosed(id) | EngineMessage::Eos { client: Some(id) } => {
                if self.pool.release(*id) {
                    info!("Client {} released ({} active)", id, self.pool.len());
                }
                0
            }
            _ => 0,
        }
    }

    fn finish(&self, _session: &RuntimeSession) -> SessionReport {
        SessionReport {
            target: self.target.name(),
            artifact: None,
            message: format!(
                "Stream at {} closed with {} client(s) attached",
                self.url(),
                self.pool.len()
            ),
        }
    }
}

fn host_name() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}
