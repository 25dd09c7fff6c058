//! Pipeline synthesis and supervision
//!
//! - `types`: the typed stage graph and its launch description
//! - `builder`: source + configuration -> pre-sink graph
//! - `state`/`health`: session record and counters
//! - `supervisor`: event loop over a launched session

pub mod builder;
pub mod health;
pub mod state;
pub mod supervisor;
pub mod types;

pub use builder::PipelineGraphBuilder;
pub use health::SessionStats;
pub use state::{RuntimeSession, SessionState};
pub use supervisor::RuntimeSupervisor;
pub use types::{Codec, PipelineGraph, StageKind, TargetSpec};
