//! Capture side of the launcher
//!
//! Hardware capability probing (display modes, camera sizes, media graph
//! discovery) and selection of the single active input source.

pub mod capability;
pub mod parse;
pub mod probe;
pub mod source;
mod traits;

#[cfg(test)]
pub mod fake;

pub use capability::{CapabilitySet, Resolution};
pub use probe::SystemProbe;
pub use source::{ResolvedSource, SourceConfig, SourceFlags, SourceResolver};
pub use traits::CapabilityProvider;
