//! Error taxonomy for launch validation and runtime supervision

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    /// Bad or missing option combination
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A required hardware or firmware node is absent
    #[error("Device not ready: {0}")]
    DeviceNotReady(String),

    /// Requested resolution is not in a probed capability set
    #[error("Capability mismatch: {0}")]
    CapabilityMismatch(String),

    #[error("Ambiguous device: {0}")]
    AmbiguousDevice(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Detection resources are unspecified, missing or malformed
    #[error("Graph construction failed: {0}")]
    GraphConstruction(String),

    /// Fatal message from the execution engine while a session was running
    #[error("Runtime media error: {0}")]
    RuntimeMedia(String),

    #[error("Insufficient privileges: {0}")]
    NotPrivileged(String),

    #[error("Media engine error: {0}")]
    Engine(String),
}

impl LaunchError {
    /// True for errors raised before any session exists
    pub fn is_pre_launch(&self) -> bool {
        !matches!(self, LaunchError::RuntimeMedia(_) | LaunchError::Engine(_))
    }
}

pub type Result<T> = std::result::Result<T, LaunchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_launch_classification() {
        assert!(LaunchError::Config("no input".into()).is_pre_launch());
        assert!(LaunchError::CapabilityMismatch("x".into()).is_pre_launch());
        assert!(LaunchError::GraphConstruction("x".into()).is_pre_launch());
        assert!(!LaunchError::RuntimeMedia("x".into()).is_pre_launch());
        assert!(!LaunchError::Engine("spawn".into()).is_pre_launch());
    }

    #[test]
    fn test_messages_carry_detail() {
        let err = LaunchError::AmbiguousDevice("/dev/media1, /dev/media2".into());
        assert_eq!(err.to_string(), "Ambiguous device: /dev/media1, /dev/media2");
    }
}
