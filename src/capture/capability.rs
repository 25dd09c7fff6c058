//! Resolution descriptors and capability sets

use crate::utils::string::join_or;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const FHD: Resolution = Resolution::new(1920, 1080);
    pub const UHD: Resolution = Resolution::new(3840, 2160);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `WxH` token used for capability matching
    pub fn token(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let size = s.split('@').next().unwrap_or_default().trim();
        let (w, h) = size
            .split_once('x')
            .ok_or_else(|| format!("'{}' is not a WxH token", s))?;
        let width = w.parse::<u32>().map_err(|e| format!("bad width in '{}': {}", s, e))?;
        let height = h.parse::<u32>().map_err(|e| format!("bad height in '{}': {}", s, e))?;
        Ok(Resolution::new(width, height))
    }
}

/// Ordered list of supported resolution descriptors.
///
/// Entries are either bare `WxH` or `WxH@refresh`; matching only looks at the
/// part before `@`. Insertion order is preserved and exact duplicates are
/// dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    entries: Vec<String>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        let entry = entry.trim();
        if entry.is_empty() || self.entries.iter().any(|e| e == entry) {
            return;
        }
        self.entries.push(entry.to_string());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when any entry's `WxH` part equals the requested resolution
    pub fn supports(&self, resolution: Resolution) -> bool {
        let wanted = resolution.token();
        self.entries
            .iter()
            .any(|entry| entry.split('@').next().map(str::trim) == Some(wanted.as_str()))
    }

    /// Comma separated listing used in mismatch messages
    pub fn describe(&self) -> String {
        join_or(&self.entries, "none reported")
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = CapabilitySet::new();
        for entry in iter {
            set.push(entry);
        }
        set
    }
}
