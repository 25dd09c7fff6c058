//! Parsers for the text output of the hardware diagnostic tools.
//!
//! Kept free of process handling so they can be fed captured output.

use super::capability::CapabilitySet;

/// Parse `modetest -M xlnx -c` output into `WxH@refresh` entries.
///
/// Mode rows live between a connector's `name refresh` header and its
/// `props:` line and look like
/// `#0 3840x2160 30.00 3840 4016 4104 4400 2160 ...`.
pub fn parse_modetest_modes(output: &str) -> CapabilitySet {
    let mut set = CapabilitySet::new();
    let mut in_modes = false;

    for line in output.lines() {
        let line = line.trim();
        if line.contains("name refresh") {
            in_modes = true;
            continue;
        }
        if line.starts_with("props:") {
            in_modes = false;
            continue;
        }
        if !in_modes || !line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace().skip(1);
        if let (Some(size), Some(refresh)) = (fields.next(), fields.next()) {
            if size.contains('x') {
                set.push(format!("{}@{}", size, trim_refresh(refresh)));
            }
        }
    }

    set
}

/// `30.00` -> `30`, `59.94` stays as is
fn trim_refresh(refresh: &str) -> &str {
    match refresh.strip_suffix(".00") {
        Some(whole) => whole,
        None => refresh,
    }
}

/// Parse `v4l2-ctl --list-formats-ext` output into bare `WxH` entries
pub fn parse_v4l2_sizes(output: &str) -> CapabilitySet {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Size:")?;
            rest.split_whitespace().find(|tok| tok.contains('x'))
        })
        .collect()
}

/// `driver` field of `media-ctl -p` device information; the topology that
/// follows is never searched
pub fn parse_media_driver(output: &str) -> Option<String> {
    output
        .lines()
        .take_while(|line| !line.trim_start().starts_with("Device topology"))
        .find_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some("driver"), Some(driver)) => Some(driver.to_string()),
                _ => None,
            }
        })
}

/// First `/dev/video*` node listed in a `media-ctl -p` topology
pub fn parse_media_video_node(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("device node name")?;
        let node = rest.trim();
        node.starts_with("/dev/video").then(|| node.to_string())
    })
}
