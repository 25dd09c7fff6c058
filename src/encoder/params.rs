use crate::pipeline::types::{Caps, Chain, Codec, Element, Stage, StageKind};
use serde::Serialize;

/// VCU encoder device node
pub const ENCODER_DEVICE: &str = "/dev/allegroIP";

/// Default tuning block for the VCU encoder, low latency streaming.
///
/// Replaced wholesale by `--encodeEnhancedParam` when given.
const DEFAULT_BLOCK: &[(&str, &str)] = &[
    ("num-slices", "8"),         // Parallel slices per frame
    ("periodicity-idr", "270"),  // IDR every 9 seconds at 30fps
    ("gop-mode", "low-delay-p"), // No reordering
    ("gdr-mode", "horizontal"),  // Gradual decoder refresh instead of big IDRs
    ("cpb-size", "200"),         // Coded picture buffer (ms)
    ("initial-delay", "100"),    // Initial removal delay (ms)
    ("filler-data", "false"),
    ("min-qp", "15"),
    ("max-qp", "40"),
    ("b-frames", "0"),
    ("low-bandwidth", "false"),
];

/// Encoder knobs exposed on the command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncoderParams {
    pub control_rate: String,
    /// Target bitrate in kbps
    pub target_bitrate: u32,
    pub gop_length: u32,
    pub profile: Option<String>,
    pub level: Option<String>,
    pub tier: Option<String>,
    /// `k=v,k=v` replacing the default block
    pub enhanced: Option<String>,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self {
            control_rate: "low-latency".to_string(),
            target_bitrate: 3000,
            gop_length: 60,
            profile: None,
            level: None,
            tier: None,
            enhanced: None,
        }
    }
}

impl EncoderParams {
    /// The tuning block: the override when set, the defaults otherwise
    pub fn tuning_block(&self) -> String {
        match self.enhanced.as_deref().map(str::trim) {
            Some(custom) if !custom.is_empty() => custom
                .split(',')
                .map(str::trim)
                .filter(|kv| !kv.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            _ => DEFAULT_BLOCK
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Output caps of the encoder, with profile/level/tier only when set
    pub fn output_caps(&self, codec: Codec) -> Caps {
        let mut caps = Caps::new(format!("video/x-{}", codec)).field("alignment", "au");
        if let Some(profile) = &self.profile {
            caps = caps.field("profile", profile);
        }
        if let Some(level) = &self.level {
            caps = caps.field("level", level);
        }
        if let Some(tier) = &self.tier {
            caps = caps.field("tier", tier);
        }
        caps
    }

    /// Encode stage for `codec`; `roi` switches the encoder to external QP maps
    pub fn encode_stage(&self, codec: Codec, roi: bool) -> Stage {
        let encoder = Element::new(format!("omx{}enc", codec))
            .prop("qp-mode", if roi { "1" } else { "auto" })
            .prop("control-rate", &self.control_rate)
            .prop("target-bitrate", self.target_bitrate)
            .prop("gop-length", self.gop_length)
            .extra(self.tuning_block());

        Stage::new(
            StageKind::Encode,
            Chain::new()
                .then(Element::new("queue"))
                .then(encoder)
                .then(self.output_caps(codec)),
        )
        .requires(ENCODER_DEVICE)
    }
}
