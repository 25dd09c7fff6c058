//! Hardware encoder configuration
//!
//! Renders the VCU encoder stage from the operator's encoder knobs.

mod params;

pub use params::{ENCODER_DEVICE, EncoderParams};
