//! Host side of the frame kernels used by the detection branch
//!
//! Every kernel is driven through `FrameTransform`. Frames here are
//! descriptors (geometry, format, attached inference results and planned
//! overlay); pixel work stays on the accelerator.
//!
//! The launcher binary only uses the config schemas (`PreprocessConfig`,
//! `DrawConfig`) to validate the detection branch before launch. The
//! kernels themselves are a library seam for whatever runtime hosts the
//! accelerator; nothing in this binary drives `FrameTransform`.

pub mod overlay;
pub mod preprocess;

pub use overlay::{DrawConfig, OverlayKernel};
pub use preprocess::{PreprocessConfig, PreprocessKernel, ResizeAccelerator};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("Invalid kernel configuration: {0}")]
    Config(String),

    #[error("Kernel dispatch failed with status {0}")]
    Dispatch(i32),

    #[error("Kernel completion failed with status {0}")]
    Completion(i32),

    #[error("Kernel used before init")]
    NotInitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelFormat {
    Nv12,
    Bgr,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub class_id: i32,
    pub label: String,
    pub probability: f64,
}

/// One node of the inference result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub bbox: BBox,
    pub classifications: Vec<Classification>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const BLUE: Rgb = Rgb {
        red: 0,
        green: 0,
        blue: 255,
    };
}

/// Planned drawing operation, in frame coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DrawOp {
    Rect {
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        color: Rgb,
        thickness: u32,
    },
    Label {
        x: i32,
        y: i32,
        text: String,
        background: Rgb,
        foreground: Rgb,
    },
    Text {
        x: i32,
        y: i32,
        text: String,
        color: Rgb,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    pub predictions: Vec<Prediction>,
    pub overlay: Vec<DrawOp>,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            stride: width,
            format,
            predictions: Vec::new(),
            overlay: Vec::new(),
        }
    }
}

pub trait FrameTransform {
    fn init(&mut self, config: &Value) -> Result<(), KernelError>;

    fn process(&mut self, frame: Frame) -> Result<Frame, KernelError>;

    fn shutdown(&mut self) {}
}

/// Kernel `debug_level` (0 error .. 3 debug) as a log filter
pub fn level_filter(debug_level: i64) -> log::LevelFilter {
    match debug_level {
        i64::MIN..=0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    }
}

/// Integer field, `default` when missing or not an integer
pub(crate) fn int_or(config: &Value, key: &str, default: i64) -> i64 {
    config.get(key).and_then(Value::as_i64).unwrap_or(default)
}

/// Integer field converted to `T`; out-of-range values are a config error
pub(crate) fn int_field<T: TryFrom<i64>>(
    config: &Value,
    key: &str,
    default: i64,
) -> Result<T, KernelError> {
    let value = int_or(config, key, default);
    T::try_from(value)
        .map_err(|_| KernelError::Config(format!("{} = {} is out of range", key, value)))
}

/// Numeric field, `default` when missing or not a number
pub(crate) fn number_or(config: &Value, key: &str, default: f64) -> f64 {
    config.get(key).and_then(Value::as_f64).unwrap_or(default)
}

pub(crate) fn read_config(path: &std::path::Path) -> Result<Value, KernelError> {
    let text = std::fs::read_to_string(path).map_err(|e| KernelError::Config(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| KernelError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_field_reads() {
        let config = json!({ "a": 3, "b": "x", "c": 0.25 });
        assert_eq!(int_or(&config, "a", 1), 3);
        assert_eq!(int_or(&config, "b", 1), 1);
        assert_eq!(int_or(&config, "missing", 7), 7);
        assert_eq!(number_or(&config, "c", 1.0), 0.25);
        assert_eq!(number_or(&config, "a", 1.0), 3.0);
    }

    #[test]
    fn test_int_field_rejects_out_of_range() {
        let config = json!({ "small": 12, "huge": 5_000_000_000i64, "negative": -1 });
        assert_eq!(int_field::<u32>(&config, "small", 0), Ok(12));
        assert_eq!(int_field::<u32>(&config, "missing", 3), Ok(3));
        assert!(matches!(int_field::<u32>(&config, "huge", 0), Err(KernelError::Config(_))));
        assert!(matches!(int_field::<i32>(&config, "huge", 0), Err(KernelError::Config(_))));
        assert!(matches!(int_field::<u32>(&config, "negative", 0), Err(KernelError::Config(_))));
    }

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter(0), log::LevelFilter::Error);
        assert_eq!(level_filter(1), log::LevelFilter::Warn);
        assert_eq!(level_filter(9), log::LevelFilter::Debug);
    }
}
