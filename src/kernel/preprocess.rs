//! Preprocess (resize + normalize) kernel dispatch

use super::{Frame, FrameTransform, KernelError, PixelFormat, level_filter, number_or, int_or};
use log::{debug, error};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Completion wait handed to the accelerator
pub const DONE_TIMEOUT_MS: u32 = 1000;

/// Per-channel normalization, `(pixel - mean) * scale`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreprocessConfig {
    pub mean_r: f32,
    pub mean_g: f32,
    pub mean_b: f32,
    pub scale_r: f32,
    pub scale_g: f32,
    pub scale_b: f32,
    pub debug_level: i64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            mean_r: 0.0,
            mean_g: 0.0,
            mean_b: 0.0,
            scale_r: 1.0,
            scale_g: 1.0,
            scale_b: 1.0,
            debug_level: 1,
        }
    }
}

impl PreprocessConfig {
    pub fn from_value(config: &Value) -> Result<Self, KernelError> {
        if !config.is_object() {
            return Err(KernelError::Config("preprocess config is not an object".into()));
        }
        let d = Self::default();
        Ok(Self {
            mean_r: number_or(config, "mean_r", d.mean_r as f64) as f32,
            mean_g: number_or(config, "mean_g", d.mean_g as f64) as f32,
            mean_b: number_or(config, "mean_b", d.mean_b as f64) as f32,
            scale_r: number_or(config, "scale_r", d.scale_r as f64) as f32,
            scale_g: number_or(config, "scale_g", d.scale_g as f64) as f32,
            scale_b: number_or(config, "scale_b", d.scale_b as f64) as f32,
            debug_level: int_or(config, "debug_level", d.debug_level),
        })
    }

    pub fn load(path: &Path) -> Result<Self, KernelError> {
        Self::from_value(&super::read_config(path)?)
    }

    /// Parameter block in accelerator order
    pub fn coefficients(&self) -> [f32; 6] {
        [
            self.mean_r,
            self.mean_g,
            self.mean_b,
            self.scale_r,
            self.scale_g,
            self.scale_b,
        ]
    }
}

/// Arguments of one resize dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResizeParams {
    pub in_width: u32,
    pub in_height: u32,
    pub in_stride: u32,
    pub out_width: u32,
    pub out_height: u32,
    pub coefficients: [f32; 6],
}

/// Start/done interface of the resize engine. Negative status is failure.
pub trait ResizeAccelerator {
    fn start(&mut self, params: &ResizeParams) -> i32;
    fn done(&mut self, timeout_ms: u32) -> i32;
}

pub struct PreprocessKernel<A: ResizeAccelerator> {
    accelerator: A,
    config: Option<PreprocessConfig>,
    out_width: u32,
    out_height: u32,
}

impl<A: ResizeAccelerator> PreprocessKernel<A> {
    /// Kernel producing `out_width`x`out_height` BGR planes
    pub fn new(accelerator: A, out_width: u32, out_height: u32) -> Self {
        Self {
            accelerator,
            config: None,
            out_width,
            out_height,
        }
    }

    pub fn accelerator(&self) -> &A {
        &self.accelerator
    }
}

impl<A: ResizeAccelerator> FrameTransform for PreprocessKernel<A> {
    fn init(&mut self, config: &Value) -> Result<(), KernelError> {
        let config = PreprocessConfig::from_value(config)?;
        debug!(
            "Preprocess: mean=({}, {}, {}) scale=({}, {}, {}) log={}",
            config.mean_r,
            config.mean_g,
            config.mean_b,
            config.scale_r,
            config.scale_g,
            config.scale_b,
            level_filter(config.debug_level)
        );
        self.config = Some(config);
        Ok(())
    }

    fn process(&mut self, frame: Frame) -> Result<Frame, KernelError> {
        let config = self.config.as_ref().ok_or(KernelError::NotInitialized)?;
        let params = ResizeParams {
            in_width: frame.width,
            in_height: frame.height,
            in_stride: frame.stride,
            out_width: self.out_width,
            out_height: self.out_height,
            coefficients: config.coefficients(),
        };

        let status = self.accelerator.start(&params);
        if status < 0 {
            error!("Preprocess: failed to issue execute command");
            return Err(KernelError::Dispatch(status));
        }
        let status = self.accelerator.done(DONE_TIMEOUT_MS);
        if status < 0 {
            error!("Preprocess: failed to receive response from kernel");
            return Err(KernelError::Completion(status));
        }

        Ok(Frame {
            width: self.out_width,
            height: self.out_height,
            stride: self.out_width,
            format: PixelFormat::Bgr,
            ..frame
        })
    }

    fn shutdown(&mut self) {
        self.config = None;
    }
}
