//! Detection overlay planning
//!
//! Turns the inference results attached to a frame into draw operations:
//! boxes and labels per allowed class, plus an optional framerate readout.

use super::{
    Classification, DrawOp, Frame, FrameTransform, KernelError, PixelFormat, Prediction, Rgb,
    int_field, level_filter, number_or,
};
use log::{debug, warn};
use serde_json::Value;
use std::path::Path;
use std::time::Instant;

/// Set when the on-screen framerate readout is wanted
pub const SCREENFPS_ENV: &str = "SMARTCAM_SCREENFPS";

/// Top-left corner of the framerate readout
const FPS_ORIGIN: (i32, i32) = (50, 50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelField {
    Class,
    Probability,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassStyle {
    pub name: String,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawConfig {
    pub fps_interval: u32,
    pub font_size: f64,
    pub font: u32,
    pub thickness: u32,
    /// Label offset for classification results, 0 = 10% of frame height
    pub y_offset: i32,
    pub debug_level: i64,
    pub label_color: Rgb,
    pub label_filter: Vec<LabelField>,
    /// Empty means every class is drawn in blue
    pub classes: Vec<ClassStyle>,
}

fn channel(value: Option<&Value>) -> u8 {
    value
        .and_then(Value::as_i64)
        .map(|v| v.clamp(0, 255) as u8)
        .unwrap_or(0)
}

fn color_of(object: &Value) -> Rgb {
    Rgb {
        red: channel(object.get("red")),
        green: channel(object.get("green")),
        blue: channel(object.get("blue")),
    }
}

impl DrawConfig {
    pub fn from_value(config: &Value) -> Result<Self, KernelError> {
        let label_color = config
            .get("label_color")
            .filter(|v| v.is_object())
            .map(color_of)
            .ok_or_else(|| KernelError::Config("failed to find label_color".into()))?;

        let label_filter = config
            .get("label_filter")
            .and_then(Value::as_array)
            .ok_or_else(|| KernelError::Config("label_filter not found".into()))?
            .iter()
            .filter_map(|field| match field.as_str() {
                Some("class") => Some(LabelField::Class),
                Some("probability") => Some(LabelField::Probability),
                _ => None,
            })
            .collect();

        let classes = config
            .get("classes")
            .ok_or_else(|| KernelError::Config("failed to find classes".into()))?
            .as_array()
            .ok_or_else(|| KernelError::Config("classes is not an array".into()))?
            .iter()
            .enumerate()
            .map(|(i, class)| {
                let name = class
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| KernelError::Config(format!("name is not found for class {}", i)))?;
                Ok(ClassStyle {
                    name: name.to_string(),
                    color: color_of(class),
                })
            })
            .collect::<Result<Vec<_>, KernelError>>()?;

        // font_size is only honoured as an integer
        let font_size = match config.get("font_size").and_then(Value::as_i64) {
            Some(size) => size as f64,
            None => 0.5,
        };

        Ok(Self {
            fps_interval: int_field::<u32>(config, "fps_interval", 1)?.max(1),
            font_size,
            font: int_field(config, "font", 0)?,
            thickness: int_field::<u32>(config, "thickness", 1)?.max(1),
            y_offset: int_field(config, "y_offset", 0)?,
            debug_level: number_or(config, "debug_level", 1.0) as i64,
            label_color,
            label_filter,
            classes,
        })
    }

    pub fn load(path: &Path) -> Result<Self, KernelError> {
        Self::from_value(&super::read_config(path)?)
    }

    /// Box colour for `label`, `None` when the class is filtered out
    pub fn color_for(&self, label: &str) -> Option<Rgb> {
        if self.classes.is_empty() {
            return Some(Rgb::BLUE);
        }
        self.classes
            .iter()
            .find(|c| c.name == label)
            .map(|c| c.color)
    }

    /// Label text per `label_filter`, `None` when the result has no label
    pub fn label_text(&self, classification: &Classification) -> Option<String> {
        if classification.label.is_empty() {
            return None;
        }
        let mut text = String::new();
        for field in &self.label_filter {
            match field {
                LabelField::Class => text.push_str(&classification.label),
                LabelField::Probability => {
                    text.push_str(&format!(" : {:.2} ", classification.probability))
                }
            }
        }
        Some(text)
    }
}

/// Framerate readout refreshed every `interval` frames
#[derive(Debug)]
pub struct FpsMeter {
    enabled: bool,
    interval: u32,
    frames: u64,
    started: Option<Instant>,
    fps: f64,
}

impl FpsMeter {
    pub fn new(enabled: bool, interval: u32) -> Self {
        Self {
            enabled,
            interval: interval.max(1),
            frames: 0,
            started: None,
            fps: 0.0,
        }
    }

    pub fn from_env(interval: u32) -> Self {
        Self::new(std::env::var_os(SCREENFPS_ENV).is_some(), interval)
    }

    /// Count one frame; the readout text once past the first frame
    pub fn tick(&mut self, now: Instant) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let text = match self.started {
            None => {
                self.started = Some(now);
                None
            }
            Some(start) => {
                if self.frames % self.interval as u64 == 0 {
                    let millis = now.duration_since(start).as_millis();
                    if millis > 0 {
                        self.fps = self.frames as f64 * 1e3 / millis as f64;
                    }
                }
                Some(format!("Framerate:{:.1} FPS", self.fps))
            }
        };
        self.frames += 1;
        text
    }
}

/// Round down to even, NV12 chroma is subsampled 2x2
fn even(v: i32) -> i32 {
    v.div_euclid(2) * 2
}

pub struct OverlayKernel {
    config: Option<DrawConfig>,
    fps: FpsMeter,
    screen_fps: bool,
}

impl OverlayKernel {
    /// Kernel whose framerate readout follows `SMARTCAM_SCREENFPS`
    pub fn new() -> Self {
        Self::with_screen_fps(std::env::var_os(SCREENFPS_ENV).is_some())
    }

    pub fn with_screen_fps(screen_fps: bool) -> Self {
        Self {
            config: None,
            fps: FpsMeter::new(false, 1),
            screen_fps,
        }
    }

    fn plan_prediction(
        config: &DrawConfig,
        frame_height: u32,
        format: PixelFormat,
        prediction: &Prediction,
        ops: &mut Vec<DrawOp>,
    ) {
        let bbox = prediction.bbox;
        for classification in &prediction.classifications {
            let Some(color) = config.color_for(&classification.label) else {
                continue;
            };
            let label = config.label_text(classification);

            // classification models report no box; push the label down
            let mut y_offset = 0;
            if label.is_some() && bbox.width < 1 && bbox.height < 1 {
                y_offset = if config.y_offset != 0 {
                    config.y_offset
                } else {
                    (frame_height as f64 * 0.10) as i32
                };
            }

            let (x1, y1) = (
                bbox.x.saturating_add(bbox.width),
                bbox.y.saturating_add(bbox.height),
            );
            let (x0, y0, x1, y1) = match format {
                PixelFormat::Nv12 => (even(bbox.x), even(bbox.y), even(x1), even(y1)),
                _ => (bbox.x, bbox.y, x1, y1),
            };

            debug!(
                "Overlay: {} ({}) {} {} {} {} ({:.2})",
                classification.label,
                classification.class_id,
                x0,
                y0,
                x1,
                y1,
                classification.probability
            );

            if bbox.x != 0 || bbox.y != 0 {
                ops.push(DrawOp::Rect {
                    x0,
                    y0,
                    x1,
                    y1,
                    color,
                    thickness: config.thickness,
                });
            }
            if let Some(text) = label {
                ops.push(DrawOp::Label {
                    x: x0,
                    y: y0.saturating_add(y_offset),
                    text,
                    background: color,
                    foreground: config.label_color,
                });
            }
        }
    }
}

impl Default for OverlayKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTransform for OverlayKernel {
    fn init(&mut self, config: &Value) -> Result<(), KernelError> {
        let config = DrawConfig::from_value(config)?;
        debug!(
            "Overlay: {} classes, log {}",
            config.classes.len(),
            level_filter(config.debug_level)
        );
        self.fps = FpsMeter::new(self.screen_fps, config.fps_interval);
        self.config = Some(config);
        Ok(())
    }

    fn process(&mut self, mut frame: Frame) -> Result<Frame, KernelError> {
        let config = self.config.as_ref().ok_or(KernelError::NotInitialized)?;
        if frame.format == PixelFormat::Other {
            warn!("Overlay: unsupported color format");
            return Ok(frame);
        }

        let mut ops = Vec::new();
        for prediction in &frame.predictions {
            Self::plan_prediction(config, frame.height, frame.format, prediction, &mut ops);
        }

        if let Some(text) = self.fps.tick(Instant::now()) {
            let foreground = match frame.format {
                PixelFormat::Nv12 => config.label_color,
                _ => Rgb::BLUE,
            };
            ops.push(DrawOp::Text {
                x: FPS_ORIGIN.0,
                y: FPS_ORIGIN.1,
                text,
                color: foreground,
            });
        }

        frame.overlay.extend(ops);
        Ok(frame)
    }

    fn shutdown(&mut self) {
        self.config = None;
    }
}
