use std::fmt;

use render_protocol::PixelFormat;
use serde::{Deserialize, Serialize};
use view::PageView;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Zoom factor of one `zoom_step`. Values below 1 invert the direction.
    pub zoom_increment: f64,
    /// Density of the whole-page fallback image relative to the control.
    pub resolution_multiplier: f64,
    pub pixel_format: PixelFormat,
    /// Device pixels per control unit.
    pub layout_scale: f64,
    pub thread_name: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            zoom_increment: PageView::DEFAULT_ZOOM_INCREMENT,
            resolution_multiplier: 1.0,
            pixel_format: PixelFormat::Rgba,
            layout_scale: 1.0,
            thread_name: "page_render".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerConfigError {
    InvalidZoomIncrement,
    InvalidResolutionMultiplier,
    InvalidLayoutScale,
    EmptyThreadName,
}

impl fmt::Display for ViewerConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerConfigError::InvalidZoomIncrement => {
                write!(formatter, "zoom increment must be finite and positive")
            }
            ViewerConfigError::InvalidResolutionMultiplier => {
                write!(formatter, "resolution multiplier must be finite and positive")
            }
            ViewerConfigError::InvalidLayoutScale => {
                write!(formatter, "layout scale must be finite and positive")
            }
            ViewerConfigError::EmptyThreadName => {
                write!(formatter, "render thread name must not be empty")
            }
        }
    }
}

impl std::error::Error for ViewerConfigError {}

impl ViewerConfig {
    pub fn validate(&self) -> Result<(), ViewerConfigError> {
        if !is_positive(self.zoom_increment) {
            return Err(ViewerConfigError::InvalidZoomIncrement);
        }
        if !is_positive(self.resolution_multiplier) {
            return Err(ViewerConfigError::InvalidResolutionMultiplier);
        }
        if !is_positive(self.layout_scale) {
            return Err(ViewerConfigError::InvalidLayoutScale);
        }
        if self.thread_name.is_empty() {
            return Err(ViewerConfigError::EmptyThreadName);
        }
        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
