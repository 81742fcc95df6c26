//! A zoomable page view on top of the tiled render runtime.
//!
//! [`PageViewer`] keeps the display area in step with the hosting control,
//! forwards every change to the renderer as the newest viewport and hands the
//! draw path either finished tiles or a coarse whole-page image.

mod config;
mod frame;
mod viewer;

pub use config::{ViewerConfig, ViewerConfigError};
pub use frame::DrawFrame;
pub use viewer::{PageViewer, ViewerError};

pub use engine::{RenderHooks, RenderState, RenderStats};
pub use view::ControlSize;

#[cfg(test)]
mod tests;
