//! Reference tiled rasterizer: splits every render into tiles, paints them in
//! parallel from a [`PageContent`] and honours cooperative aborts.

mod content;
mod cookie;
mod rasterizer;

use std::fmt;

use model::TileLayoutError;
use serde::{Deserialize, Serialize};

pub use content::{DisplayList, FillRect, PageContent};
pub use cookie::RenderCookie;
pub use rasterizer::TiledRasterizer;

/// Resolution of an image page, in dots per inch on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageResolution {
    pub x: f64,
    pub y: f64,
}

impl ImageResolution {
    pub const POINTS: Self = Self { x: 72.0, y: 72.0 };

    pub fn is_points(&self) -> bool {
        self.x == 72.0 && self.y == 72.0
    }

    fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.x > 0.0 && self.y > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizerConfig {
    /// Requested number of tiles and pool threads. Lowered to the nearest
    /// count whose prime factors are all 2, 3, 5 or 7.
    pub tile_count: usize,
    /// Clear pixels that fall outside the page bounds.
    pub clip_to_page_bounds: bool,
    /// Set for image pages whose coordinates are image pixels.
    pub image_resolution: Option<ImageResolution>,
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            tile_count: 4,
            clip_to_page_bounds: true,
            image_resolution: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterizerConfigError {
    ZeroTileCount,
    InvalidImageResolution,
}

impl RasterizerConfig {
    pub fn validate(&self) -> Result<(), RasterizerConfigError> {
        if self.tile_count == 0 {
            return Err(RasterizerConfigError::ZeroTileCount);
        }
        if self
            .image_resolution
            .is_some_and(|resolution| !resolution.is_valid())
        {
            return Err(RasterizerConfigError::InvalidImageResolution);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterizerBuildError {
    Config(RasterizerConfigError),
    Layout(TileLayoutError),
    ThreadPool(String),
}

impl fmt::Display for RasterizerBuildError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RasterizerBuildError::Config(RasterizerConfigError::ZeroTileCount) => {
                write!(formatter, "rasterizer needs at least one tile")
            }
            RasterizerBuildError::Config(RasterizerConfigError::InvalidImageResolution) => {
                write!(formatter, "image resolution must be finite and positive")
            }
            RasterizerBuildError::Layout(error) => write!(formatter, "{error}"),
            RasterizerBuildError::ThreadPool(message) => {
                write!(formatter, "failed to build rasterizer thread pool: {message}")
            }
        }
    }
}

impl std::error::Error for RasterizerBuildError {}

impl From<RasterizerConfigError> for RasterizerBuildError {
    fn from(error: RasterizerConfigError) -> Self {
        RasterizerBuildError::Config(error)
    }
}

impl From<TileLayoutError> for RasterizerBuildError {
    fn from(error: TileLayoutError) -> Self {
        RasterizerBuildError::Layout(error)
    }
}

#[cfg(test)]
mod tests;
