use std::fmt;

use model::{PageRect, PixelRect, PixelSize, TileLayout};
use serde::{Deserialize, Serialize};

/// The latest viewport the host wants on screen. Replaced wholesale on every
/// change, never merged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRequest {
    pub target_size: PixelSize,
    pub region: PageRect,
}

impl ViewportRequest {
    pub fn new(target_size: PixelSize, region: PageRect) -> Self {
        Self {
            target_size,
            region,
        }
    }

    /// A request that can be handed to a backend: non-empty target and a
    /// finite region with positive area.
    pub fn is_renderable(&self) -> bool {
        !self.target_size.is_empty() && self.region.is_renderable()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgb,
    #[default]
    Rgba,
    Bgr,
    Bgra,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::Rgba | PixelFormat::Bgra)
    }

    pub fn byte_len(self, size: PixelSize) -> usize {
        size.pixel_count() * self.bytes_per_pixel()
    }

    /// Write a straight-alpha RGBA color into `pixel` using this format's
    /// channel order.
    pub fn encode(self, rgba: [u8; 4], pixel: &mut [u8]) {
        let [r, g, b, a] = rgba;
        match self {
            PixelFormat::Rgb => pixel[..3].copy_from_slice(&[r, g, b]),
            PixelFormat::Rgba => pixel[..4].copy_from_slice(&[r, g, b, a]),
            PixelFormat::Bgr => pixel[..3].copy_from_slice(&[b, g, r]),
            PixelFormat::Bgra => pixel[..4].copy_from_slice(&[b, g, r, a]),
        }
    }

    pub fn decode(self, pixel: &[u8]) -> [u8; 4] {
        match self {
            PixelFormat::Rgb => [pixel[0], pixel[1], pixel[2], 255],
            PixelFormat::Rgba => [pixel[0], pixel[1], pixel[2], pixel[3]],
            PixelFormat::Bgr => [pixel[2], pixel[1], pixel[0], 255],
            PixelFormat::Bgra => [pixel[2], pixel[1], pixel[0], pixel[3]],
        }
    }
}

/// Destination memory for one tile, rows packed without padding.
#[derive(Debug)]
pub struct TileTarget<'a> {
    pub bounds: PixelRect,
    pub pixels: &'a mut [u8],
}

impl TileTarget<'_> {
    pub fn stride(&self, format: PixelFormat) -> usize {
        self.bounds.width() as usize * format.bytes_per_pixel()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileProgress {
    pub progress: u64,
    pub max: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderProgress {
    pub tiles: Vec<TileProgress>,
}

impl RenderProgress {
    /// Overall completion in `0.0..=1.0`, `0.0` while no tile knows its
    /// amount of work yet.
    pub fn fraction(&self) -> f64 {
        let (done, total) = self
            .tiles
            .iter()
            .fold((0u64, 0u64), |(done, total), tile| {
                (done + tile.progress.min(tile.max), total + tile.max)
            });
        if total == 0 {
            0.0
        } else {
            done as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterError {
    TargetCountMismatch { expected: usize, actual: usize },
    TargetSizeMismatch { index: usize, expected: usize, actual: usize },
    InvalidRegion,
    CannotRender { message: String },
}

impl fmt::Display for RasterError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RasterError::TargetCountMismatch { expected, actual } => write!(
                formatter,
                "backend renders {expected} tiles but {actual} targets were supplied"
            ),
            RasterError::TargetSizeMismatch {
                index,
                expected,
                actual,
            } => write!(
                formatter,
                "tile {index} target holds {actual} bytes, {expected} required"
            ),
            RasterError::InvalidRegion => {
                write!(formatter, "render region must be finite and non-empty")
            }
            RasterError::CannotRender { message } => {
                write!(formatter, "cannot render page: {message}")
            }
        }
    }
}

impl std::error::Error for RasterError {}

/// Multi-tile rasterizer driven by the render worker.
///
/// `render` blocks until every tile is finished or the render was aborted.
/// `abort` may be called from any thread and only shortens the render at the
/// backend's own checkpoints. After an aborted render the target contents are
/// unspecified.
///
/// An abort requested while no render runs should be discarded when the next
/// render begins. Callers must still cope with a backend whose abort flag
/// sticks across renders.
pub trait RasterBackend: Send + Sync {
    /// Number of tiles (and internal workers) each render is split into.
    fn tile_count(&self) -> usize;

    fn render(
        &self,
        layout: &TileLayout,
        region: PageRect,
        targets: &mut [TileTarget<'_>],
        format: PixelFormat,
    ) -> Result<RenderOutcome, RasterError>;

    fn abort(&self);

    /// Per-tile counters, non-decreasing while a render is active.
    fn progress(&self) -> RenderProgress;
}

/// Single-shot rendering of the whole page, used for the coarse fallback
/// image.
pub trait FullPageSource: Send + Sync {
    fn page_bounds(&self) -> PageRect;

    fn render_full_page(
        &self,
        size: PixelSize,
        format: PixelFormat,
    ) -> Result<Vec<u8>, RasterError>;
}
