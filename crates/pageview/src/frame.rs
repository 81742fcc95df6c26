use std::sync::Arc;

use engine::TileReadGuard;
use model::{PageRect, PixelSize};
use tiles::{FallbackImage, TileComposeError};

/// What the host should paint this frame.
pub enum DrawFrame<'a> {
    /// Finished tiles for `guard.request()`. Each buffer goes at its device
    /// bounds inside the target.
    Tiles(TileReadGuard<'a>),
    /// No tiles are available: stretch `source_rect` of the whole-page
    /// image over the control, and show a busy indicator when
    /// `refreshing` is set.
    Fallback {
        image: Arc<FallbackImage>,
        display_area: PageRect,
        source_rect: PageRect,
        refreshing: bool,
    },
}

impl DrawFrame<'_> {
    pub fn is_tiles(&self) -> bool {
        matches!(self, DrawFrame::Tiles(_))
    }

    /// Flatten the frame into packed pixels. Tiles compose at their own
    /// target size; the fallback is resampled to `output`.
    pub fn to_pixels(&self, output: PixelSize) -> Result<Vec<u8>, TileComposeError> {
        match self {
            DrawFrame::Tiles(tiles) => tiles.compose(),
            DrawFrame::Fallback {
                image,
                display_area,
                ..
            } => Ok(image.sample(display_area, output)),
        }
    }
}
