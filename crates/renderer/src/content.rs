use model::PageRect;
use render_protocol::{PixelFormat, RasterError, RenderOutcome, TileTarget};
use serde::{Deserialize, Serialize};

use crate::cookie::RenderCookie;

/// Something that can paint an arbitrary page region at an arbitrary zoom.
///
/// Implementations must poll `cookie` regularly and return
/// `RenderOutcome::Aborted` soon after it is aborted. They may be called from
/// several threads at once, each with its own target and cookie.
pub trait PageContent: Send + Sync {
    fn bounds(&self) -> PageRect;

    /// Paint `region` into `target`, at `zoom` device pixels per page unit.
    /// `target.bounds` only supplies the pixel size; the first pixel maps to
    /// the top-left corner of `region`.
    fn render(
        &self,
        region: PageRect,
        zoom: f64,
        target: &mut TileTarget<'_>,
        format: PixelFormat,
        cookie: &RenderCookie,
    ) -> Result<RenderOutcome, RasterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillRect {
    pub rect: PageRect,
    pub color: [u8; 4],
}

/// A page made of a background color and opaque rectangles painted in
/// order, later ones on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayList {
    bounds: PageRect,
    background: [u8; 4],
    #[serde(default)]
    items: Vec<FillRect>,
}

impl DisplayList {
    pub fn new(bounds: PageRect, background: [u8; 4]) -> Self {
        Self {
            bounds,
            background,
            items: Vec::new(),
        }
    }

    pub fn push_rect(&mut self, rect: PageRect, color: [u8; 4]) {
        self.items.push(FillRect { rect, color });
    }

    pub fn with_rect(mut self, rect: PageRect, color: [u8; 4]) -> Self {
        self.push_rect(rect, color);
        self
    }

    pub fn items(&self) -> &[FillRect] {
        &self.items
    }

    pub fn background(&self) -> [u8; 4] {
        self.background
    }

    /// Color at a page-space point. Rectangles are half-open.
    pub fn color_at(&self, x: f64, y: f64) -> [u8; 4] {
        self.items
            .iter()
            .rev()
            .find(|item| {
                x >= item.rect.x0 && x < item.rect.x1 && y >= item.rect.y0 && y < item.rect.y1
            })
            .map_or(self.background, |item| item.color)
    }
}

impl PageContent for DisplayList {
    fn bounds(&self) -> PageRect {
        self.bounds
    }

    fn render(
        &self,
        region: PageRect,
        zoom: f64,
        target: &mut TileTarget<'_>,
        format: PixelFormat,
        cookie: &RenderCookie,
    ) -> Result<RenderOutcome, RasterError> {
        if !region.is_renderable() || !zoom.is_finite() || zoom <= 0.0 {
            return Err(RasterError::InvalidRegion);
        }
        let size = target.bounds.size();
        let bpp = format.bytes_per_pixel();
        let stride = target.stride(format);
        cookie.set_progress_max(u64::from(size.height));

        for (y, row) in target.pixels.chunks_exact_mut(stride.max(1)).enumerate() {
            // One checkpoint per scanline.
            if cookie.is_aborted() {
                return Ok(RenderOutcome::Aborted);
            }
            let page_y = region.y0 + (y as f64 + 0.5) / zoom;
            for (x, pixel) in row.chunks_exact_mut(bpp).enumerate() {
                let page_x = region.x0 + (x as f64 + 0.5) / zoom;
                format.encode(self.color_at(page_x, page_y), pixel);
            }
            cookie.advance(1);
        }
        Ok(RenderOutcome::Completed)
    }
}
