use std::sync::Arc;

use model::{PageRect, PixelRect, PixelSize, TileLayout, acceptable_tile_count};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use render_protocol::{
    FullPageSource, PixelFormat, RasterBackend, RasterError, RenderOutcome, RenderProgress,
    TileTarget,
};

use crate::content::PageContent;
use crate::cookie::RenderCookie;
use crate::{ImageResolution, RasterizerBuildError, RasterizerConfig};

// Rounding slack used when mapping the page bounds onto tile pixels.
const CLIP_EPSILON: f64 = 0.001;

/// Renders page content into a tile layout, one pool thread per tile.
pub struct TiledRasterizer<C> {
    content: Arc<C>,
    config: RasterizerConfig,
    tile_count: usize,
    pool: ThreadPool,
    cookies: Box<[RenderCookie]>,
}

impl<C: PageContent> TiledRasterizer<C> {
    pub fn new(content: Arc<C>, config: RasterizerConfig) -> Result<Self, RasterizerBuildError> {
        config.validate()?;
        let requested = u32::try_from(config.tile_count).unwrap_or(u32::MAX);
        let tile_count = acceptable_tile_count(requested)? as usize;
        if tile_count != config.tile_count {
            log::info!(
                "tile count {} lowered to {tile_count} for an even split",
                config.tile_count
            );
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(tile_count)
            .thread_name(|index| format!("raster_tile_{index}"))
            .build()
            .map_err(|error| RasterizerBuildError::ThreadPool(error.to_string()))?;
        let cookies = (0..tile_count).map(|_| RenderCookie::new()).collect();

        Ok(Self {
            content,
            config,
            tile_count,
            pool,
            cookies,
        })
    }

    pub fn content(&self) -> &Arc<C> {
        &self.content
    }

    pub fn config(&self) -> &RasterizerConfig {
        &self.config
    }

    fn check_targets(
        &self,
        layout: &TileLayout,
        targets: &[TileTarget<'_>],
        format: PixelFormat,
    ) -> Result<(), RasterError> {
        if targets.len() != layout.len() || layout.len() > self.tile_count {
            return Err(RasterError::TargetCountMismatch {
                expected: layout.len().min(self.tile_count),
                actual: targets.len(),
            });
        }
        for (index, (target, tile)) in targets.iter().zip(layout.tiles()).enumerate() {
            let expected = format.byte_len(tile.bounds.size());
            if target.bounds != tile.bounds || target.pixels.len() != expected {
                return Err(RasterError::TargetSizeMismatch {
                    index,
                    expected,
                    actual: target.pixels.len(),
                });
            }
        }
        Ok(())
    }

    fn render_tile(
        &self,
        tile_region: PageRect,
        zoom: f64,
        target: &mut TileTarget<'_>,
        format: PixelFormat,
        cookie: &RenderCookie,
    ) -> Result<RenderOutcome, RasterError> {
        let (content_region, content_zoom) =
            correct_for_resolution(tile_region, zoom, self.config.image_resolution);
        let outcome = self
            .content
            .render(content_region, content_zoom, target, format, cookie)?;

        let page_bounds = self.content.bounds();
        if outcome == RenderOutcome::Completed
            && self.config.clip_to_page_bounds
            && !page_bounds.contains(&tile_region)
        {
            clip_to_page(target, tile_region, page_bounds, format);
        }
        Ok(outcome)
    }
}

impl<C: PageContent> RasterBackend for TiledRasterizer<C> {
    fn tile_count(&self) -> usize {
        self.tile_count
    }

    fn render(
        &self,
        layout: &TileLayout,
        region: PageRect,
        targets: &mut [TileTarget<'_>],
        format: PixelFormat,
    ) -> Result<RenderOutcome, RasterError> {
        if !region.is_renderable() {
            return Err(RasterError::InvalidRegion);
        }
        self.check_targets(layout, targets, format)?;
        for cookie in self.cookies.iter() {
            cookie.reset();
        }

        let target_size = layout.target_size();
        let zoom_x = f64::from(target_size.width) / region.width();
        let zoom_y = f64::from(target_size.height) / region.height();
        let zoom = (zoom_x * zoom_y).sqrt();
        log::trace!(
            "rendering {}x{} in {} tiles at zoom {zoom:.3}",
            target_size.width,
            target_size.height,
            targets.len()
        );

        let outcomes: Vec<Result<RenderOutcome, RasterError>> = self.pool.install(|| {
            targets
                .par_iter_mut()
                .zip(self.cookies.par_iter())
                .map(|(target, cookie)| {
                    let tile_region = tile_page_region(region, zoom, target.bounds);
                    self.render_tile(tile_region, zoom, target, format, cookie)
                })
                .collect()
        });

        let mut aborted = false;
        for outcome in outcomes {
            aborted |= outcome? == RenderOutcome::Aborted;
        }
        Ok(if aborted {
            RenderOutcome::Aborted
        } else {
            RenderOutcome::Completed
        })
    }

    fn abort(&self) {
        for cookie in self.cookies.iter() {
            cookie.abort();
        }
    }

    fn progress(&self) -> RenderProgress {
        RenderProgress {
            tiles: self.cookies.iter().map(RenderCookie::snapshot).collect(),
        }
    }
}

impl<C: PageContent> FullPageSource for TiledRasterizer<C> {
    fn page_bounds(&self) -> PageRect {
        self.content.bounds()
    }

    fn render_full_page(
        &self,
        size: PixelSize,
        format: PixelFormat,
    ) -> Result<Vec<u8>, RasterError> {
        let bounds = self.content.bounds();
        if size.is_empty() || !bounds.is_renderable() {
            return Err(RasterError::InvalidRegion);
        }
        let zoom_x = f64::from(size.width) / bounds.width();
        let zoom_y = f64::from(size.height) / bounds.height();
        let zoom = (zoom_x * zoom_y).sqrt();

        let mut pixels = vec![0; format.byte_len(size)];
        let mut target = TileTarget {
            bounds: PixelRect::new(0, 0, size.width as i32, size.height as i32),
            pixels: &mut pixels,
        };
        // Not abortable from outside; the fallback image is rendered once.
        let cookie = RenderCookie::new();
        let (region, zoom) = correct_for_resolution(bounds, zoom, self.config.image_resolution);
        match self
            .content
            .render(region, zoom, &mut target, format, &cookie)?
        {
            RenderOutcome::Completed => Ok(pixels),
            RenderOutcome::Aborted => Err(RasterError::CannotRender {
                message: "full page render aborted".to_owned(),
            }),
        }
    }
}

/// Page-space area covered by `bounds` when `region` starts at pixel (0, 0).
pub(crate) fn tile_page_region(region: PageRect, zoom: f64, bounds: PixelRect) -> PageRect {
    PageRect::new(
        region.x0 + f64::from(bounds.x0) / zoom,
        region.y0 + f64::from(bounds.y0) / zoom,
        region.x0 + f64::from(bounds.x1) / zoom,
        region.y0 + f64::from(bounds.y1) / zoom,
    )
}

/// Image pages are addressed in image pixels rather than points.
fn correct_for_resolution(
    region: PageRect,
    zoom: f64,
    resolution: Option<ImageResolution>,
) -> (PageRect, f64) {
    match resolution {
        Some(resolution) if !resolution.is_points() => (
            PageRect::new(
                region.x0 * 72.0 / resolution.x,
                region.y0 * 72.0 / resolution.y,
                region.x1 * 72.0 / resolution.x,
                region.y1 * 72.0 / resolution.y,
            ),
            zoom * (resolution.x * resolution.y).sqrt() / 72.0,
        ),
        _ => (region, zoom),
    }
}

/// Clear every pixel of `target` that falls outside `page`. Opaque formats
/// clear to white, formats with alpha to transparent.
pub(crate) fn clip_to_page(
    target: &mut TileTarget<'_>,
    area: PageRect,
    page: PageRect,
    format: PixelFormat,
) {
    let size = target.bounds.size();
    let width = f64::from(size.width);
    let height = f64::from(size.height);

    let left = ((page.x0 - area.x0) / area.width() * width - CLIP_EPSILON)
        .ceil()
        .max(0.0) as u32;
    let right = (width - (area.x1 - page.x1) / area.width() * width + CLIP_EPSILON)
        .floor()
        .max(0.0) as u32;
    let top = ((page.y0 - area.y0) / area.height() * height - CLIP_EPSILON)
        .ceil()
        .max(0.0) as u32;
    let bottom = (height - (area.y1 - page.y1) / area.height() * height + CLIP_EPSILON)
        .floor()
        .max(0.0) as u32;
    if left == 0 && right >= size.width && top == 0 && bottom >= size.height {
        return;
    }

    let clear = if format.has_alpha() { 0 } else { 255 };
    let bpp = format.bytes_per_pixel();
    let stride = target.stride(format);
    if stride == 0 {
        return;
    }
    for (y, row) in target.pixels.chunks_exact_mut(stride).enumerate() {
        let y = y as u32;
        if y < top || y >= bottom {
            row.fill(clear);
            continue;
        }
        let left_end = (left.min(size.width) as usize) * bpp;
        row[..left_end].fill(clear);
        let right_start = (right.min(size.width) as usize) * bpp;
        if right_start < row.len() {
            row[right_start.max(left_end)..].fill(clear);
        }
    }
}
