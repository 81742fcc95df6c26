use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use model::{PageRect, PixelSize, TileLayout};
use render_protocol::{
    FullPageSource, PixelFormat, RasterBackend, RasterError, RenderOutcome, TileTarget,
};
use tiles::TileBufferSet;

use super::*;

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const PAPER: [u8; 4] = [250, 250, 250, 255];

fn sample_page() -> DisplayList {
    DisplayList::new(PageRect::new(0.0, 0.0, 60.0, 40.0), PAPER)
        .with_rect(PageRect::new(5.0, 5.0, 35.0, 20.0), RED)
        .with_rect(PageRect::new(30.0, 10.0, 55.0, 38.0), BLUE)
}

fn rasterizer<C: PageContent>(content: C, config: RasterizerConfig) -> TiledRasterizer<C> {
    TiledRasterizer::new(Arc::new(content), config).expect("rasterizer")
}

fn render_frame<C: PageContent>(
    rasterizer: &TiledRasterizer<C>,
    region: PageRect,
    size: PixelSize,
    format: PixelFormat,
) -> (RenderOutcome, Vec<u8>) {
    let layout =
        TileLayout::new(size, rasterizer.tile_count() as u32).expect("tile layout");
    let mut set = TileBufferSet::new(format);
    set.ensure_layout(&layout);
    let outcome = {
        let mut targets = set.targets_mut();
        rasterizer
            .render(&layout, region, &mut targets, format)
            .expect("render")
    };
    (outcome, set.compose().expect("compose"))
}

fn pixel(frame: &[u8], width: u32, x: u32, y: u32, format: PixelFormat) -> [u8; 4] {
    let bpp = format.bytes_per_pixel();
    let offset = (y * width + x) as usize * bpp;
    format.decode(&frame[offset..offset + bpp])
}

#[test]
fn display_list_topmost_rect_wins() {
    let page = sample_page();
    assert_eq!(page.color_at(1.0, 1.0), PAPER);
    assert_eq!(page.color_at(10.0, 10.0), RED);
    assert_eq!(page.color_at(32.0, 15.0), BLUE);
    assert_eq!(page.color_at(35.0, 6.0), PAPER);
}

#[test]
fn tiled_render_matches_single_tile_render() {
    let region = PageRect::new(0.0, 0.0, 60.0, 40.0);
    let size = PixelSize::new(120, 80);
    let tiled = rasterizer(
        sample_page(),
        RasterizerConfig {
            tile_count: 6,
            ..RasterizerConfig::default()
        },
    );
    let single = rasterizer(
        sample_page(),
        RasterizerConfig {
            tile_count: 1,
            ..RasterizerConfig::default()
        },
    );

    let (tiled_outcome, tiled_frame) = render_frame(&tiled, region, size, PixelFormat::Rgba);
    let (single_outcome, single_frame) = render_frame(&single, region, size, PixelFormat::Rgba);

    assert_eq!(tiled_outcome, RenderOutcome::Completed);
    assert_eq!(single_outcome, RenderOutcome::Completed);
    assert!(tiled_frame == single_frame, "tiled output differs");
    assert_eq!(pixel(&tiled_frame, 120, 20, 20, PixelFormat::Rgba), RED);
    assert_eq!(pixel(&tiled_frame, 120, 100, 60, PixelFormat::Rgba), BLUE);
}

#[test]
fn tile_count_is_lowered_to_an_even_split() {
    let raster = rasterizer(
        sample_page(),
        RasterizerConfig {
            tile_count: 11,
            ..RasterizerConfig::default()
        },
    );
    assert_eq!(raster.tile_count(), 10);
    assert_eq!(raster.progress().tiles.len(), 10);
}

#[test]
fn pixels_outside_the_page_are_cleared() {
    let page = DisplayList::new(PageRect::new(0.0, 0.0, 10.0, 10.0), PAPER);
    let region = PageRect::new(-5.0, 0.0, 15.0, 10.0);
    let size = PixelSize::new(20, 10);
    let single_tile = RasterizerConfig {
        tile_count: 1,
        ..RasterizerConfig::default()
    };

    let clipped = rasterizer(page.clone(), single_tile.clone());
    let (_, frame) = render_frame(&clipped, region, size, PixelFormat::Rgba);
    assert_eq!(pixel(&frame, 20, 4, 3, PixelFormat::Rgba), [0, 0, 0, 0]);
    assert_eq!(pixel(&frame, 20, 5, 3, PixelFormat::Rgba), PAPER);
    assert_eq!(pixel(&frame, 20, 14, 3, PixelFormat::Rgba), PAPER);
    assert_eq!(pixel(&frame, 20, 15, 3, PixelFormat::Rgba), [0, 0, 0, 0]);

    let (_, opaque) = render_frame(&clipped, region, size, PixelFormat::Rgb);
    assert_eq!(pixel(&opaque, 20, 0, 0, PixelFormat::Rgb), [255, 255, 255, 255]);

    let unclipped = rasterizer(
        page,
        RasterizerConfig {
            clip_to_page_bounds: false,
            ..single_tile
        },
    );
    let (_, frame) = render_frame(&unclipped, region, size, PixelFormat::Rgba);
    assert_eq!(pixel(&frame, 20, 0, 0, PixelFormat::Rgba), PAPER);
}

/// Content that spins until aborted.
struct BlockingContent;

impl PageContent for BlockingContent {
    fn bounds(&self) -> PageRect {
        PageRect::new(0.0, 0.0, 10.0, 10.0)
    }

    fn render(
        &self,
        _region: PageRect,
        _zoom: f64,
        _target: &mut TileTarget<'_>,
        _format: PixelFormat,
        cookie: &RenderCookie,
    ) -> Result<RenderOutcome, RasterError> {
        cookie.set_progress_max(1);
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cookie.is_aborted() {
                return Ok(RenderOutcome::Aborted);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(RenderOutcome::Completed)
    }
}

#[test]
fn abort_reaches_every_tile() {
    let raster = Arc::new(rasterizer(
        BlockingContent,
        RasterizerConfig {
            tile_count: 2,
            ..RasterizerConfig::default()
        },
    ));
    let render_raster = Arc::clone(&raster);
    let render = std::thread::spawn(move || {
        let (outcome, _) = render_frame(
            &render_raster,
            PageRect::new(0.0, 0.0, 10.0, 10.0),
            PixelSize::new(10, 10),
            PixelFormat::Rgba,
        );
        outcome
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while !raster.progress().tiles.iter().any(|tile| tile.max == 1) {
        assert!(Instant::now() < deadline, "tiles never started");
        std::thread::sleep(Duration::from_millis(1));
    }
    raster.abort();

    assert_eq!(render.join().expect("render thread"), RenderOutcome::Aborted);
}

#[test]
fn mismatched_targets_are_rejected() {
    let raster = rasterizer(sample_page(), RasterizerConfig::default());
    let layout = TileLayout::new(PixelSize::new(40, 40), 4).expect("layout");
    let mut set = TileBufferSet::new(PixelFormat::Rgba);
    set.ensure_layout(&layout);
    let mut targets = set.targets_mut();
    targets.pop();

    assert_eq!(
        raster.render(
            &layout,
            PageRect::new(0.0, 0.0, 40.0, 40.0),
            &mut targets,
            PixelFormat::Rgba
        ),
        Err(RasterError::TargetCountMismatch {
            expected: 4,
            actual: 3,
        })
    );
    assert_eq!(
        raster.render(
            &layout,
            PageRect::new(0.0, 0.0, 0.0, 40.0),
            &mut targets,
            PixelFormat::Rgba
        ),
        Err(RasterError::InvalidRegion)
    );
}

#[test]
fn full_page_render_covers_the_page() {
    let page = DisplayList::new(PageRect::new(0.0, 0.0, 20.0, 10.0), PAPER)
        .with_rect(PageRect::new(0.0, 0.0, 10.0, 10.0), RED);
    let raster = rasterizer(page, RasterizerConfig::default());

    assert_eq!(raster.page_bounds(), PageRect::new(0.0, 0.0, 20.0, 10.0));
    let pixels = raster
        .render_full_page(PixelSize::new(40, 20), PixelFormat::Rgb)
        .expect("full page");
    assert_eq!(pixels.len(), 40 * 20 * 3);
    assert_eq!(pixel(&pixels, 40, 0, 0, PixelFormat::Rgb), RED);
    assert_eq!(pixel(&pixels, 40, 39, 19, PixelFormat::Rgb), PAPER);
    assert_eq!(
        raster.render_full_page(PixelSize::new(0, 20), PixelFormat::Rgb),
        Err(RasterError::InvalidRegion)
    );
}

struct RecordingContent {
    calls: Mutex<Vec<(PageRect, f64)>>,
}

impl PageContent for RecordingContent {
    fn bounds(&self) -> PageRect {
        PageRect::new(0.0, 0.0, 100.0, 100.0)
    }

    fn render(
        &self,
        region: PageRect,
        zoom: f64,
        _target: &mut TileTarget<'_>,
        _format: PixelFormat,
        _cookie: &RenderCookie,
    ) -> Result<RenderOutcome, RasterError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((region, zoom));
        }
        Ok(RenderOutcome::Completed)
    }
}

#[test]
fn image_pages_are_rendered_in_image_pixels() {
    let raster = rasterizer(
        RecordingContent {
            calls: Mutex::new(Vec::new()),
        },
        RasterizerConfig {
            tile_count: 1,
            image_resolution: Some(ImageResolution { x: 144.0, y: 144.0 }),
            ..RasterizerConfig::default()
        },
    );
    render_frame(
        &raster,
        PageRect::new(0.0, 0.0, 100.0, 100.0),
        PixelSize::new(100, 100),
        PixelFormat::Rgba,
    );

    let calls = raster.content().calls.lock().expect("calls").clone();
    assert_eq!(calls, vec![(PageRect::new(0.0, 0.0, 50.0, 50.0), 2.0)]);
    assert!(ImageResolution::POINTS.is_points());
}

#[test]
fn config_fills_missing_fields_and_validates() {
    let config: RasterizerConfig =
        serde_json::from_str(r#"{ "tile_count": 8 }"#).expect("parse config");
    assert_eq!(config.tile_count, 8);
    assert!(config.clip_to_page_bounds);
    assert_eq!(config.validate(), Ok(()));

    let zero = RasterizerConfig {
        tile_count: 0,
        ..RasterizerConfig::default()
    };
    assert_eq!(zero.validate(), Err(RasterizerConfigError::ZeroTileCount));
    assert!(matches!(
        TiledRasterizer::new(Arc::new(sample_page()), zero),
        Err(RasterizerBuildError::Config(RasterizerConfigError::ZeroTileCount))
    ));

    let bad_resolution = RasterizerConfig {
        image_resolution: Some(ImageResolution { x: 0.0, y: 72.0 }),
        ..RasterizerConfig::default()
    };
    assert_eq!(
        bad_resolution.validate(),
        Err(RasterizerConfigError::InvalidImageResolution)
    );
}
