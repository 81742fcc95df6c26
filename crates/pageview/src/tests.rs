use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use model::{PageRect, PixelSize, TileLayout};
use render_protocol::{
    FullPageSource, PixelFormat, RasterBackend, RasterError, RenderOutcome, RenderProgress,
    TileTarget,
};
use renderer::{DisplayList, RasterizerConfig, TiledRasterizer};

use super::*;

const WAIT: Duration = Duration::from_secs(5);
const PAPER: [u8; 4] = [250, 250, 250, 255];

/// Real rasterizer whose tiled renders can be held at the door.
struct ScriptedSource {
    inner: TiledRasterizer<DisplayList>,
    gated: AtomicBool,
    gate: Receiver<()>,
    entered: Sender<()>,
}

impl RasterBackend for ScriptedSource {
    fn tile_count(&self) -> usize {
        self.inner.tile_count()
    }

    fn render(
        &self,
        layout: &TileLayout,
        region: PageRect,
        targets: &mut [TileTarget<'_>],
        format: PixelFormat,
    ) -> Result<RenderOutcome, RasterError> {
        let _ = self.entered.send(());
        if self.gated.load(Ordering::Acquire) && self.gate.recv_timeout(WAIT).is_err() {
            return Err(RasterError::CannotRender {
                message: "gate never opened".to_owned(),
            });
        }
        self.inner.render(layout, region, targets, format)
    }

    fn abort(&self) {
        self.inner.abort();
    }

    fn progress(&self) -> RenderProgress {
        self.inner.progress()
    }
}

impl FullPageSource for ScriptedSource {
    fn page_bounds(&self) -> PageRect {
        self.inner.page_bounds()
    }

    fn render_full_page(
        &self,
        size: PixelSize,
        format: PixelFormat,
    ) -> Result<Vec<u8>, RasterError> {
        self.inner.render_full_page(size, format)
    }
}

struct Fixture {
    viewer: PageViewer<ScriptedSource>,
    gate: Sender<()>,
    entered: Receiver<()>,
    redraws: Receiver<()>,
}

impl Fixture {
    fn start(gated: bool) -> Self {
        Self::with_config(gated, ViewerConfig::default()).expect("viewer")
    }

    fn with_config(gated: bool, config: ViewerConfig) -> Result<Self, ViewerError> {
        let page = DisplayList::new(PageRect::new(0.0, 0.0, 100.0, 200.0), PAPER);
        let inner = TiledRasterizer::new(
            Arc::new(page),
            RasterizerConfig {
                tile_count: 2,
                ..RasterizerConfig::default()
            },
        )
        .expect("rasterizer");
        let (gate, gate_receiver) = unbounded();
        let (entered_sender, entered) = unbounded();
        let source = Arc::new(ScriptedSource {
            inner,
            gated: AtomicBool::new(gated),
            gate: gate_receiver,
            entered: entered_sender,
        });
        let (redraw_sender, redraws) = unbounded();
        let hooks = RenderHooks::new(move || {
            let _ = redraw_sender.send(());
        });
        let viewer = PageViewer::new(source, ControlSize::new(200.0, 200.0), config, hooks)?;
        Ok(Self {
            viewer,
            gate,
            entered,
            redraws,
        })
    }

    fn expect_entered(&self) {
        self.entered
            .recv_timeout(WAIT)
            .expect("render did not start");
    }

    fn release_render(&self) {
        self.gate.send(()).expect("gate");
    }

    /// Wait until the published tiles match the current view.
    fn wait_for_current_tiles(&self) {
        let deadline = Instant::now() + WAIT;
        loop {
            let wanted = self.viewer.viewport_request();
            if let DrawFrame::Tiles(tiles) = self.viewer.draw()
                && tiles.request() == wanted
            {
                return;
            }
            assert!(Instant::now() < deadline, "tiles for {wanted:?} never published");
            let _ = self.redraws.recv_timeout(Duration::from_millis(20));
        }
    }
}

fn assert_rect_close(actual: PageRect, expected: PageRect) {
    let close = [
        (actual.x0, expected.x0),
        (actual.y0, expected.y0),
        (actual.x1, expected.x1),
        (actual.y1, expected.y1),
    ]
    .iter()
    .all(|(a, b)| (a - b).abs() < 1e-9);
    assert!(close, "{actual:?} != {expected:?}");
}

#[test]
fn first_render_publishes_tiles_for_the_contained_page() {
    let fixture = Fixture::start(false);
    fixture.wait_for_current_tiles();

    assert_rect_close(
        fixture.viewer.display_area(),
        PageRect::new(-50.0, 0.0, 150.0, 200.0),
    );
    let frame = fixture.viewer.draw();
    let DrawFrame::Tiles(tiles) = &frame else {
        panic!("expected tiles");
    };
    assert_eq!(tiles.len(), 2);
    let pixels = frame.to_pixels(PixelSize::new(200, 200)).expect("pixels");
    assert_eq!(pixels.len(), 200 * 200 * 4);
    // Middle of the control is page, the left strip is off the page.
    let at = |x: usize, y: usize| {
        let offset = (y * 200 + x) * 4;
        [
            pixels[offset],
            pixels[offset + 1],
            pixels[offset + 2],
            pixels[offset + 3],
        ]
    };
    assert_eq!(at(100, 100), PAPER);
    assert_eq!(at(10, 100), [0, 0, 0, 0]);
}

#[test]
fn fallback_is_drawn_while_the_first_render_runs() {
    let fixture = Fixture::start(true);
    fixture.expect_entered();

    match fixture.viewer.draw() {
        DrawFrame::Fallback {
            image,
            source_rect,
            refreshing,
            ..
        } => {
            assert_eq!(image.size(), PixelSize::new(200, 400));
            assert_rect_close(source_rect, PageRect::new(-100.0, 0.0, 300.0, 400.0));
            assert!(refreshing);
        }
        DrawFrame::Tiles(_) => panic!("tiles published while the render is held"),
    }

    fixture.release_render();
    fixture.wait_for_current_tiles();
    assert_eq!(fixture.viewer.render_state(), RenderState::Idle);
}

#[test]
fn zoom_change_renders_the_new_viewport() {
    let mut fixture = Fixture::start(false);
    fixture.wait_for_current_tiles();
    let first = fixture.viewer.stats().published;

    fixture.viewer.zoom_step(3.0, None).expect("zoom");
    assert!((fixture.viewer.zoom() - 1.5).abs() < 1e-9);
    fixture.wait_for_current_tiles();

    assert!(fixture.viewer.stats().published > first);
    assert_rect_close(
        fixture.viewer.display_area(),
        PageRect::new(0.0, 50.0, 100.0, 150.0),
    );
}

#[test]
fn burst_while_rendering_ends_on_the_last_view() {
    let mut fixture = Fixture::start(true);
    fixture.expect_entered();

    fixture.viewer.cover().expect("cover");
    fixture.viewer.pan_by(0.0, 40.0).expect("pan");
    fixture.viewer.zoom_step(-1.0, None).expect("zoom out");

    // Every held render needs one permit; extra permits stay unused.
    for _ in 0..4 {
        fixture.release_render();
    }
    fixture.wait_for_current_tiles();
    assert!(fixture.viewer.last_error().is_none());
}

#[test]
fn release_turns_view_changes_into_no_ops() {
    let mut fixture = Fixture::start(false);
    fixture.wait_for_current_tiles();
    fixture.viewer.release();
    assert!(fixture.viewer.is_released());

    let before = fixture.viewer.display_area();
    fixture.viewer.zoom_step(2.0, None).expect("zoom after release");
    fixture.viewer.set_layout_scale(2.0).expect("scale after release");
    assert_eq!(fixture.viewer.display_area(), before);

    match fixture.viewer.draw() {
        DrawFrame::Fallback { refreshing, .. } => assert!(!refreshing),
        DrawFrame::Tiles(_) => panic!("tiles readable after release"),
    }
    fixture.viewer.release();
}

#[test]
fn layout_scale_change_refreshes_the_fallback() {
    let mut fixture = Fixture::start(false);
    fixture.wait_for_current_tiles();
    assert_eq!(fixture.viewer.fallback_image().size(), PixelSize::new(200, 400));

    fixture.viewer.set_layout_scale(2.0).expect("scale");
    assert_eq!(fixture.viewer.fallback_image().size(), PixelSize::new(400, 800));
    assert_eq!(
        fixture.viewer.viewport_request().target_size,
        PixelSize::new(400, 400)
    );
    fixture.wait_for_current_tiles();
}

#[test]
fn invalid_inputs_are_rejected() {
    let config = ViewerConfig {
        resolution_multiplier: 0.0,
        ..ViewerConfig::default()
    };
    assert!(matches!(
        Fixture::with_config(false, config),
        Err(ViewerError::Config(
            ViewerConfigError::InvalidResolutionMultiplier
        ))
    ));

    let mut fixture = Fixture::start(false);
    assert!(matches!(
        fixture.viewer.set_zoom(-1.0),
        Err(ViewerError::View(view::ViewError::InvalidZoom))
    ));
}

#[test]
fn config_fills_missing_fields() {
    let config: ViewerConfig = serde_json::from_str(
        r#"{ "resolution_multiplier": 2.0, "pixel_format": "bgra" }"#,
    )
    .expect("parse config");
    assert_eq!(config.resolution_multiplier, 2.0);
    assert_eq!(config.pixel_format, PixelFormat::Bgra);
    assert_eq!(config.thread_name, "page_render");
    assert_eq!(config.validate(), Ok(()));

    let unnamed = ViewerConfig {
        thread_name: String::new(),
        ..ViewerConfig::default()
    };
    assert_eq!(unnamed.validate(), Err(ViewerConfigError::EmptyThreadName));
}
