use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use engine::{
    RenderHooks, RenderRuntime, RenderRuntimeConfig, RenderStartError, RenderState, RenderStats,
};
use model::PageRect;
use render_protocol::{
    FullPageSource, RasterBackend, RasterError, RenderProgress, ViewportRequest,
};
use tiles::{FallbackImage, FallbackImageError};
use view::{ControlSize, PageView, ViewError};

use crate::config::{ViewerConfig, ViewerConfigError};
use crate::frame::DrawFrame;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerError {
    Config(ViewerConfigError),
    View(ViewError),
    Fallback(RasterError),
    FallbackImage(FallbackImageError),
    Start(RenderStartError),
}

impl fmt::Display for ViewerError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerError::Config(error) => write!(formatter, "invalid viewer config: {error}"),
            ViewerError::View(error) => write!(formatter, "{error}"),
            ViewerError::Fallback(error) => {
                write!(formatter, "failed to render fallback image: {error}")
            }
            ViewerError::FallbackImage(error) => write!(formatter, "{error}"),
            ViewerError::Start(error) => write!(formatter, "{error}"),
        }
    }
}

impl std::error::Error for ViewerError {}

impl From<ViewerConfigError> for ViewerError {
    fn from(error: ViewerConfigError) -> Self {
        ViewerError::Config(error)
    }
}

impl From<ViewError> for ViewerError {
    fn from(error: ViewError) -> Self {
        ViewerError::View(error)
    }
}

impl From<FallbackImageError> for ViewerError {
    fn from(error: FallbackImageError) -> Self {
        ViewerError::FallbackImage(error)
    }
}

impl From<RenderStartError> for ViewerError {
    fn from(error: RenderStartError) -> Self {
        ViewerError::Start(error)
    }
}

/// A page shown in a resizable control.
///
/// Owns the display area, the coarse fallback image and the render runtime.
/// Every view change replaces the latest viewport request; `draw` never
/// waits for the renderer.
pub struct PageViewer<S: RasterBackend + FullPageSource + 'static> {
    source: Arc<S>,
    runtime: RenderRuntime,
    view: PageView,
    fallback: ArcSwap<FallbackImage>,
    config: ViewerConfig,
}

impl<S: RasterBackend + FullPageSource + 'static> PageViewer<S> {
    pub fn new(
        source: Arc<S>,
        control: ControlSize,
        config: ViewerConfig,
        hooks: RenderHooks,
    ) -> Result<Self, ViewerError> {
        config.validate()?;
        let mut view = PageView::new(source.page_bounds(), control, config.layout_scale)?;
        view.set_zoom_increment(config.zoom_increment)?;

        let fallback = render_fallback(source.as_ref(), &view, &config)?;
        log::info!(
            "fallback image {}x{} for page {:?}",
            fallback.size().width,
            fallback.size().height,
            view.page_bounds()
        );

        let backend: Arc<dyn RasterBackend> = source.clone();
        let runtime = RenderRuntime::start(
            backend,
            RenderRuntimeConfig {
                pixel_format: config.pixel_format,
                thread_name: config.thread_name.clone(),
            },
            hooks,
        )?;

        let viewer = Self {
            source,
            runtime,
            view,
            fallback: ArcSwap::from_pointee(fallback),
            config,
        };
        viewer.request_render();
        Ok(viewer)
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn view(&self) -> &PageView {
        &self.view
    }

    pub fn page_bounds(&self) -> PageRect {
        self.view.page_bounds()
    }

    pub fn display_area(&self) -> PageRect {
        self.view.display_area()
    }

    pub fn zoom(&self) -> f64 {
        self.view.zoom()
    }

    pub fn viewport_request(&self) -> ViewportRequest {
        self.view.viewport_request()
    }

    /// Show `area`, widened around its center to the control's aspect ratio.
    pub fn set_display_area(&mut self, area: PageRect) -> Result<(), ViewerError> {
        self.update_view(|view| view.set_display_area(area))
    }

    /// Zoom by `count` increments around `center` (control units), or around
    /// the middle of the control.
    pub fn zoom_step(&mut self, count: f64, center: Option<(f64, f64)>) -> Result<(), ViewerError> {
        self.update_view(|view| view.zoom_step(count, center))
    }

    pub fn set_zoom(&mut self, zoom: f64) -> Result<(), ViewerError> {
        self.update_view(|view| view.set_zoom(zoom))
    }

    pub fn contain(&mut self) -> Result<(), ViewerError> {
        self.update_view(PageView::contain)
    }

    pub fn cover(&mut self) -> Result<(), ViewerError> {
        self.update_view(PageView::cover)
    }

    pub fn resize(&mut self, control: ControlSize) -> Result<(), ViewerError> {
        self.update_view(|view| view.resize(control))
    }

    pub fn pan_by(&mut self, delta_x: f64, delta_y: f64) -> Result<(), ViewerError> {
        self.update_view(|view| view.pan_by(delta_x, delta_y))
    }

    pub fn set_zoom_increment(&mut self, increment: f64) -> Result<(), ViewerError> {
        if self.runtime.is_disposed() {
            return Ok(());
        }
        self.view.set_zoom_increment(increment)?;
        self.config.zoom_increment = increment;
        Ok(())
    }

    /// Change the device pixel density. The fallback image is rendered again
    /// at the new density.
    pub fn set_layout_scale(&mut self, layout_scale: f64) -> Result<(), ViewerError> {
        if self.runtime.is_disposed() {
            return Ok(());
        }
        self.update_view(|view| view.set_layout_scale(layout_scale))?;
        self.config.layout_scale = layout_scale;
        self.refresh_fallback()
    }

    /// Render the whole-page fallback again on the calling thread.
    pub fn refresh_fallback(&self) -> Result<(), ViewerError> {
        if self.runtime.is_disposed() {
            return Ok(());
        }
        let image = render_fallback(self.source.as_ref(), &self.view, &self.config)?;
        self.fallback.store(Arc::new(image));
        Ok(())
    }

    pub fn fallback_image(&self) -> Arc<FallbackImage> {
        self.fallback.load_full()
    }

    /// Published tiles when they can be read without waiting, the fallback
    /// image otherwise.
    pub fn draw(&self) -> DrawFrame<'_> {
        if let Some(tiles) = self.runtime.try_read_tiles() {
            return DrawFrame::Tiles(tiles);
        }
        let image = self.fallback.load_full();
        let display_area = self.view.display_area();
        DrawFrame::Fallback {
            source_rect: image.source_rect(&display_area),
            image,
            display_area,
            refreshing: !self.runtime.is_disposed(),
        }
    }

    pub fn progress(&self) -> RenderProgress {
        self.runtime.progress()
    }

    pub fn last_error(&self) -> Option<RasterError> {
        self.runtime.last_error()
    }

    pub fn render_state(&self) -> RenderState {
        self.runtime.state()
    }

    pub fn stats(&self) -> RenderStats {
        self.runtime.stats()
    }

    pub fn is_released(&self) -> bool {
        self.runtime.is_disposed()
    }

    /// Stop rendering. Later view changes are accepted and ignored.
    pub fn release(&mut self) {
        self.runtime.dispose();
    }

    fn update_view(
        &mut self,
        change: impl FnOnce(&mut PageView) -> Result<(), ViewError>,
    ) -> Result<(), ViewerError> {
        if self.runtime.is_disposed() {
            log::trace!("view change after release, ignoring");
            return Ok(());
        }
        change(&mut self.view)?;
        log::debug!(
            "display area {:?} zoom {:.3}",
            self.view.display_area(),
            self.view.zoom()
        );
        self.request_render();
        Ok(())
    }

    fn request_render(&self) {
        if !self.runtime.request_render(self.view.viewport_request()) {
            log::trace!("render runtime gone, viewport not requested");
        }
    }
}

fn render_fallback<S: FullPageSource + ?Sized>(
    source: &S,
    view: &PageView,
    config: &ViewerConfig,
) -> Result<FallbackImage, ViewerError> {
    let size = view.fallback_size(config.resolution_multiplier)?;
    let pixels = source
        .render_full_page(size, config.pixel_format)
        .map_err(ViewerError::Fallback)?;
    Ok(FallbackImage::new(
        view.page_bounds(),
        size,
        config.pixel_format,
        pixels,
    )?)
}
