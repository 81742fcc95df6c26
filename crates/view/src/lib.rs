use std::fmt;

use model::{PageRect, PixelSize};
use render_protocol::ViewportRequest;

// Page space is in points, control space in 1/96 inch units.
const POINTS_PER_CONTROL_UNIT: f64 = 72.0 / 96.0;

/// Size of the hosting control in layout (device-independent) units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSize {
    pub width: f64,
    pub height: f64,
}

impl ControlSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewError {
    InvalidPageBounds,
    InvalidControlSize,
    InvalidZoom,
    InvalidScale,
    EmptyDisplayArea,
    NonFiniteValue,
}

impl fmt::Display for ViewError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewError::InvalidPageBounds => {
                write!(formatter, "page bounds must be finite and non-empty")
            }
            ViewError::InvalidControlSize => {
                write!(formatter, "control size must be finite and positive")
            }
            ViewError::InvalidZoom => write!(formatter, "zoom must be finite and positive"),
            ViewError::InvalidScale => {
                write!(formatter, "layout scale must be finite and positive")
            }
            ViewError::EmptyDisplayArea => {
                write!(formatter, "display area must be finite and non-empty")
            }
            ViewError::NonFiniteValue => write!(formatter, "computation produced a non-finite value"),
        }
    }
}

impl std::error::Error for ViewError {}

/// Which part of the page is shown in the control, and at what density.
///
/// The display area always has the control's aspect ratio. Every mutation
/// either keeps it or rejects the input, so `viewport_request` can always be
/// handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageView {
    page_bounds: PageRect,
    control: ControlSize,
    layout_scale: f64,
    zoom_increment: f64,
    display_area: PageRect,
}

impl PageView {
    pub const DEFAULT_ZOOM_INCREMENT: f64 = 1.259_921_049_894_873_2;

    /// A view showing the whole page, centered.
    pub fn new(
        page_bounds: PageRect,
        control: ControlSize,
        layout_scale: f64,
    ) -> Result<Self, ViewError> {
        if !page_bounds.is_renderable() {
            return Err(ViewError::InvalidPageBounds);
        }
        if !control.is_valid() {
            return Err(ViewError::InvalidControlSize);
        }
        check_positive(layout_scale, ViewError::InvalidScale)?;

        let mut view = Self {
            page_bounds,
            control,
            layout_scale,
            zoom_increment: Self::DEFAULT_ZOOM_INCREMENT,
            display_area: page_bounds,
        };
        view.contain()?;
        Ok(view)
    }

    pub fn page_bounds(&self) -> PageRect {
        self.page_bounds
    }

    pub fn control_size(&self) -> ControlSize {
        self.control
    }

    pub fn layout_scale(&self) -> f64 {
        self.layout_scale
    }

    pub fn zoom_increment(&self) -> f64 {
        self.zoom_increment
    }

    pub fn display_area(&self) -> PageRect {
        self.display_area
    }

    /// Grow `area` around its center until it matches the control's aspect
    /// ratio.
    pub fn sanitize(&self, area: PageRect) -> Result<PageRect, ViewError> {
        if !area.is_renderable() {
            return Err(ViewError::EmptyDisplayArea);
        }
        let width_ratio = area.width() / self.control.width;
        let height_ratio = area.height() / self.control.height;
        let ratio = width_ratio.max(height_ratio);

        let delta_w = (ratio * self.control.width - area.width()) * 0.5;
        let delta_h = (ratio * self.control.height - area.height()) * 0.5;
        finite_area(PageRect::new(
            area.x0 - delta_w,
            area.y0 - delta_h,
            area.x1 + delta_w,
            area.y1 + delta_h,
        ))
    }

    pub fn set_display_area(&mut self, area: PageRect) -> Result<(), ViewError> {
        self.display_area = self.sanitize(area)?;
        Ok(())
    }

    /// Show the whole page, letterboxed along one axis.
    pub fn contain(&mut self) -> Result<(), ViewError> {
        self.set_display_area(self.page_bounds)
    }

    /// Fill the whole control with page, cropping along one axis.
    pub fn cover(&mut self) -> Result<(), ViewError> {
        let page = self.page_bounds;
        let width_ratio = page.width() / self.control.width;
        let height_ratio = page.height() / self.control.height;
        let ratio = width_ratio.min(height_ratio);

        let delta_w = (ratio * self.control.width - page.width()) * 0.5;
        let delta_h = (ratio * self.control.height - page.height()) * 0.5;
        self.display_area = finite_area(PageRect::new(
            page.x0 - delta_w,
            page.y0 - delta_h,
            page.x1 + delta_w,
            page.y1 + delta_h,
        ))?;
        Ok(())
    }

    /// Zoom by `zoom_increment ^ count` around `center`, a point in control
    /// coordinates that stays fixed on screen. `None` zooms around the
    /// middle of the control. Negative counts zoom out.
    pub fn zoom_step(&mut self, count: f64, center: Option<(f64, f64)>) -> Result<(), ViewError> {
        if !count.is_finite() {
            return Err(ViewError::NonFiniteValue);
        }
        let factor = self.zoom_increment.powf(count);
        self.scale_display_area(factor, center)
    }

    /// Effective zoom, 1.0 meaning one page point per 1/72 inch on screen.
    pub fn zoom(&self) -> f64 {
        self.control.width / self.display_area.width() * POINTS_PER_CONTROL_UNIT * self.layout_scale
    }

    /// Zoom to an absolute level around the middle of the control.
    pub fn set_zoom(&mut self, zoom: f64) -> Result<(), ViewError> {
        check_positive(zoom, ViewError::InvalidZoom)?;
        let factor = checked_div(zoom, self.zoom())?;
        self.scale_display_area(factor, None)
    }

    pub fn set_zoom_increment(&mut self, increment: f64) -> Result<(), ViewError> {
        check_positive(increment, ViewError::InvalidZoom)?;
        self.zoom_increment = increment;
        Ok(())
    }

    pub fn set_layout_scale(&mut self, layout_scale: f64) -> Result<(), ViewError> {
        check_positive(layout_scale, ViewError::InvalidScale)?;
        self.layout_scale = layout_scale;
        Ok(())
    }

    /// Follow a control resize. The display area grows or shrinks with the
    /// control around its center, so the zoom level is unchanged.
    pub fn resize(&mut self, control: ControlSize) -> Result<(), ViewError> {
        if !control.is_valid() {
            return Err(ViewError::InvalidControlSize);
        }
        let old = self.control;
        let area = self.display_area;
        let delta_w = (control.width - old.width) / old.width * area.width();
        let delta_h = (control.height - old.height) / old.height * area.height();
        self.display_area = finite_area(PageRect::new(
            area.x0 - delta_w * 0.5,
            area.y0 - delta_h * 0.5,
            area.x1 + delta_w * 0.5,
            area.y1 + delta_h * 0.5,
        ))?;
        self.control = control;
        Ok(())
    }

    /// Move the page by a drag of `(delta_x, delta_y)` control units.
    pub fn pan_by(&mut self, delta_x: f64, delta_y: f64) -> Result<(), ViewError> {
        if !delta_x.is_finite() || !delta_y.is_finite() {
            return Err(ViewError::NonFiniteValue);
        }
        let area = self.display_area;
        let dx = -delta_x / self.control.width * area.width();
        let dy = -delta_y / self.control.height * area.height();
        self.display_area = finite_area(area.translate(dx, dy))?;
        Ok(())
    }

    /// Page-space location under a point in control coordinates.
    pub fn control_to_page(&self, x: f64, y: f64) -> (f64, f64) {
        let area = self.display_area;
        (
            x / self.control.width * area.width() + area.x0,
            y / self.control.height * area.height() + area.y0,
        )
    }

    /// Device pixel size of the tiled render target.
    pub fn target_size(&self) -> PixelSize {
        PixelSize::new(
            (self.control.width * self.layout_scale).ceil() as u32,
            (self.control.height * self.layout_scale).ceil() as u32,
        )
    }

    pub fn viewport_request(&self) -> ViewportRequest {
        ViewportRequest::new(self.target_size(), self.display_area)
    }

    /// Zoom at which the whole-page fallback image is rendered: large enough
    /// that the page fills the control at `resolution_multiplier` device
    /// pixels per control unit.
    pub fn fallback_zoom(&self, resolution_multiplier: f64) -> Result<f64, ViewError> {
        check_positive(resolution_multiplier, ViewError::InvalidScale)?;
        let density = resolution_multiplier * self.layout_scale;
        let width_ratio = self.page_bounds.width() / (self.control.width * density);
        let height_ratio = self.page_bounds.height() / (self.control.height * density);
        checked_div(1.0, width_ratio.min(height_ratio))
    }

    pub fn fallback_size(&self, resolution_multiplier: f64) -> Result<PixelSize, ViewError> {
        let zoom = self.fallback_zoom(resolution_multiplier)?;
        let page = PageRect::from_origin_size(
            0.0,
            0.0,
            self.page_bounds.width(),
            self.page_bounds.height(),
        );
        Ok(page.round_scaled(zoom).size())
    }

    fn scale_display_area(
        &mut self,
        factor: f64,
        center: Option<(f64, f64)>,
    ) -> Result<(), ViewError> {
        check_positive(factor, ViewError::InvalidZoom)?;
        let (center_x, center_y) =
            center.unwrap_or((self.control.width * 0.5, self.control.height * 0.5));
        if !center_x.is_finite() || !center_y.is_finite() {
            return Err(ViewError::NonFiniteValue);
        }
        let area = self.display_area;
        let anchor_x = center_x / self.control.width;
        let anchor_y = center_y / self.control.height;
        let delta_w = area.width() / factor - area.width();
        let delta_h = area.height() / factor - area.height();

        self.display_area = finite_area(PageRect::new(
            area.x0 - delta_w * anchor_x,
            area.y0 - delta_h * anchor_y,
            area.x1 + delta_w * (1.0 - anchor_x),
            area.y1 + delta_h * (1.0 - anchor_y),
        ))?;
        Ok(())
    }
}

fn check_positive(value: f64, error: ViewError) -> Result<(), ViewError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(error);
    }
    Ok(())
}

fn checked_div(numerator: f64, denominator: f64) -> Result<f64, ViewError> {
    let next = numerator / denominator;
    if !next.is_finite() {
        return Err(ViewError::NonFiniteValue);
    }
    Ok(next)
}

fn finite_area(area: PageRect) -> Result<PageRect, ViewError> {
    if !area.is_finite() {
        return Err(ViewError::NonFiniteValue);
    }
    if !area.is_renderable() {
        return Err(ViewError::EmptyDisplayArea);
    }
    Ok(area)
}
