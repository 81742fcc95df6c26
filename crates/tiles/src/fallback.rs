use std::fmt;

use model::{PageRect, PixelSize};
use render_protocol::PixelFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackImageError {
    PixelCountMismatch { expected: usize, actual: usize },
    EmptyArea,
}

impl fmt::Display for FallbackImageError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackImageError::PixelCountMismatch { expected, actual } => write!(
                formatter,
                "fallback image holds {actual} bytes, {expected} expected"
            ),
            FallbackImageError::EmptyArea => {
                write!(formatter, "fallback image must cover a non-empty page area")
            }
        }
    }
}

impl std::error::Error for FallbackImageError {}

/// Coarse whole-page rendering drawn while no tile set is ready.
#[derive(Debug, Clone)]
pub struct FallbackImage {
    area: PageRect,
    size: PixelSize,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl FallbackImage {
    pub fn new(
        area: PageRect,
        size: PixelSize,
        format: PixelFormat,
        pixels: Vec<u8>,
    ) -> Result<Self, FallbackImageError> {
        if !area.is_renderable() {
            return Err(FallbackImageError::EmptyArea);
        }
        let expected = format.byte_len(size);
        if pixels.len() != expected {
            return Err(FallbackImageError::PixelCountMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            area,
            size,
            format,
            pixels,
        })
    }

    pub fn area(&self) -> PageRect {
        self.area
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The part of this image showing `display_area`, in image pixel
    /// coordinates. May reach outside the image when the display area
    /// extends past the page.
    pub fn source_rect(&self, display_area: &PageRect) -> PageRect {
        let scale_x = self.size.width as f64 / self.area.width();
        let scale_y = self.size.height as f64 / self.area.height();
        PageRect::from_origin_size(
            (display_area.x0 - self.area.x0) * scale_x,
            (display_area.y0 - self.area.y0) * scale_y,
            display_area.width() * scale_x,
            display_area.height() * scale_y,
        )
    }

    /// Nearest-neighbour resample of `display_area` into a packed frame of
    /// `output` pixels. Samples outside the image come out transparent.
    pub fn sample(&self, display_area: &PageRect, output: PixelSize) -> Vec<u8> {
        let bpp = self.format.bytes_per_pixel();
        let mut frame = vec![0; self.format.byte_len(output)];
        if output.is_empty() || self.size.is_empty() {
            return frame;
        }
        let source = self.source_rect(display_area);
        let step_x = source.width() / output.width as f64;
        let step_y = source.height() / output.height as f64;
        let stride = self.size.width as usize * bpp;

        for y in 0..output.height as usize {
            let source_y = (source.y0 + (y as f64 + 0.5) * step_y).floor();
            if source_y < 0.0 || source_y >= self.size.height as f64 {
                continue;
            }
            for x in 0..output.width as usize {
                let source_x = (source.x0 + (x as f64 + 0.5) * step_x).floor();
                if source_x < 0.0 || source_x >= self.size.width as f64 {
                    continue;
                }
                let from = source_y as usize * stride + source_x as usize * bpp;
                let to = (y * output.width as usize + x) * bpp;
                frame[to..to + bpp].copy_from_slice(&self.pixels[from..from + bpp]);
            }
        }
        frame
    }
}
