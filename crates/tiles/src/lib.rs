mod fallback;

use std::fmt;

use model::{PixelRect, PixelSize, TileDescriptor, TileLayout};
use render_protocol::{PixelFormat, TileTarget};

pub use fallback::{FallbackImage, FallbackImageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileComposeError {
    FrameTooSmall { required: usize, actual: usize },
    TileOutsideFrame { index: usize },
}

impl fmt::Display for TileComposeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileComposeError::FrameTooSmall { required, actual } => write!(
                formatter,
                "frame buffer holds {actual} bytes, {required} required"
            ),
            TileComposeError::TileOutsideFrame { index } => {
                write!(formatter, "tile {index} lies outside the frame")
            }
        }
    }
}

impl std::error::Error for TileComposeError {}

/// Pixel memory for one tile, sized to its descriptor.
#[derive(Debug)]
pub struct TileBuffer {
    descriptor: TileDescriptor,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl TileBuffer {
    pub fn new(descriptor: TileDescriptor, format: PixelFormat) -> Self {
        Self {
            descriptor,
            format,
            pixels: vec![0; format.byte_len(descriptor.bounds.size())],
        }
    }

    pub fn descriptor(&self) -> TileDescriptor {
        self.descriptor
    }

    pub fn bounds(&self) -> PixelRect {
        self.descriptor.bounds
    }

    pub fn size(&self) -> PixelSize {
        self.descriptor.bounds.size()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn stride(&self) -> usize {
        self.size().width as usize * self.format.bytes_per_pixel()
    }

    /// Straight RGBA of the pixel at tile-local coordinates.
    pub fn pixel_rgba(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let size = self.size();
        if x >= size.width || y >= size.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.stride() + x as usize * bpp;
        Some(self.format.decode(&self.pixels[offset..offset + bpp]))
    }
}

/// Summary of one [`TileBufferSet::ensure_layout`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutUpdate {
    pub reallocated: usize,
    pub retained: usize,
    pub released: usize,
}

impl LayoutUpdate {
    pub fn is_noop(&self) -> bool {
        self.reallocated == 0 && self.released == 0
    }
}

/// The tile buffers one render writes into.
///
/// Buffers are only reallocated when the pixel size of their tile changes; a
/// pan or zoom that keeps the target size reuses every allocation.
#[derive(Debug)]
pub struct TileBufferSet {
    format: PixelFormat,
    layout: Option<TileLayout>,
    buffers: Vec<TileBuffer>,
}

impl TileBufferSet {
    pub fn new(format: PixelFormat) -> Self {
        Self {
            format,
            layout: None,
            buffers: Vec::new(),
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn layout(&self) -> Option<&TileLayout> {
        self.layout.as_ref()
    }

    pub fn target_size(&self) -> Option<PixelSize> {
        self.layout.as_ref().map(TileLayout::target_size)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffers(&self) -> &[TileBuffer] {
        &self.buffers
    }

    pub fn buffer(&self, index: usize) -> Option<&TileBuffer> {
        self.buffers.get(index)
    }

    pub fn ensure_layout(&mut self, layout: &TileLayout) -> LayoutUpdate {
        if self.layout.as_ref() == Some(layout) {
            return LayoutUpdate {
                retained: self.buffers.len(),
                ..LayoutUpdate::default()
            };
        }

        let mut update = LayoutUpdate::default();
        if self.buffers.len() > layout.len() {
            update.released = self.buffers.len() - layout.len();
            self.buffers.truncate(layout.len());
        }
        for descriptor in layout.tiles() {
            match self.buffers.get_mut(descriptor.index) {
                Some(buffer) if buffer.size() == descriptor.bounds.size() => {
                    buffer.descriptor = *descriptor;
                    update.retained += 1;
                }
                Some(buffer) => {
                    *buffer = TileBuffer::new(*descriptor, self.format);
                    update.reallocated += 1;
                }
                None => {
                    self.buffers.push(TileBuffer::new(*descriptor, self.format));
                    update.reallocated += 1;
                }
            }
        }
        self.layout = Some(layout.clone());
        update
    }

    /// Mutable destinations for a backend render, in tile order.
    pub fn targets_mut(&mut self) -> Vec<TileTarget<'_>> {
        self.buffers
            .iter_mut()
            .map(|buffer| TileTarget {
                bounds: buffer.descriptor.bounds,
                pixels: buffer.pixels.as_mut_slice(),
            })
            .collect()
    }

    /// Copy every tile into a packed frame of the layout's target size.
    pub fn compose_into(&self, frame: &mut [u8]) -> Result<(), TileComposeError> {
        let Some(target_size) = self.target_size() else {
            return Ok(());
        };
        let bpp = self.format.bytes_per_pixel();
        let required = self.format.byte_len(target_size);
        if frame.len() < required {
            return Err(TileComposeError::FrameTooSmall {
                required,
                actual: frame.len(),
            });
        }
        let frame_stride = target_size.width as usize * bpp;
        for buffer in &self.buffers {
            let bounds = buffer.bounds();
            if bounds.x0 < 0
                || bounds.y0 < 0
                || bounds.x1 as u32 > target_size.width
                || bounds.y1 as u32 > target_size.height
            {
                return Err(TileComposeError::TileOutsideFrame {
                    index: buffer.descriptor.index,
                });
            }
            let row_len = buffer.stride();
            if row_len == 0 {
                continue;
            }
            for (row, source) in buffer.pixels.chunks_exact(row_len).enumerate() {
                let start = (bounds.y0 as usize + row) * frame_stride + bounds.x0 as usize * bpp;
                frame[start..start + row_len].copy_from_slice(source);
            }
        }
        Ok(())
    }

    pub fn compose(&self) -> Result<Vec<u8>, TileComposeError> {
        let size = self.target_size().unwrap_or(PixelSize::new(0, 0));
        let mut frame = vec![0; self.format.byte_len(size)];
        self.compose_into(&mut frame)?;
        Ok(frame)
    }
}
