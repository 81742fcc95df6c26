use std::ops::Deref;

use parking_lot::{Mutex, MutexGuard};
use render_protocol::{PixelFormat, ViewportRequest};
use tiles::TileBufferSet;

/// Everything guarded by the render mutex.
#[derive(Debug)]
pub(crate) struct TileCanvas {
    pub(crate) tiles: TileBufferSet,
    ready: bool,
    published: Option<ViewportRequest>,
    generation: u64,
}

impl TileCanvas {
    pub(crate) fn new(format: PixelFormat) -> Self {
        Self {
            tiles: TileBufferSet::new(format),
            ready: false,
            published: None,
            generation: 0,
        }
    }

    pub(crate) fn invalidate(&mut self) {
        self.ready = false;
    }

    pub(crate) fn publish(&mut self, request: ViewportRequest) {
        self.ready = true;
        self.published = Some(request);
        self.generation += 1;
    }
}

/// Read access to a finished tile set. Holding it keeps the worker from
/// starting another render, so drop it as soon as the frame is drawn.
pub struct TileReadGuard<'a> {
    canvas: MutexGuard<'a, TileCanvas>,
    request: ViewportRequest,
}

impl TileReadGuard<'_> {
    pub fn tiles(&self) -> &TileBufferSet {
        &self.canvas.tiles
    }

    /// The request these tiles were rendered for.
    pub fn request(&self) -> ViewportRequest {
        self.request
    }

    /// Number of tile sets published so far, this one included.
    pub fn generation(&self) -> u64 {
        self.canvas.generation
    }
}

impl Deref for TileReadGuard<'_> {
    type Target = TileBufferSet;

    fn deref(&self) -> &Self::Target {
        &self.canvas.tiles
    }
}

pub(crate) fn try_read(canvas: &Mutex<TileCanvas>) -> Option<TileReadGuard<'_>> {
    let canvas = canvas.try_lock()?;
    if !canvas.ready {
        return None;
    }
    let request = canvas.published?;
    Some(TileReadGuard { canvas, request })
}
