//! Coordination between viewport changes, one long-running rasterizer and a
//! draw path that must never block.
//!
//! Two threads cooperate. The dispatcher turns render-requested notifications
//! into either a worker start (when idle) or an abort of the render in flight
//! (when a newer request supersedes it). The worker holds the render mutex for
//! as long as requests keep arriving, rendering only the newest one, and
//! publishes the tiles when nothing is queued anymore.

mod canvas;
mod dispatcher;
mod register;
mod state;
mod worker;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Sender, TrySendError, bounded};
use parking_lot::Mutex;
use render_protocol::{PixelFormat, RasterBackend, RasterError, RenderProgress, ViewportRequest};

pub use canvas::TileReadGuard;
pub use register::{RegisteredRequest, RequestRegister};
pub use state::RenderState;

use canvas::TileCanvas;
use dispatcher::{DispatcherStage, run_dispatcher};
use worker::{WorkerStage, run_worker};

const DISPOSE_ABORT_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderStartError {
    ZeroTileCount,
    EmptyThreadName,
    Spawn { stage: &'static str, message: String },
}

impl fmt::Display for RenderStartError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderStartError::ZeroTileCount => {
                write!(formatter, "raster backend must render at least one tile")
            }
            RenderStartError::EmptyThreadName => {
                write!(formatter, "render thread name must not be empty")
            }
            RenderStartError::Spawn { stage, message } => {
                write!(formatter, "failed to spawn render {stage} thread: {message}")
            }
        }
    }
}

impl std::error::Error for RenderStartError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRuntimeConfig {
    pub pixel_format: PixelFormat,
    /// Prefix for the dispatcher and worker thread names.
    pub thread_name: String,
}

impl Default for RenderRuntimeConfig {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Rgba,
            thread_name: "page_render".to_owned(),
        }
    }
}

pub type RedrawCallback = Box<dyn Fn() + Send + 'static>;
pub type ErrorCallback = Box<dyn Fn(&RasterError) + Send + 'static>;

/// Callbacks run on the worker thread after the render mutex is released.
pub struct RenderHooks {
    pub redraw: RedrawCallback,
    pub error: Option<ErrorCallback>,
}

impl RenderHooks {
    pub fn new(redraw: impl Fn() + Send + 'static) -> Self {
        Self {
            redraw: Box::new(redraw),
            error: None,
        }
    }

    pub fn with_error(mut self, on_error: impl Fn(&RasterError) + Send + 'static) -> Self {
        self.error = Some(Box::new(on_error));
        self
    }
}

/// Counters since start. Relaxed loads, good for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    pub notifications: u64,
    pub passes: u64,
    pub completed: u64,
    pub aborted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub published: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub(crate) notifications: AtomicU64,
    pub(crate) passes: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) aborted: AtomicU64,
    pub(crate) skipped: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) published: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> RenderStats {
        RenderStats {
            notifications: self.notifications.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct Shared {
    pub(crate) backend: Arc<dyn RasterBackend>,
    pub(crate) register: RequestRegister,
    pub(crate) state: Mutex<RenderState>,
    /// The render mutex.
    pub(crate) canvas: Mutex<TileCanvas>,
    pub(crate) last_error: Mutex<Option<RasterError>>,
    pub(crate) counters: StatCounters,
}

pub struct RenderRuntime {
    shared: Arc<Shared>,
    notify: Sender<()>,
    dispose: Option<Sender<()>>,
    dispatcher: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl RenderRuntime {
    pub fn start(
        backend: Arc<dyn RasterBackend>,
        config: RenderRuntimeConfig,
        hooks: RenderHooks,
    ) -> Result<Self, RenderStartError> {
        if backend.tile_count() == 0 {
            return Err(RenderStartError::ZeroTileCount);
        }
        if config.thread_name.is_empty() {
            return Err(RenderStartError::EmptyThreadName);
        }

        let shared = Arc::new(Shared {
            backend,
            register: RequestRegister::new(),
            state: Mutex::new(RenderState::Idle),
            canvas: Mutex::new(TileCanvas::new(config.pixel_format)),
            last_error: Mutex::new(None),
            counters: StatCounters::default(),
        });

        // Depth one: notifications arriving while one is pending collapse.
        let (notify_sender, notify_receiver) = bounded(1);
        let (start_sender, start_receiver) = bounded(0);
        let (started_sender, started_receiver) = bounded(0);
        let (dispose_sender, dispose_receiver) = bounded::<()>(0);

        let dispatcher_stage = DispatcherStage {
            shared: Arc::clone(&shared),
            notify: notify_receiver,
            start: start_sender,
            started: started_receiver,
            dispose: dispose_receiver.clone(),
        };
        let dispatcher = std::thread::Builder::new()
            .name(format!("{}_dispatch", config.thread_name))
            .spawn(move || run_dispatcher(dispatcher_stage))
            .map_err(|error| RenderStartError::Spawn {
                stage: "dispatcher",
                message: error.to_string(),
            })?;

        let worker_stage = WorkerStage {
            shared: Arc::clone(&shared),
            start: start_receiver,
            started: started_sender,
            dispose: dispose_receiver,
            hooks,
        };
        let worker = match std::thread::Builder::new()
            .name(format!("{}_worker", config.thread_name))
            .spawn(move || run_worker(worker_stage))
        {
            Ok(worker) => worker,
            Err(error) => {
                drop(dispose_sender);
                if dispatcher.join().is_err() {
                    log::error!("render dispatcher panicked during failed start");
                }
                return Err(RenderStartError::Spawn {
                    stage: "worker",
                    message: error.to_string(),
                });
            }
        };

        Ok(Self {
            shared,
            notify: notify_sender,
            dispose: Some(dispose_sender),
            dispatcher: Some(dispatcher),
            worker: Some(worker),
        })
    }

    /// Store `request` as the latest viewport and wake the dispatcher.
    /// Returns `false` once the runtime is disposed.
    pub fn request_render(&self, request: ViewportRequest) -> bool {
        if *self.shared.state.lock() == RenderState::Disposed {
            log::trace!("render requested after dispose, ignoring");
            return false;
        }
        let revision = self.shared.register.set(request);
        log::trace!("viewport revision {revision} stored");
        match self.notify.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        }
    }

    /// The published tiles, or `None` while a render holds them, none has
    /// finished yet or the runtime is disposed. Never blocks.
    pub fn try_read_tiles(&self) -> Option<TileReadGuard<'_>> {
        if *self.shared.state.lock() == RenderState::Disposed {
            return None;
        }
        canvas::try_read(&self.shared.canvas)
    }

    pub fn state(&self) -> RenderState {
        *self.shared.state.lock()
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == RenderState::Disposed
    }

    pub fn latest_request(&self) -> Option<RegisteredRequest> {
        self.shared.register.snapshot()
    }

    /// Most recent backend failure, cleared by the next published render.
    pub fn last_error(&self) -> Option<RasterError> {
        self.shared.last_error.lock().clone()
    }

    pub fn progress(&self) -> RenderProgress {
        self.shared.backend.progress()
    }

    pub fn stats(&self) -> RenderStats {
        self.shared.counters.snapshot()
    }

    /// Stop both stages and wait for them. Aborts a render in flight. Calling
    /// it again is a no-op.
    pub fn dispose(&mut self) {
        {
            let mut state = self.shared.state.lock();
            if *state == RenderState::Disposed {
                return;
            }
            *state = RenderState::Disposed;
        }
        self.shared.backend.abort();
        self.dispose.take();

        if let Some(dispatcher) = self.dispatcher.take()
            && dispatcher.join().is_err()
        {
            log::error!("render dispatcher panicked");
        }
        if let Some(worker) = self.worker.take() {
            // Backends may discard an abort that arrives before their render
            // begins, so keep aborting until the worker is gone.
            while !worker.is_finished() {
                self.shared.backend.abort();
                std::thread::park_timeout(DISPOSE_ABORT_INTERVAL);
            }
            if worker.join().is_err() {
                log::error!("render worker panicked");
            }
        }
        self.shared.canvas.lock().invalidate();
        log::info!("render runtime disposed");
    }
}

impl Drop for RenderRuntime {
    fn drop(&mut self) {
        self.dispose();
    }
}
