use std::sync::Arc;
use std::sync::atomic::Ordering;

use crossbeam_channel::{Receiver, Sender, select};
use model::TileLayout;
use render_protocol::{RasterError, RenderOutcome, ViewportRequest};

use crate::canvas::TileCanvas;
use crate::state::PassFollowUp;
use crate::{RenderHooks, RenderState, Shared};

/// Re-renders of the current request after an abort that found nothing
/// queued. Bounds the hold against backends whose abort outlives a render.
const MAX_LATE_ABORT_RETRIES: u32 = 1;

pub(crate) struct WorkerStage {
    pub(crate) shared: Arc<Shared>,
    pub(crate) start: Receiver<()>,
    pub(crate) started: Sender<()>,
    pub(crate) dispose: Receiver<()>,
    pub(crate) hooks: RenderHooks,
}

enum Pass {
    Completed(ViewportRequest),
    Skipped,
    Aborted,
    Unrenderable,
    Failed(RasterError),
}

enum Finish {
    Published,
    Unpublished,
    Disposed,
}

pub(crate) fn run_worker(stage: WorkerStage) {
    log::info!("render worker started");
    loop {
        select! {
            recv(stage.start) -> message => {
                if message.is_err() {
                    break;
                }
            }
            recv(stage.dispose) -> _ => break,
        }

        let mut canvas = stage.shared.canvas.lock();
        if is_disposed(&stage.shared) {
            log::debug!("disposed while waiting for the tile buffers");
            break;
        }
        canvas.invalidate();
        if stage.started.send(()).is_err() {
            break;
        }
        let (finish, failure) = render_coalesced(&stage.shared, &mut canvas);
        drop(canvas);

        if let (Some(error), Some(on_error)) = (failure.as_ref(), stage.hooks.error.as_ref()) {
            on_error(error);
        }
        match finish {
            Finish::Published => (stage.hooks.redraw)(),
            Finish::Unpublished => {}
            Finish::Disposed => break,
        }
    }
    log::info!("render worker stopped");
}

/// Render until no newer request is queued, all under one hold of the render
/// mutex. Returns how the section ended and the last backend failure in it.
fn render_coalesced(shared: &Shared, canvas: &mut TileCanvas) -> (Finish, Option<RasterError>) {
    let counters = &shared.counters;
    let mut completed: Option<ViewportRequest> = None;
    let mut failure = None;
    let mut late_retries = 0;

    loop {
        if is_disposed(shared) {
            return (Finish::Disposed, failure);
        }
        let pass = match shared.register.snapshot() {
            Some(snapshot) if completed == Some(snapshot.request) => {
                log::debug!(
                    "revision {} matches the finished render, skipping",
                    snapshot.revision
                );
                counters.skipped.fetch_add(1, Ordering::Relaxed);
                Pass::Skipped
            }
            Some(snapshot) => render_pass(shared, canvas, snapshot.request),
            None => Pass::Unrenderable,
        };

        let aborted = matches!(pass, Pass::Aborted);
        match pass {
            Pass::Completed(request) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                completed = Some(request);
            }
            Pass::Skipped => {}
            Pass::Aborted => {
                counters.aborted.fetch_add(1, Ordering::Relaxed);
                completed = None;
            }
            Pass::Unrenderable => completed = None,
            Pass::Failed(error) => {
                log::error!("page render failed: {error}");
                counters.failed.fetch_add(1, Ordering::Relaxed);
                *shared.last_error.lock() = Some(error.clone());
                failure = Some(error);
                completed = None;
            }
        }

        let retry_late_abort = late_retries < MAX_LATE_ABORT_RETRIES;
        match shared.state.lock().on_pass_finished(aborted, retry_late_abort) {
            PassFollowUp::RenderAgain => {
                late_retries = 0;
                continue;
            }
            PassFollowUp::RetryAborted => {
                log::debug!("abort landed on the current request, rendering it again");
                late_retries += 1;
                continue;
            }
            PassFollowUp::Exit => return (Finish::Disposed, failure),
            PassFollowUp::Finish => {}
        }
        if aborted {
            log::warn!("render kept aborting with nothing queued, tiles left unpublished");
        }

        let Some(request) = completed else {
            return (Finish::Unpublished, failure);
        };
        canvas.publish(request);
        shared.last_error.lock().take();
        counters.published.fetch_add(1, Ordering::Relaxed);
        return (Finish::Published, failure);
    }
}

fn render_pass(shared: &Shared, canvas: &mut TileCanvas, request: ViewportRequest) -> Pass {
    if !request.is_renderable() {
        log::warn!("ignoring unrenderable viewport {request:?}");
        return Pass::Unrenderable;
    }

    let layout = match canvas.tiles.layout() {
        Some(layout) if layout.target_size() == request.target_size => layout.clone(),
        _ => {
            let tile_count = u32::try_from(shared.backend.tile_count()).unwrap_or(u32::MAX);
            match TileLayout::new(request.target_size, tile_count) {
                Ok(layout) => layout,
                Err(error) => {
                    return Pass::Failed(RasterError::CannotRender {
                        message: error.to_string(),
                    });
                }
            }
        }
    };
    let update = canvas.tiles.ensure_layout(&layout);
    if !update.is_noop() {
        log::debug!(
            "tile buffers for {}x{}: {} reallocated, {} kept, {} released",
            request.target_size.width,
            request.target_size.height,
            update.reallocated,
            update.retained,
            update.released
        );
    }

    shared.counters.passes.fetch_add(1, Ordering::Relaxed);
    let format = canvas.tiles.format();
    let mut targets = canvas.tiles.targets_mut();
    match shared
        .backend
        .render(&layout, request.region, &mut targets, format)
    {
        Ok(RenderOutcome::Completed) => Pass::Completed(request),
        Ok(RenderOutcome::Aborted) => {
            log::trace!("render aborted");
            Pass::Aborted
        }
        Err(error) => Pass::Failed(error),
    }
}

fn is_disposed(shared: &Shared) -> bool {
    *shared.state.lock() == RenderState::Disposed
}
