use std::sync::Arc;
use std::sync::atomic::Ordering;

use crossbeam_channel::{Receiver, Sender, select};

use crate::Shared;
use crate::state::DispatchAction;

pub(crate) struct DispatcherStage {
    pub(crate) shared: Arc<Shared>,
    pub(crate) notify: Receiver<()>,
    pub(crate) start: Sender<()>,
    pub(crate) started: Receiver<()>,
    pub(crate) dispose: Receiver<()>,
}

/// Turns render-requested notifications into worker starts or aborts. Never
/// waits on a render, only on the handshake with an idle worker.
pub(crate) fn run_dispatcher(stage: DispatcherStage) {
    log::info!("render dispatcher started");
    loop {
        select! {
            recv(stage.notify) -> message => {
                if message.is_err() {
                    break;
                }
            }
            recv(stage.dispose) -> _ => break,
        }
        stage
            .shared
            .counters
            .notifications
            .fetch_add(1, Ordering::Relaxed);

        let action = stage.shared.state.lock().on_notify();
        match action {
            DispatchAction::StartWorker => {
                log::trace!("worker idle, starting render");
                // Busy means a reader holds it. The worker invalidates anyway.
                if let Some(mut canvas) = stage.shared.canvas.try_lock() {
                    canvas.invalidate();
                }
                select! {
                    send(stage.start, ()) -> sent => {
                        if sent.is_err() {
                            break;
                        }
                    }
                    recv(stage.dispose) -> _ => break,
                }
                select! {
                    recv(stage.started) -> started => {
                        if started.is_err() {
                            break;
                        }
                    }
                    recv(stage.dispose) -> _ => break,
                }
            }
            DispatchAction::AbortInFlight => {
                log::debug!("render in flight superseded, aborting");
                stage.shared.backend.abort();
            }
            DispatchAction::Nothing => {}
            DispatchAction::Exit => break,
        }
    }
    log::info!("render dispatcher stopped");
}
