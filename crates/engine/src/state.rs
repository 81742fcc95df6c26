/// Coordination state shared by the dispatcher and the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderState {
    /// No render in flight; the next notification starts one.
    #[default]
    Idle,
    /// The worker owns the tile buffers and is rendering.
    Rendering,
    /// A newer request arrived while rendering. The worker renders again
    /// before letting go of the tile buffers.
    Queued,
    /// Terminal.
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchAction {
    StartWorker,
    AbortInFlight,
    Nothing,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassFollowUp {
    RenderAgain,
    RetryAborted,
    Finish,
    Exit,
}

impl RenderState {
    /// Transition for one render-requested notification.
    pub(crate) fn on_notify(&mut self) -> DispatchAction {
        match *self {
            RenderState::Idle => {
                *self = RenderState::Rendering;
                DispatchAction::StartWorker
            }
            RenderState::Rendering => {
                *self = RenderState::Queued;
                DispatchAction::AbortInFlight
            }
            RenderState::Queued => DispatchAction::Nothing,
            RenderState::Disposed => DispatchAction::Exit,
        }
    }

    /// Transition after the worker finished one pass.
    ///
    /// An aborted pass with nothing queued means the abort was meant for an
    /// earlier pass and landed late. The current request is rendered again
    /// when `retry_late_abort` allows it, otherwise the hold ends unpublished.
    pub(crate) fn on_pass_finished(
        &mut self,
        aborted: bool,
        retry_late_abort: bool,
    ) -> PassFollowUp {
        match *self {
            RenderState::Queued => {
                *self = RenderState::Rendering;
                PassFollowUp::RenderAgain
            }
            RenderState::Rendering if aborted && retry_late_abort => {
                PassFollowUp::RetryAborted
            }
            RenderState::Rendering | RenderState::Idle => {
                *self = RenderState::Idle;
                PassFollowUp::Finish
            }
            RenderState::Disposed => PassFollowUp::Exit,
        }
    }
}
