use parking_lot::Mutex;
use render_protocol::ViewportRequest;

/// A request together with the revision it was stored under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisteredRequest {
    pub request: ViewportRequest,
    pub revision: u64,
}

/// Latest-value slot for the viewport the host wants rendered.
///
/// Writers overwrite, readers copy. The lock is only held for the copy, never
/// across a render.
#[derive(Debug, Default)]
pub struct RequestRegister {
    slot: Mutex<Option<RegisteredRequest>>,
}

impl RequestRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored request and return its revision. Revisions start at
    /// 1 and increase with every call, even for an identical request.
    pub fn set(&self, request: ViewportRequest) -> u64 {
        let mut slot = self.slot.lock();
        let revision = slot.map_or(1, |current| current.revision + 1);
        *slot = Some(RegisteredRequest { request, revision });
        revision
    }

    pub fn snapshot(&self) -> Option<RegisteredRequest> {
        *self.slot.lock()
    }
}

#[cfg(test)]
mod tests {
    use model::{PageRect, PixelSize};

    use super::*;

    fn request(x: f64) -> ViewportRequest {
        ViewportRequest::new(PixelSize::new(8, 8), PageRect::new(x, 0.0, x + 8.0, 8.0))
    }

    #[test]
    fn empty_register_has_no_snapshot() {
        assert_eq!(RequestRegister::new().snapshot(), None);
    }

    #[test]
    fn set_overwrites_and_bumps_revision() {
        let register = RequestRegister::new();
        assert_eq!(register.set(request(1.0)), 1);
        assert_eq!(register.set(request(2.0)), 2);
        assert_eq!(register.set(request(2.0)), 3);

        let snapshot = register.snapshot().expect("snapshot");
        assert_eq!(snapshot.request, request(2.0));
        assert_eq!(snapshot.revision, 3);
    }
}
