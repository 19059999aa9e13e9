/// Identifies one requested scheduling opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickHandle(u64);

impl TickHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Source of scheduling opportunities for the playback controller.
///
/// Implementations may be backed by an event-loop timer, a frame subscription
/// or a test-controlled clock. At most one request is outstanding at a time;
/// requesting again replaces the previous one.
pub trait TickScheduler {
    fn request_tick(&mut self) -> TickHandle;
    fn cancel_tick(&mut self, handle: TickHandle);
}

/// Host-polled scheduler. The host calls [`FrameScheduler::take_due`] once per
/// frame and forwards the handle it receives to the controller.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    next_id: u64,
    pending: Option<TickHandle>,
    requested: u64,
    cancelled: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Yields the outstanding request, clearing it.
    pub fn take_due(&mut self) -> Option<TickHandle> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn requested(&self) -> u64 {
        self.requested
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled
    }
}

impl TickScheduler for FrameScheduler {
    fn request_tick(&mut self) -> TickHandle {
        let handle = TickHandle(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.requested += 1;
        self.pending = Some(handle);
        handle
    }

    fn cancel_tick(&mut self, handle: TickHandle) {
        if self.pending == Some(handle) {
            self.pending = None;
            self.cancelled += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_handle_is_yielded_once() {
        let mut sched = FrameScheduler::new();
        let handle = sched.request_tick();
        assert_eq!(sched.take_due(), Some(handle));
        assert_eq!(sched.take_due(), None);
    }

    #[test]
    fn cancelled_handle_never_fires() {
        let mut sched = FrameScheduler::new();
        let handle = sched.request_tick();
        sched.cancel_tick(handle);
        assert!(!sched.is_pending());
        assert_eq!(sched.take_due(), None);
        assert_eq!(sched.cancelled(), 1);
    }

    #[test]
    fn new_request_replaces_previous_one() {
        let mut sched = FrameScheduler::new();
        let first = sched.request_tick();
        let second = sched.request_tick();
        assert_ne!(first, second);
        sched.cancel_tick(first);
        assert_eq!(sched.take_due(), Some(second));
        assert_eq!(sched.requested(), 2);
    }
}
