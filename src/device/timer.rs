use embassy_time::Instant;

/// A cancellable one-shot deadline. Arming replaces any pending deadline, so
/// there is never more than one outstanding per handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerHandle {
    deadline: Option<Instant>,
}

impl TimerHandle {
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    #[inline]
    pub fn arm(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    #[inline]
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[inline]
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// If the deadline has passed, disarm and return it.
    pub fn fire(&mut self, now: Instant) -> Option<Instant> {
        match self.deadline {
            Some(at) if at <= now => self.deadline.take(),
            _ => None,
        }
    }
}
