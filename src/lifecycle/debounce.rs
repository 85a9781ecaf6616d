use std::time::Duration;

use crate::core::Viewport;

/// Result of a debounced burst of resize notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeFlush {
    /// Last size reported during the burst, if any notification carried one.
    pub size: Option<Viewport>,
    pub notifications: u32,
}

/// Trailing-edge debouncer with a maximum wait.
///
/// Each notification pushes the deadline to `now + window`, but never past
/// `burst_start + max_wait`, so continuous resizing still flushes regularly.
#[derive(Debug, Clone)]
pub struct ResizeDebouncer {
    window: Duration,
    max_wait: Duration,
    burst_start: Option<Duration>,
    deadline: Option<Duration>,
    pending_size: Option<Viewport>,
    notifications: u32,
    flushes: u64,
}

impl ResizeDebouncer {
    #[must_use]
    pub fn new(window: Duration, max_wait: Duration) -> Self {
        Self {
            window,
            max_wait: max_wait.max(window),
            burst_start: None,
            deadline: None,
            pending_size: None,
            notifications: 0,
            flushes: 0,
        }
    }

    /// Records one notification and returns the flush deadline.
    pub fn record(&mut self, now: Duration, size: Option<Viewport>) -> Duration {
        let start = *self.burst_start.get_or_insert(now);
        let deadline = (now + self.window).min(start + self.max_wait);
        self.deadline = Some(deadline);
        if size.is_some() {
            self.pending_size = size;
        }
        self.notifications = self.notifications.saturating_add(1);
        deadline
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Ends the burst if its deadline has passed.
    pub fn flush(&mut self, now: Duration) -> Option<ResizeFlush> {
        if self.deadline.is_none_or(|deadline| now < deadline) {
            return None;
        }
        let flush = ResizeFlush {
            size: self.pending_size.take(),
            notifications: self.notifications,
        };
        self.reset();
        self.flushes = self.flushes.saturating_add(1);
        Some(flush)
    }

    pub fn reset(&mut self) {
        self.burst_start = None;
        self.deadline = None;
        self.pending_size = None;
        self.notifications = 0;
    }
}
