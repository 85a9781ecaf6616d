use std::cell::Cell;
use std::rc::Rc;

/// Shared flag handed to every continuation scheduled for one chart.
///
/// The lifecycle manager flips it once, on entering `Disposing`; every clone
/// observes the change immediately and continuations bail out instead of
/// touching the torn-down instance.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.is_cancelled()
    }
}
