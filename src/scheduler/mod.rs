//! Single-threaded cooperative scheduling primitives.

mod clock;
mod frame_scheduler;
mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use frame_scheduler::{DueTask, FrameScheduler, TaskId};
pub use token::CancellationToken;
