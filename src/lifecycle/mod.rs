//! Mount retries, resize debouncing and disposal of chart instances.

mod debounce;
mod manager;
mod mount;
mod state;

pub use debounce::{ResizeDebouncer, ResizeFlush};
pub use manager::{LifecycleManager, MountRetry};
pub use mount::MountPolicy;
pub use state::DisposalState;
