//! Opt-in tracing setup for embeddings of the overlay core.
//!
//! The crate only emits `tracing` events (`chart_id` and `group` fields on
//! every swallowed failure); installing a subscriber is left to the host.

/// Default filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "chart_overlay=info";

/// Installs a compact fmt subscriber honoring `RUST_LOG`.
///
/// Returns `false` when the `telemetry` feature is disabled or a global
/// subscriber is already installed.
#[must_use]
pub fn init_default_tracing() -> bool {
    init_tracing_with_filter(DEFAULT_FILTER)
}

/// Like [`init_default_tracing`] with an explicit fallback filter.
#[must_use]
pub fn init_tracing_with_filter(fallback: &str) -> bool {
    #[cfg(feature = "telemetry")]
    {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
            .is_ok()
    }

    #[cfg(not(feature = "telemetry"))]
    {
        let _ = fallback;
        false
    }
}
