use thiserror::Error;

use crate::core::ChartId;
use crate::host::HostError;
use crate::lifecycle::DisposalState;
use crate::sync::SyncGroupId;

pub type OverlayResult<T> = Result<T, OverlayError>;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid primitive `{id}`: {reason}")]
    InvalidPrimitive { id: String, reason: String },

    #[error("geometry unavailable: {0}")]
    GeometryUnavailable(String),

    #[error("chart {chart} did not find its container after {attempts} attempts")]
    MountTimeout { chart: ChartId, attempts: u32 },

    #[error("unknown chart {0}")]
    UnknownChart(ChartId),

    #[error("unknown sync group `{0}`")]
    UnknownGroup(SyncGroupId),

    #[error("invalid lifecycle transition for chart {chart}: {from:?} -> {to:?}")]
    InvalidTransition {
        chart: ChartId,
        from: DisposalState,
        to: DisposalState,
    },

    #[error(transparent)]
    Host(#[from] HostError),
}
