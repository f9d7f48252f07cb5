use thiserror::Error;

use crate::buffer::BufferFullError;

/// Errors surfaced by the envelope transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Admission failed: the send buffer is already at capacity. The
    /// envelope was dropped without any network activity.
    #[error(transparent)]
    BufferFull(#[from] BufferFullError),

    /// The outbound call failed at the network level. Reaches the
    /// originating caller through its [`crate::http::PendingSend`];
    /// absorbed when it occurs inside a drain sweep.
    #[error("envelope send failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The send task was destroyed before it produced an outcome
    /// (the owning transport was dropped with the send still pending).
    #[error("send task dropped before completion")]
    Abandoned,
}
