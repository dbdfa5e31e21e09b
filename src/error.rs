// Error taxonomy for the management surface
//
// Generation failures never cross this boundary: the turn loop converts them
// into broadcast error events and fail-streak accounting. Unreachable
// subscribers are pruned silently by the broadcast hub.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidArgument(String),
}
