//! Error types for export operations.

use cadbench_kernel::ReturnStatus;
use thiserror::Error;

/// Errors that can occur while exporting.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The exporter was called without the shape or geometry it needs.
    #[error("Missing input: {0}")]
    Precondition(String),

    /// The kernel refused to transfer the shape into the STEP model.
    #[error("STEP transfer failed ({0:?})")]
    TransferFailed(ReturnStatus),

    /// The kernel could not write the STEP file.
    #[error("STEP write failed ({0:?})")]
    WriteFailed(ReturnStatus),

    /// A mesh format was requested and the shape could not be meshed.
    #[error("Meshing unavailable: {0}")]
    MeshingUnavailable(String),

    /// Reading back or delivering the artifact failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// glTF document encoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;
