//! Error type for workbench operations.

use crate::config::ConfigError;
use crate::runner::ModelBuildError;
use crate::store::StoreError;
use cadbench_export::ExportError;
use cadbench_kernel::ReturnStatus;
use cadbench_tessellate::TessellateError;
use thiserror::Error;

/// Errors surfaced at the workbench boundary.
#[derive(Error, Debug)]
pub enum WorkbenchError {
    /// A model was run before the geometry kernel was available.
    #[error("Geometry kernel is not initialised")]
    KernelNotReady,

    /// The geometry kernel could not be loaded.
    #[error("Kernel load failed: {0}")]
    KernelLoad(String),

    /// The model script could not be built into a shape.
    #[error(transparent)]
    ModelBuild(#[from] ModelBuildError),

    /// Meshing did not converge.
    #[error("Meshing failed: {0}")]
    MeshingFailed(String),

    /// The shape produced no triangles.
    #[error("No vertices extracted from shape")]
    NoVerticesExtracted,

    /// An export was requested without the data it needs.
    #[error("Export precondition failed: {0}")]
    ExportPrecondition(String),

    /// The STEP writer did not accept the shape.
    #[error("STEP transfer failed: {0:?}")]
    ExportTransferFailed(ReturnStatus),

    /// The STEP writer could not write the file.
    #[error("STEP write failed: {0:?}")]
    ExportWriteFailed(ReturnStatus),

    /// Session persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O while encoding or delivering an export.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TessellateError> for WorkbenchError {
    fn from(e: TessellateError) -> Self {
        match e {
            TessellateError::MeshingFailed(msg) => WorkbenchError::MeshingFailed(msg),
            TessellateError::NoVerticesExtracted => WorkbenchError::NoVerticesExtracted,
            TessellateError::Kernel(e) => WorkbenchError::MeshingFailed(e.to_string()),
        }
    }
}

impl From<ExportError> for WorkbenchError {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::Precondition(msg) => WorkbenchError::ExportPrecondition(msg),
            ExportError::TransferFailed(status) => WorkbenchError::ExportTransferFailed(status),
            ExportError::WriteFailed(status) => WorkbenchError::ExportWriteFailed(status),
            ExportError::MeshingUnavailable(msg) => WorkbenchError::MeshingFailed(msg),
            ExportError::Io(e) => WorkbenchError::Io(e),
            ExportError::Json(e) => WorkbenchError::Io(std::io::Error::other(e)),
        }
    }
}

/// Result type for workbench operations.
pub type Result<T> = std::result::Result<T, WorkbenchError>;
