//! Error types for kernel operations.

use thiserror::Error;

/// Errors reported by the kernel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    /// A constructor or transform received an out-of-range parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The shape handle does not refer to a live shape.
    #[error("Unknown shape handle")]
    UnknownShape,

    /// The kernel does not implement this operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Incremental meshing could not reach the requested tolerances.
    #[error("Meshing did not converge: {0}")]
    MeshingFailed(String),

    /// Virtual filesystem lookup failed.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Kernel assets could not be loaded.
    #[error("Kernel load failed: {0}")]
    Load(String),
}

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
