//! STEP export through the kernel's writer and virtual filesystem.

use crate::error::{ExportError, Result};
use cadbench_kernel::{Kernel, ReturnStatus, ShapeId, StepModelType};

/// Write `shape` with the kernel STEP writer and return the file bytes.
///
/// The file passes through the kernel VFS under `filename`. Any stale file
/// of that name is removed first and the written file is removed after it
/// has been read back. Concurrent exports on one kernel run one at a time.
pub fn export_step_bytes(kernel: &Kernel, shape: ShapeId, filename: &str) -> Result<Vec<u8>> {
    let _files = kernel.lock_step_files();
    if kernel.fs().unlink(filename) {
        tracing::debug!(filename, "removed stale STEP file");
    }

    let mut writer = kernel.step_writer();
    let status = writer.transfer(shape, StepModelType::AsIs);
    if status != ReturnStatus::Done {
        return Err(ExportError::TransferFailed(status));
    }
    let status = writer.write(filename);
    if status != ReturnStatus::Done {
        return Err(ExportError::WriteFailed(status));
    }

    let bytes = kernel.fs().read_file(filename).map_err(|e| {
        ExportError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()))
    });
    kernel.fs().unlink(filename);
    bytes
}
