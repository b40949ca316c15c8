//! Delivery of export artifacts to the user.

use crate::error::Result;
use crate::ExportArtifact;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Destination for finished artifacts.
pub trait DownloadSink {
    /// Deliver `artifact`. Returns where it ended up.
    fn deliver(&self, artifact: &ExportArtifact) -> Result<PathBuf>;
}

/// Saves artifacts into a downloads directory.
///
/// Bytes go to a transient file in the target directory first, which is
/// then renamed into place. Existing files are never overwritten: a taken
/// name gets a ` (1)`, ` (2)`, ... suffix before the extension.
#[derive(Debug, Clone)]
pub struct FileDownloads {
    dir: PathBuf,
}

impl FileDownloads {
    /// Deliver into `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The downloads directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// `name (n).ext` for `n > 0`, the plain name for `n == 0`.
fn numbered(filename: &str, n: usize) -> String {
    if n == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{filename} ({n})"),
    }
}

/// Strip directory components so a filename cannot escape the target dir.
fn sanitize(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    if base.is_empty() || base == ".." {
        "download".into()
    } else {
        base.to_string()
    }
}

impl DownloadSink for FileDownloads {
    fn deliver(&self, artifact: &ExportArtifact) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let mut transient = tempfile::Builder::new()
            .prefix(".cadbench-download-")
            .tempfile_in(&self.dir)?;
        transient.write_all(&artifact.bytes)?;
        transient.flush()?;

        let filename = sanitize(&artifact.filename);
        let mut n = 0;
        loop {
            let target = self.dir.join(numbered(&filename, n));
            match transient.persist_noclobber(&target) {
                Ok(_) => {
                    tracing::info!(
                        path = %target.display(),
                        bytes = artifact.bytes.len(),
                        mime = artifact.mime,
                        "artifact delivered"
                    );
                    return Ok(target);
                }
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    transient = e.file;
                    n += 1;
                }
                Err(e) => return Err(e.error.into()),
            }
        }
    }
}
