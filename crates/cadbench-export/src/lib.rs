#![warn(missing_docs)]

//! Scene export for cadbench.
//!
//! STEP is written from the B-rep shape through the kernel's writer. STL
//! and glTF/GLB are encoded from a [`TriangleMesh`] wrapped in a
//! [`ShadedMesh`]. Every exporter returns an [`ExportArtifact`] that a
//! [`DownloadSink`] can deliver.

pub mod download;
pub mod error;
pub mod gltf;
pub mod shaded;
pub mod step;
pub mod stl;

pub use download::{DownloadSink, FileDownloads};
pub use error::{ExportError, Result};
pub use shaded::{ShadedMaterial, ShadedMesh};

use cadbench_kernel::{Kernel, ShapeId};
use cadbench_tessellate::{tessellate, MeshParams, TriangleMesh};
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

/// MIME type of STEP files.
pub const MIME_STEP: &str = "application/step";
/// MIME type of binary STL files.
pub const MIME_STL: &str = "model/stl";
/// MIME type of ASCII STL files.
pub const MIME_TEXT: &str = "text/plain";
/// MIME type of `.gltf` files.
pub const MIME_GLTF: &str = "model/gltf+json";
/// MIME type of `.glb` files.
pub const MIME_GLB: &str = "model/gltf-binary";

/// An encoded file ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    /// File contents.
    pub bytes: Vec<u8>,
    /// MIME type.
    pub mime: &'static str,
    /// Suggested file name.
    pub filename: String,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// ISO 10303-21 B-rep.
    Step,
    /// STL, binary or ASCII.
    Stl {
        /// Emit ASCII text instead of the binary layout.
        ascii: bool,
    },
    /// glTF 2.0 JSON with an embedded buffer.
    Gltf,
    /// Binary glTF.
    Glb,
}

impl ExportFormat {
    /// Pick a format from a file extension (`.step`/`.stp`, `.stl`,
    /// `.gltf`, `.glb`). `ascii` applies to STL only.
    pub fn from_path(path: &Path, ascii: bool) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "step" | "stp" => Some(ExportFormat::Step),
            "stl" => Some(ExportFormat::Stl { ascii }),
            "gltf" => Some(ExportFormat::Gltf),
            "glb" => Some(ExportFormat::Glb),
            _ => None,
        }
    }

    /// MIME type of the produced artifact.
    pub fn mime(&self) -> &'static str {
        match self {
            ExportFormat::Step => MIME_STEP,
            ExportFormat::Stl { ascii: false } => MIME_STL,
            ExportFormat::Stl { ascii: true } => MIME_TEXT,
            ExportFormat::Gltf => MIME_GLTF,
            ExportFormat::Glb => MIME_GLB,
        }
    }

    /// Whether the format is encoded from triangles rather than the B-rep.
    pub fn needs_mesh(&self) -> bool {
        !matches!(self, ExportFormat::Step)
    }
}

/// Everything an export may draw on. Either input may be missing.
#[derive(Clone, Copy)]
pub struct ExportInput<'a> {
    /// Kernel owning `shape`.
    pub kernel: &'a Kernel,
    /// The B-rep shape, needed for STEP.
    pub shape: Option<ShapeId>,
    /// The current mesh, used by the mesh formats.
    pub mesh: Option<&'a TriangleMesh>,
    /// Material for the mesh formats.
    pub material: Option<&'a ShadedMaterial>,
    /// Tolerances for meshing `shape` when `mesh` is missing.
    pub mesh_params: MeshParams,
}

impl<'a> ExportInput<'a> {
    /// Input with nothing but a kernel.
    pub fn new(kernel: &'a Kernel) -> Self {
        Self {
            kernel,
            shape: None,
            mesh: None,
            material: None,
            mesh_params: MeshParams::default(),
        }
    }

    /// Set the shape.
    pub fn with_shape(mut self, shape: ShapeId) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Set the mesh.
    pub fn with_mesh(mut self, mesh: &'a TriangleMesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// Set the material.
    pub fn with_material(mut self, material: &'a ShadedMaterial) -> Self {
        self.material = Some(material);
        self
    }
}

/// Export in `format`. Mesh formats mesh `shape` on demand when no mesh is given.
pub fn export(format: ExportFormat, input: &ExportInput<'_>, filename: &str) -> Result<ExportArtifact> {
    let _span = tracing::info_span!("export", ?format, filename).entered();
    if !format.needs_mesh() {
        return export_step(input.kernel, input.shape, filename);
    }

    let mesh: Cow<'_, TriangleMesh> = match (input.mesh, input.shape) {
        (Some(mesh), _) => Cow::Borrowed(mesh),
        (None, Some(shape)) => Cow::Owned(
            tessellate(input.kernel, shape, &input.mesh_params)
                .map_err(|e| ExportError::MeshingUnavailable(e.to_string()))?,
        ),
        (None, None) => return Err(ExportError::Precondition("missing shape/geometry".into())),
    };
    let material = input.material.cloned().unwrap_or_default();
    match format {
        ExportFormat::Stl { ascii } => export_stl(Some(&mesh), &material, filename, !ascii),
        ExportFormat::Gltf => export_gltf(Some(&mesh), &material, filename, false),
        _ => export_gltf(Some(&mesh), &material, filename, true),
    }
}

/// Export the B-rep shape as STEP.
pub fn export_step(kernel: &Kernel, shape: Option<ShapeId>, filename: &str) -> Result<ExportArtifact> {
    let shape = shape.ok_or_else(|| ExportError::Precondition("missing shape".into()))?;
    let bytes = step::export_step_bytes(kernel, shape, filename)?;
    tracing::info!(filename, bytes = bytes.len(), "STEP exported");
    Ok(ExportArtifact {
        bytes,
        mime: MIME_STEP,
        filename: filename.to_string(),
    })
}

fn require_geometry(mesh: Option<&TriangleMesh>) -> Result<&TriangleMesh> {
    match mesh {
        Some(mesh) if !mesh.is_empty() => Ok(mesh),
        _ => Err(ExportError::Precondition("missing geometry".into())),
    }
}

/// Export triangles as STL, binary unless `binary` is false.
pub fn export_stl(
    mesh: Option<&TriangleMesh>,
    material: &ShadedMaterial,
    filename: &str,
    binary: bool,
) -> Result<ExportArtifact> {
    let geometry = require_geometry(mesh)?;
    let shaded = ShadedMesh::new(geometry).with_material(material.clone());
    let (bytes, mime) = if binary {
        (stl::encode_binary(&shaded), MIME_STL)
    } else {
        (stl::encode_ascii(&shaded).into_bytes(), MIME_TEXT)
    };
    tracing::info!(filename, binary, triangles = geometry.num_triangles(), "STL exported");
    Ok(ExportArtifact {
        bytes,
        mime,
        filename: filename.to_string(),
    })
}

/// Export triangles as glTF. Binary mode writes GLB and renames the file to `.glb`.
pub fn export_gltf(
    mesh: Option<&TriangleMesh>,
    material: &ShadedMaterial,
    filename: &str,
    binary: bool,
) -> Result<ExportArtifact> {
    let geometry = require_geometry(mesh)?;
    let shaded = ShadedMesh::new(geometry).with_material(material.clone());
    let artifact = if binary {
        ExportArtifact {
            bytes: gltf::encode_glb(&shaded)?,
            mime: MIME_GLB,
            filename: with_extension(filename, "glb"),
        }
    } else {
        ExportArtifact {
            bytes: gltf::encode_gltf(&shaded)?,
            mime: MIME_GLTF,
            filename: filename.to_string(),
        }
    };
    tracing::info!(filename = %artifact.filename, bytes = artifact.bytes.len(), "glTF exported");
    Ok(artifact)
}

/// [`export_gltf`] on the blocking thread pool.
pub async fn export_gltf_async(
    mesh: Option<Arc<TriangleMesh>>,
    material: ShadedMaterial,
    filename: String,
    binary: bool,
) -> Result<ExportArtifact> {
    tokio::task::spawn_blocking(move || export_gltf(mesh.as_deref(), &material, &filename, binary))
        .await
        .map_err(|e| ExportError::Io(std::io::Error::other(e)))?
}

/// Replace (or add) the extension of a file name.
fn with_extension(filename: &str, ext: &str) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    };
    format!("{stem}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_mesh(kernel: &Kernel) -> (ShapeId, TriangleMesh) {
        let face = kernel.make_plane_face(10.0, 5.0).unwrap();
        let mesh = tessellate(kernel, face, &MeshParams::default()).unwrap();
        (face, mesh)
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ExportFormat::from_path(Path::new("a.STP"), false),
            Some(ExportFormat::Step)
        );
        assert_eq!(
            ExportFormat::from_path(Path::new("a.stl"), true),
            Some(ExportFormat::Stl { ascii: true })
        );
        assert_eq!(ExportFormat::from_path(Path::new("a.obj"), false), None);
        assert_eq!(ExportFormat::from_path(Path::new("noext"), false), None);
        assert_eq!(ExportFormat::Glb.mime(), "model/gltf-binary");
    }

    #[test]
    fn test_binary_stl_size() {
        let kernel = Kernel::new();
        let cube = kernel.make_box(1.0, 1.0, 1.0).unwrap();
        let mesh = tessellate(&kernel, cube, &MeshParams::default()).unwrap();
        let n = mesh.num_triangles();
        let artifact = export_stl(Some(&mesh), &ShadedMaterial::default(), "cube.stl", true).unwrap();
        assert_eq!(artifact.mime, "model/stl");
        assert_eq!(artifact.bytes.len(), 80 + 4 + 50 * n);
        let count = u32::from_le_bytes(artifact.bytes[80..84].try_into().unwrap());
        assert_eq!(count as usize, n);
    }

    #[test]
    fn test_ascii_stl_of_single_face() {
        let kernel = Kernel::new();
        let (_, mesh) = scenario_mesh(&kernel);
        let artifact = export_stl(Some(&mesh), &ShadedMaterial::default(), "face.stl", false).unwrap();
        assert_eq!(artifact.mime, "text/plain");
        let text = String::from_utf8(artifact.bytes).unwrap();
        assert_eq!(text.matches("facet normal").count(), 2);
    }

    #[test]
    fn test_missing_inputs_are_preconditions() {
        let kernel = Kernel::new();
        let material = ShadedMaterial::default();
        assert!(matches!(
            export_stl(None, &material, "x.stl", true),
            Err(ExportError::Precondition(_))
        ));
        assert!(matches!(
            export_gltf(Some(&TriangleMesh::new()), &material, "x.gltf", false),
            Err(ExportError::Precondition(_))
        ));
        assert!(matches!(
            export_step(&kernel, None, "x.step"),
            Err(ExportError::Precondition(_))
        ));
        let input = ExportInput::new(&kernel);
        assert!(matches!(
            export(ExportFormat::Glb, &input, "x.glb"),
            Err(ExportError::Precondition(_))
        ));
    }

    #[test]
    fn test_glb_forces_extension() {
        let kernel = Kernel::new();
        let (_, mesh) = scenario_mesh(&kernel);
        let material = ShadedMaterial::default();
        let artifact = export_gltf(Some(&mesh), &material, "scene.gltf", true).unwrap();
        assert_eq!(artifact.filename, "scene.glb");
        assert_eq!(artifact.mime, "model/gltf-binary");
        assert_eq!(&artifact.bytes[0..4], b"glTF");

        let artifact = export_gltf(Some(&mesh), &material, "scene", true).unwrap();
        assert_eq!(artifact.filename, "scene.glb");

        let artifact = export_gltf(Some(&mesh), &material, "scene.gltf", false).unwrap();
        assert_eq!(artifact.filename, "scene.gltf");
        assert_eq!(artifact.mime, "model/gltf+json");
    }

    #[test]
    fn test_dispatch_meshes_shape_on_demand() {
        let kernel = Kernel::new();
        let (face, _) = scenario_mesh(&kernel);
        let input = ExportInput::new(&kernel).with_shape(face);
        let artifact = export(ExportFormat::Stl { ascii: false }, &input, "face.stl").unwrap();
        assert_eq!(artifact.bytes.len(), 84 + 2 * 50);

        let artifact = export(ExportFormat::Step, &input, "face.step").unwrap();
        assert_eq!(artifact.mime, "application/step");
    }

    #[test]
    fn test_dispatch_reports_meshing_unavailable() {
        let kernel = Kernel::new();
        let face = kernel.make_plane_face(1.0, 1.0).unwrap();
        let tiny = kernel.scale(face, 1e-9, 1e-9, 1e-9).unwrap();
        let input = ExportInput::new(&kernel).with_shape(tiny);
        assert!(matches!(
            export(ExportFormat::Gltf, &input, "tiny.gltf"),
            Err(ExportError::MeshingUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_gltf_async() {
        let kernel = Kernel::new();
        let (_, mesh) = scenario_mesh(&kernel);
        let artifact = export_gltf_async(
            Some(Arc::new(mesh)),
            ShadedMaterial::default(),
            "part.gltf".into(),
            true,
        )
        .await
        .unwrap();
        assert_eq!(artifact.filename, "part.glb");

        let missing = export_gltf_async(None, ShadedMaterial::default(), "part.gltf".into(), false).await;
        assert!(matches!(missing, Err(ExportError::Precondition(_))));
    }
}
