#![warn(missing_docs)]

//! Shape to triangle mesh conversion for cadbench.
//!
//! Meshes a kernel shape with the kernel's incremental mesher, then walks
//! its faces and flattens each face triangulation into world-space buffers:
//! 1. Transform face nodes by the face location
//! 2. Flip the winding of reversed faces
//! 3. Store one flat normal per emitted vertex
//!
//! Faces keep disjoint vertex blocks; nothing is welded across faces.

use cadbench_kernel::{Face, Kernel, KernelError, Point3, ShapeId, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while tessellating a shape.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TessellateError {
    /// The kernel mesher could not reach the requested tolerances.
    #[error("Meshing failed: {0}")]
    MeshingFailed(String),

    /// No face of the shape produced any geometry.
    #[error("No vertices extracted from shape")]
    NoVerticesExtracted,

    /// Any other kernel failure, such as a released handle.
    #[error(transparent)]
    Kernel(KernelError),
}

impl From<KernelError> for TessellateError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::MeshingFailed(msg) => TessellateError::MeshingFailed(msg),
            other => TessellateError::Kernel(other),
        }
    }
}

/// Result type for tessellation.
pub type Result<T> = std::result::Result<T, TessellateError>;

/// Mesh quality parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshParams {
    /// Maximum chord height, in model units.
    pub linear_deflection: f64,
    /// Maximum angle between adjacent segment normals, in radians.
    pub angular_deflection: f64,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            linear_deflection: 0.1,
            angular_deflection: 0.5,
        }
    }
}

/// Output triangle mesh for rendering and export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    /// Flat array of vertex positions: `[x0, y0, z0, x1, y1, z1, ...]` (f32).
    pub vertices: Vec<f32>,
    /// Flat array of triangle indices: `[i0, i1, i2, ...]` (u32).
    pub indices: Vec<u32>,
    /// Flat array of vertex normals: `[nx0, ny0, nz0, ...]` (f32). Same length as vertices.
    pub normals: Vec<f32>,
}

/// Axis-aligned box and enclosing sphere of a mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBounds {
    /// Minimum corner.
    pub min: [f32; 3],
    /// Maximum corner.
    pub max: [f32; 3],
    /// Box center.
    pub center: [f32; 3],
    /// Radius of the sphere around `center` containing every vertex.
    pub radius: f32,
}

impl TriangleMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Whether the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Position of vertex `i`.
    pub fn vertex(&self, i: usize) -> [f32; 3] {
        [self.vertices[3 * i], self.vertices[3 * i + 1], self.vertices[3 * i + 2]]
    }

    /// Normal of vertex `i`.
    pub fn normal(&self, i: usize) -> [f32; 3] {
        [self.normals[3 * i], self.normals[3 * i + 1], self.normals[3 * i + 2]]
    }

    /// Iterate over triangles as index triples.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// Bounding box and sphere, or `None` for a mesh without vertices.
    pub fn bounds(&self) -> Option<MeshBounds> {
        if self.num_vertices() == 0 {
            return None;
        }
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for v in self.vertices.chunks_exact(3) {
            for k in 0..3 {
                min[k] = min[k].min(v[k]);
                max[k] = max[k].max(v[k]);
            }
        }
        let center = [0, 1, 2].map(|k| (min[k] + max[k]) * 0.5);
        let radius = self
            .vertices
            .chunks_exact(3)
            .map(|v| {
                let d = [v[0] - center[0], v[1] - center[1], v[2] - center[2]];
                (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
            })
            .fold(0.0f32, f32::max);
        Some(MeshBounds {
            min,
            max,
            center,
            radius,
        })
    }

    fn push_vertex(&mut self, p: &Point3, n: &Vec3) {
        self.vertices
            .extend_from_slice(&[p.x as f32, p.y as f32, p.z as f32]);
        self.normals
            .extend_from_slice(&[n.x as f32, n.y as f32, n.z as f32]);
    }
}

/// Mesh a shape and collect its faces into one triangle mesh.
pub fn tessellate(kernel: &Kernel, id: ShapeId, params: &MeshParams) -> Result<TriangleMesh> {
    kernel.incremental_mesh(id, params.linear_deflection, params.angular_deflection)?;
    let shape = kernel.faces(id)?;

    let mut mesh = TriangleMesh::new();
    let mut skipped = 0usize;
    for face in shape.explore_faces() {
        if !append_face(&mut mesh, face) {
            skipped += 1;
        }
    }
    tracing::debug!(
        faces = shape.num_faces(),
        skipped,
        triangles = mesh.num_triangles(),
        vertices = mesh.num_vertices(),
        "shape tessellated"
    );

    if mesh.is_empty() {
        return Err(TessellateError::NoVerticesExtracted);
    }
    Ok(mesh)
}

/// Append one face. Returns `false` if the face has no triangulation.
fn append_face(mesh: &mut TriangleMesh, face: &Face) -> bool {
    let Some(tri) = face.triangulation() else {
        return false;
    };
    let location = face.location();
    let nodes: Vec<Point3> = tri.nodes.iter().map(|p| location.apply_point(p)).collect();
    let reversed = face.is_reversed();

    // Orient each triangle and compute its flat normal from the stored winding.
    let oriented = tri.triangles.iter().filter_map(|&[a, b, c]| {
        let t = if reversed { [a, c, b] } else { [a, b, c] };
        let [p0, p1, p2] = t.map(|i| nodes[i as usize]);
        let normal = (p1 - p0).cross(&(p2 - p0)).try_normalize(f64::MIN_POSITIVE)?;
        Some((t, normal))
    });

    let vertex_offset = mesh.num_vertices() as u32;
    if face.surface().is_planar() {
        // A plane has one normal, so nodes stay shared.
        let mut normals = vec![Vec3::zeros(); nodes.len()];
        let mut indices = Vec::with_capacity(tri.triangles.len() * 3);
        for (t, normal) in oriented {
            for i in t {
                normals[i as usize] = normal;
                indices.push(vertex_offset + i);
            }
        }
        // Degenerate faces contribute nothing, not orphaned nodes.
        if indices.is_empty() {
            return true;
        }
        for (p, n) in nodes.iter().zip(&normals) {
            mesh.push_vertex(p, n);
        }
        mesh.indices.extend(indices);
    } else {
        let mut next = vertex_offset;
        for (t, normal) in oriented {
            for i in t {
                mesh.push_vertex(&nodes[i as usize], &normal);
            }
            mesh.indices.extend([next, next + 1, next + 2]);
            next += 3;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn params() -> MeshParams {
        MeshParams::default()
    }

    /// Every index refers to an existing vertex.
    fn assert_indices_in_range(mesh: &TriangleMesh) {
        let n = mesh.num_vertices() as u32;
        assert!(mesh.indices.iter().all(|&i| i < n));
        assert_eq!(mesh.normals.len(), mesh.vertices.len());
        assert_eq!(mesh.indices.len() % 3, 0);
    }

    /// Winding is counter-clockwise seen from the stored normal.
    fn assert_winding_matches_normals(mesh: &TriangleMesh) {
        for [a, b, c] in mesh.triangles() {
            let [p0, p1, p2] = [a, b, c].map(|i| {
                let v = mesh.vertex(i as usize);
                Vec3::new(v[0] as f64, v[1] as f64, v[2] as f64)
            });
            let cross = (p1 - p0).cross(&(p2 - p0));
            for i in [a, b, c] {
                let n = mesh.normal(i as usize);
                let n = Vec3::new(n[0] as f64, n[1] as f64, n[2] as f64);
                assert!(cross.dot(&n) > 0.0, "triangle {a} {b} {c} against normal {n:?}");
            }
        }
    }

    /// Signed volume by the divergence theorem.
    fn compute_mesh_volume(mesh: &TriangleMesh) -> f64 {
        mesh.triangles()
            .map(|t| {
                let [p0, p1, p2] = t.map(|i| {
                    let v = mesh.vertex(i as usize);
                    Vec3::new(v[0] as f64, v[1] as f64, v[2] as f64)
                });
                p0.dot(&p1.cross(&p2)) / 6.0
            })
            .sum()
    }

    fn primitives(kernel: &Kernel) -> Vec<ShapeId> {
        vec![
            kernel.make_box(10.0, 20.0, 30.0).unwrap(),
            kernel.make_cylinder(5.0, 10.0).unwrap(),
            kernel.make_cone(5.0, 0.0, 10.0).unwrap(),
            kernel.make_cone(0.0, 5.0, 10.0).unwrap(),
            kernel.make_cone(5.0, 2.0, 10.0).unwrap(),
            kernel.make_sphere(10.0).unwrap(),
            kernel.make_plane_face(10.0, 5.0).unwrap(),
        ]
    }

    #[test]
    fn test_primitives_satisfy_mesh_invariants() {
        let kernel = Kernel::new();
        for id in primitives(&kernel) {
            let mesh = tessellate(&kernel, id, &params()).unwrap();
            assert!(!mesh.is_empty());
            assert_indices_in_range(&mesh);
            assert_winding_matches_normals(&mesh);
        }
    }

    #[test]
    fn test_placed_shapes_satisfy_mesh_invariants() {
        let kernel = Kernel::new();
        for id in primitives(&kernel) {
            let variants = [
                kernel.translate(id, 1.0, -2.0, 3.0).unwrap(),
                kernel.rotate(id, 30.0, 45.0, 60.0).unwrap(),
                kernel.scale(id, 1.0, 2.0, 0.5).unwrap(),
                kernel.scale(id, -1.0, 1.0, 1.0).unwrap(),
                kernel.reversed(id).unwrap(),
            ];
            for v in variants {
                let mesh = tessellate(&kernel, v, &params()).unwrap();
                assert_indices_in_range(&mesh);
                assert_winding_matches_normals(&mesh);
            }
        }
    }

    #[test]
    fn test_closed_solids_enclose_positive_volume() {
        let kernel = Kernel::new();
        let cube = kernel.make_box(10.0, 20.0, 30.0).unwrap();
        let mesh = tessellate(&kernel, cube, &params()).unwrap();
        assert_relative_eq!(compute_mesh_volume(&mesh), 6000.0, max_relative = 1e-5);

        let mirrored = kernel.scale(cube, -1.0, 1.0, 1.0).unwrap();
        let mesh = tessellate(&kernel, mirrored, &params()).unwrap();
        assert_relative_eq!(compute_mesh_volume(&mesh), 6000.0, max_relative = 1e-5);

        let sphere = kernel.make_sphere(10.0).unwrap();
        let mesh = tessellate(&kernel, sphere, &params()).unwrap();
        let expected = 4.0 / 3.0 * PI * 1000.0;
        let vol = compute_mesh_volume(&mesh);
        assert!((vol - expected).abs() < expected * 0.05, "expected ~{expected}, got {vol}");

        let inside_out = kernel.reversed(sphere).unwrap();
        let mesh = tessellate(&kernel, inside_out, &params()).unwrap();
        assert!(compute_mesh_volume(&mesh) < 0.0);
    }

    #[test]
    fn test_plane_face_mesh() {
        let kernel = Kernel::new();
        let face = kernel.make_plane_face(10.0, 5.0).unwrap();
        let mesh = tessellate(&kernel, face, &params()).unwrap();
        assert_eq!(mesh.num_triangles(), 2);
        assert_eq!(mesh.num_vertices(), 4);
        for i in 0..4 {
            assert_eq!(mesh.normal(i), [0.0, 0.0, 1.0]);
        }

        let flipped = kernel.reversed(face).unwrap();
        let mesh = tessellate(&kernel, flipped, &params()).unwrap();
        assert_eq!(mesh.num_triangles(), 2);
        for i in 0..4 {
            assert_eq!(mesh.normal(i), [0.0, 0.0, -1.0]);
        }
    }

    #[test]
    fn test_curved_faces_get_own_vertices() {
        let kernel = Kernel::new();
        let sphere = kernel.make_sphere(1.0).unwrap();
        let mesh = tessellate(&kernel, sphere, &params()).unwrap();
        assert_eq!(mesh.num_vertices(), mesh.num_triangles() * 3);
    }

    #[test]
    fn test_faces_have_disjoint_vertex_blocks() {
        let kernel = Kernel::new();
        let cube = kernel.make_box(1.0, 1.0, 1.0).unwrap();
        let mesh = tessellate(&kernel, cube, &params()).unwrap();
        assert_eq!(mesh.num_vertices(), 24);
        assert_eq!(mesh.num_triangles(), 12);
        for (face, tris) in mesh.indices.chunks(6).enumerate() {
            let block = (face as u32 * 4)..(face as u32 * 4 + 4);
            assert!(tris.iter().all(|i| block.contains(i)));
        }
    }

    #[test]
    fn test_tiny_face_is_skipped() {
        let kernel = Kernel::new();
        let face = kernel.make_plane_face(1.0, 1.0).unwrap();
        let tiny = kernel.scale(face, 1e-9, 1e-9, 1e-9).unwrap();
        let both = kernel.compound(&[face, tiny]).unwrap();
        let mesh = tessellate(&kernel, both, &params()).unwrap();
        assert_eq!(mesh.num_vertices(), 4);

        assert_eq!(
            tessellate(&kernel, tiny, &params()).unwrap_err(),
            TessellateError::NoVerticesExtracted
        );
    }

    #[test]
    fn test_collapsed_face_has_no_triangles() {
        let kernel = Kernel::new();
        let face = kernel.make_plane_face(1.0, 1.0).unwrap();
        let flat = kernel.scale(face, 1.0, 1e-310, 1.0).unwrap();
        assert_eq!(
            tessellate(&kernel, flat, &params()).unwrap_err(),
            TessellateError::NoVerticesExtracted
        );

        // Next to a real face it adds no vertices.
        let both = kernel.compound(&[flat, face]).unwrap();
        let mesh = tessellate(&kernel, both, &params()).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_triangles(), 2);
        assert_indices_in_range(&mesh);
    }

    #[test]
    fn test_meshing_failure_is_reported() {
        let kernel = Kernel::new();
        let sphere = kernel.make_sphere(1.0).unwrap();
        let fine = MeshParams {
            linear_deflection: 0.1,
            angular_deflection: 1e-4,
        };
        assert!(matches!(
            tessellate(&kernel, sphere, &fine),
            Err(TessellateError::MeshingFailed(_))
        ));
    }

    #[test]
    fn test_released_handle() {
        let kernel = Kernel::new();
        let cube = kernel.make_box(1.0, 1.0, 1.0).unwrap();
        kernel.release(cube);
        assert_eq!(
            tessellate(&kernel, cube, &params()).unwrap_err(),
            TessellateError::Kernel(KernelError::UnknownShape)
        );
    }

    #[test]
    fn test_bounds() {
        let kernel = Kernel::new();
        let cube = kernel.make_box(2.0, 4.0, 4.0).unwrap();
        let bounds = tessellate(&kernel, cube, &params()).unwrap().bounds().unwrap();
        for k in 0..3 {
            assert_relative_eq!(bounds.min[k], [0.0, 0.0, 0.0][k], epsilon = 1e-5);
            assert_relative_eq!(bounds.max[k], [2.0, 4.0, 4.0][k], epsilon = 1e-5);
            assert_relative_eq!(bounds.center[k], [1.0, 2.0, 2.0][k], epsilon = 1e-5);
        }
        assert_relative_eq!(bounds.radius, 3.0, epsilon = 1e-5);
        assert!(TriangleMesh::new().bounds().is_none());
    }
}
