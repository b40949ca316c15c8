//! Binary and ASCII STL encoders.

use crate::shaded::ShadedMesh;
use std::fmt::Write as _;

/// Size of the binary STL header.
pub const HEADER_LEN: usize = 80;
/// Size of one binary STL triangle record.
pub const RECORD_LEN: usize = 50;

/// Binary STL: 80-byte header, `u32` triangle count, 50 bytes per triangle.
pub fn encode_binary(mesh: &ShadedMesh<'_>) -> Vec<u8> {
    let num_triangles = mesh.geometry.num_triangles();
    let mut data = Vec::with_capacity(HEADER_LEN + 4 + num_triangles * RECORD_LEN);

    let mut header = [b' '; HEADER_LEN];
    let label = format!("cadbench STL export: {}", mesh.material.name);
    let n = label.len().min(HEADER_LEN);
    header[..n].copy_from_slice(&label.as_bytes()[..n]);
    data.extend_from_slice(&header);
    data.extend_from_slice(&(num_triangles as u32).to_le_bytes());

    for t in mesh.geometry.triangles() {
        for c in mesh.facet_normal(t) {
            data.extend_from_slice(&c.to_le_bytes());
        }
        for v in mesh.triangle(t) {
            for c in v {
                data.extend_from_slice(&c.to_le_bytes());
            }
        }
        // Attribute byte count
        data.extend_from_slice(&0u16.to_le_bytes());
    }

    data
}

/// ASCII STL text named after the material.
pub fn encode_ascii(mesh: &ShadedMesh<'_>) -> String {
    let name = solid_name(&mesh.material.name);
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "solid {name}");
    for t in mesh.geometry.triangles() {
        let [nx, ny, nz] = mesh.facet_normal(t);
        let _ = writeln!(out, "  facet normal {nx:e} {ny:e} {nz:e}");
        let _ = writeln!(out, "    outer loop");
        for [x, y, z] in mesh.triangle(t) {
            let _ = writeln!(out, "      vertex {x:e} {y:e} {z:e}");
        }
        let _ = writeln!(out, "    endloop");
        let _ = writeln!(out, "  endfacet");
    }
    let _ = writeln!(out, "endsolid {name}");
    out
}

fn solid_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_graphic() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "mesh".into()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadbench_tessellate::TriangleMesh;

    fn two_triangles() -> TriangleMesh {
        TriangleMesh {
            vertices: vec![
                0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 10.0, 5.0, 0.0, 0.0, 5.0, 0.0,
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            normals: [0.0, 0.0, 1.0].repeat(4),
        }
    }

    #[test]
    fn test_binary_layout() {
        let geometry = two_triangles();
        let bytes = encode_binary(&ShadedMesh::new(&geometry));
        assert_eq!(bytes.len(), 80 + 4 + 50 * 2);
        let count = u32::from_le_bytes(bytes[80..84].try_into().unwrap());
        assert_eq!(count, 2);
        // First record: normal then the first vertex.
        let nz = f32::from_le_bytes(bytes[92..96].try_into().unwrap());
        assert_eq!(nz, 1.0);
        let v1x = f32::from_le_bytes(bytes[108..112].try_into().unwrap());
        assert_eq!(v1x, 10.0);
        assert!(bytes.starts_with(b"cadbench STL export"));
    }

    #[test]
    fn test_binary_empty_mesh() {
        let geometry = TriangleMesh::new();
        assert_eq!(encode_binary(&ShadedMesh::new(&geometry)).len(), 84);
    }

    #[test]
    fn test_ascii_blocks() {
        let geometry = two_triangles();
        let text = encode_ascii(&ShadedMesh::new(&geometry));
        assert!(text.starts_with("solid default\n"));
        assert_eq!(text.matches("facet normal").count(), 2);
        assert_eq!(text.matches("endfacet").count(), 2);
        assert_eq!(text.matches("vertex ").count(), 6);
        assert!(text.contains("facet normal 0e0 0e0 1e0"));
        assert!(text.trim_end().ends_with("endsolid default"));
    }
}
