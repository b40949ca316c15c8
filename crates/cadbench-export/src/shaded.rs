//! Geometry plus surface material, the input shape of the mesh encoders.

use cadbench_ir::MaterialDef;
use cadbench_tessellate::TriangleMesh;

/// Physically based material used when encoding a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadedMaterial {
    /// Material name.
    pub name: String,
    /// Linear RGBA base color.
    pub base_color: [f32; 4],
    /// Metallic factor in `[0, 1]`.
    pub metallic: f32,
    /// Roughness factor in `[0, 1]`.
    pub roughness: f32,
}

impl From<&MaterialDef> for ShadedMaterial {
    fn from(def: &MaterialDef) -> Self {
        let [r, g, b] = def.color.map(|c| c.clamp(0.0, 1.0) as f32);
        Self {
            name: def.name.clone(),
            base_color: [r, g, b, 1.0],
            metallic: def.metallic.clamp(0.0, 1.0) as f32,
            roughness: def.roughness.clamp(0.0, 1.0) as f32,
        }
    }
}

impl Default for ShadedMaterial {
    fn default() -> Self {
        Self::from(&MaterialDef::default())
    }
}

/// A borrowed mesh wrapped with a material for one export call.
#[derive(Debug, Clone)]
pub struct ShadedMesh<'a> {
    /// The triangles.
    pub geometry: &'a TriangleMesh,
    /// The surface material.
    pub material: ShadedMaterial,
}

impl<'a> ShadedMesh<'a> {
    /// Wrap a mesh with the default shaded material.
    pub fn new(geometry: &'a TriangleMesh) -> Self {
        Self {
            geometry,
            material: ShadedMaterial::default(),
        }
    }

    /// Replace the material.
    pub fn with_material(mut self, material: ShadedMaterial) -> Self {
        self.material = material;
        self
    }

    /// The three corner positions of triangle `t`.
    pub(crate) fn triangle(&self, t: [u32; 3]) -> [[f32; 3]; 3] {
        t.map(|i| self.geometry.vertex(i as usize))
    }

    /// Unit normal of triangle `t` from its winding, `+Z` if degenerate.
    pub(crate) fn facet_normal(&self, t: [u32; 3]) -> [f32; 3] {
        let [v0, v1, v2] = self.triangle(t);
        let e1 = [v1[0] - v0[0], v1[1] - v0[1], v1[2] - v0[2]];
        let e2 = [v2[0] - v0[0], v2[1] - v0[1], v2[2] - v0[2]];
        let nx = e1[1] * e2[2] - e1[2] * e2[1];
        let ny = e1[2] * e2[0] - e1[0] * e2[2];
        let nz = e1[0] * e2[1] - e1[1] * e2[0];
        let len = (nx * nx + ny * ny + nz * nz).sqrt();
        if len > 1e-10 {
            [nx / len, ny / len, nz / len]
        } else {
            [0.0, 0.0, 1.0]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_conversion_clamps() {
        let def = MaterialDef {
            name: "steel".into(),
            color: [1.5, 0.5, -0.2],
            metallic: 1.0,
            roughness: 0.3,
        };
        let m = ShadedMaterial::from(&def);
        assert_eq!(m.base_color, [1.0, 0.5, 0.0, 1.0]);
        assert_eq!(m.metallic, 1.0);
        assert_eq!(m.name, "steel");
    }

    #[test]
    fn test_facet_normal_of_degenerate_triangle() {
        let mesh = TriangleMesh {
            vertices: vec![0.0; 9],
            indices: vec![0, 1, 2],
            normals: vec![0.0; 9],
        };
        assert_eq!(ShadedMesh::new(&mesh).facet_normal([0, 1, 2]), [0.0, 0.0, 1.0]);
    }
}
