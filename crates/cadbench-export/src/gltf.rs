//! glTF 2.0 encoders: `.gltf` JSON with an embedded buffer, or `.glb`.

use crate::error::Result;
use crate::shaded::ShadedMesh;
use base64::Engine as _;
use serde_json::json;

const GLB_MAGIC: u32 = 0x46546C67; // "glTF"
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F534A; // "JSON"
const CHUNK_BIN: u32 = 0x004E4942; // "BIN\0"

const FLOAT: u32 = 5126;
const UNSIGNED_INT: u32 = 5125;
const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;
const TRIANGLES: u32 = 4;

/// `.gltf` text with the buffer inlined as a base64 data URI.
pub fn encode_gltf(mesh: &ShadedMesh<'_>) -> Result<Vec<u8>> {
    let buffer = build_buffer(mesh);
    let uri = format!(
        "data:application/octet-stream;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&buffer)
    );
    let doc = document(mesh, buffer.len(), Some(uri));
    Ok(serde_json::to_vec_pretty(&doc)?)
}

/// Binary glTF: 12-byte header, JSON chunk, BIN chunk.
pub fn encode_glb(mesh: &ShadedMesh<'_>) -> Result<Vec<u8>> {
    let buffer = build_buffer(mesh);
    let doc = document(mesh, buffer.len(), None);
    let json_string = serde_json::to_string(&doc)?;

    let mut json_len = json_string.len();
    align_to_multiple_of_four(&mut json_len);
    let mut buffer_len = buffer.len();
    align_to_multiple_of_four(&mut buffer_len);
    let total_length = 12 + 8 + json_len + 8 + buffer_len;

    let mut out = Vec::with_capacity(total_length);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total_length as u32).to_le_bytes());

    out.extend_from_slice(&(json_len as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(json_string.as_bytes());
    out.resize(out.len() + json_len - json_string.len(), b' ');

    out.extend_from_slice(&(buffer_len as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&buffer);
    out.resize(out.len() + buffer_len - buffer.len(), 0);

    Ok(out)
}

fn align_to_multiple_of_four(n: &mut usize) {
    *n = (*n + 3) & !3;
}

/// Positions, then normals, then indices. Each section is 4-byte aligned.
fn build_buffer(mesh: &ShadedMesh<'_>) -> Vec<u8> {
    let g = mesh.geometry;
    let mut data = Vec::with_capacity((g.vertices.len() + g.normals.len() + g.indices.len()) * 4);
    for v in &g.vertices {
        data.extend_from_slice(&v.to_le_bytes());
    }
    for n in &g.normals {
        data.extend_from_slice(&n.to_le_bytes());
    }
    for i in &g.indices {
        data.extend_from_slice(&i.to_le_bytes());
    }
    data
}

fn document(mesh: &ShadedMesh<'_>, buffer_len: usize, uri: Option<String>) -> serde_json::Value {
    let g = mesh.geometry;
    let positions_len = g.vertices.len() * 4;
    let normals_len = g.normals.len() * 4;
    let indices_len = g.indices.len() * 4;
    let (min, max) = g
        .bounds()
        .map(|b| (b.min, b.max))
        .unwrap_or(([0.0; 3], [0.0; 3]));
    let m = &mesh.material;

    let mut buffer = json!({ "byteLength": buffer_len });
    if let Some(uri) = uri {
        buffer["uri"] = json!(uri);
    }

    json!({
        "asset": {
            "generator": "cadbench",
            "version": "2.0"
        },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{
            "primitives": [{
                "attributes": { "POSITION": 0, "NORMAL": 1 },
                "indices": 2,
                "material": 0,
                "mode": TRIANGLES
            }]
        }],
        "materials": [{
            "name": m.name,
            "pbrMetallicRoughness": {
                "baseColorFactor": m.base_color,
                "metallicFactor": m.metallic,
                "roughnessFactor": m.roughness
            },
            "doubleSided": false
        }],
        "accessors": [
            {
                "bufferView": 0,
                "componentType": FLOAT,
                "count": g.num_vertices(),
                "type": "VEC3",
                "min": min,
                "max": max
            },
            {
                "bufferView": 1,
                "componentType": FLOAT,
                "count": g.num_vertices(),
                "type": "VEC3"
            },
            {
                "bufferView": 2,
                "componentType": UNSIGNED_INT,
                "count": g.indices.len(),
                "type": "SCALAR"
            }
        ],
        "bufferViews": [
            {
                "buffer": 0,
                "byteOffset": 0,
                "byteLength": positions_len,
                "target": ARRAY_BUFFER
            },
            {
                "buffer": 0,
                "byteOffset": positions_len,
                "byteLength": normals_len,
                "target": ARRAY_BUFFER
            },
            {
                "buffer": 0,
                "byteOffset": positions_len + normals_len,
                "byteLength": indices_len,
                "target": ELEMENT_ARRAY_BUFFER
            }
        ],
        "buffers": [buffer]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadbench_tessellate::TriangleMesh;

    fn quad() -> TriangleMesh {
        TriangleMesh {
            vertices: vec![
                0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 10.0, 5.0, 0.0, 0.0, 5.0, 0.0,
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            normals: [0.0, 0.0, 1.0].repeat(4),
        }
    }

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn test_gltf_embeds_buffer() {
        let geometry = quad();
        let bytes = encode_gltf(&ShadedMesh::new(&geometry)).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["asset"]["version"], "2.0");
        assert_eq!(doc["accessors"][0]["count"], 4);
        assert_eq!(doc["accessors"][2]["count"], 6);
        assert_eq!(doc["accessors"][0]["max"][0], 10.0);

        let uri = doc["buffers"][0]["uri"].as_str().unwrap();
        let payload = uri
            .strip_prefix("data:application/octet-stream;base64,")
            .unwrap();
        let buffer = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .unwrap();
        assert_eq!(buffer.len(), (12 + 12 + 6) * 4);
        assert_eq!(doc["buffers"][0]["byteLength"], buffer.len());
        assert_eq!(doc["bufferViews"][2]["byteOffset"], 96);
    }

    #[test]
    fn test_glb_layout() {
        let geometry = quad();
        let bytes = encode_glb(&ShadedMesh::new(&geometry)).unwrap();
        assert_eq!(u32_at(&bytes, 0), GLB_MAGIC);
        assert_eq!(u32_at(&bytes, 4), 2);
        assert_eq!(u32_at(&bytes, 8) as usize, bytes.len());
        assert_eq!(bytes.len() % 4, 0);

        let json_len = u32_at(&bytes, 12) as usize;
        assert_eq!(json_len % 4, 0);
        assert_eq!(u32_at(&bytes, 16), CHUNK_JSON);
        // Space padding is valid trailing JSON whitespace.
        let doc: serde_json::Value = serde_json::from_slice(&bytes[20..20 + json_len]).unwrap();
        assert!(doc["buffers"][0].get("uri").is_none());

        let bin_header = 20 + json_len;
        assert_eq!(u32_at(&bytes, bin_header) as usize, 120);
        assert_eq!(u32_at(&bytes, bin_header + 4), CHUNK_BIN);
    }
}
