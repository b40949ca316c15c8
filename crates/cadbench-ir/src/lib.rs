//! Declarative model documents for cadbench.
//!
//! A model is a DAG of construction operations: leaf primitives, transforms,
//! booleans and compounds. The document says nothing about meshes; it is
//! evaluated against a geometry kernel by the workbench runner.
//!
//! Two syntaxes map onto [`Document`]: JSON (serde) and the line-based
//! compact script in [`compact`].

pub mod compact;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

pub use compact::{from_compact, to_compact, CompactParseError};

/// Unique identifier for a node in the model graph.
pub type NodeId = u64;

/// 3D vector with f64 components (model units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vec3 {
    /// Create a new Vec3.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Construction operation, the building block of the model DAG.
///
/// Each variant is either a leaf primitive or an operation that references
/// child nodes by [`NodeId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CsgOp {
    /// Box with one corner at the origin.
    Cube {
        /// Size along each axis.
        size: Vec3,
    },
    /// Cylinder along +Z, base centered at the origin.
    Cylinder {
        /// Radius.
        radius: f64,
        /// Height.
        height: f64,
    },
    /// Cone or frustum along +Z, base centered at the origin.
    Cone {
        /// Bottom radius.
        radius_bottom: f64,
        /// Top radius (0 for an apex).
        radius_top: f64,
        /// Height.
        height: f64,
    },
    /// Sphere centered at the origin.
    Sphere {
        /// Radius.
        radius: f64,
    },
    /// Rectangular planar face in the XY plane, corner at the origin, normal +Z.
    Plane {
        /// Extent along X.
        width: f64,
        /// Extent along Y.
        height: f64,
    },
    /// Fuse two shapes.
    Union {
        /// Left operand.
        left: NodeId,
        /// Right operand.
        right: NodeId,
    },
    /// Cut `right` from `left`.
    Difference {
        /// Base.
        left: NodeId,
        /// Tool.
        right: NodeId,
    },
    /// Common part of two shapes.
    Intersection {
        /// Left operand.
        left: NodeId,
        /// Right operand.
        right: NodeId,
    },
    /// Compound of any number of shapes, no boolean resolution.
    Compound {
        /// Members of the compound.
        children: Vec<NodeId>,
    },
    /// Translation by an offset vector.
    Translate {
        /// Child node.
        child: NodeId,
        /// Offset.
        offset: Vec3,
    },
    /// Rotation by Euler angles in degrees (applied X, then Y, then Z).
    Rotate {
        /// Child node.
        child: NodeId,
        /// Angles in degrees.
        angles: Vec3,
    },
    /// Non-uniform scale about the origin.
    Scale {
        /// Child node.
        child: NodeId,
        /// Scale factors per axis.
        factor: Vec3,
    },
    /// Flip the orientation of every face of the child.
    Reverse {
        /// Child node.
        child: NodeId,
    },
}

impl CsgOp {
    /// Child node ids referenced by this operation.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            CsgOp::Union { left, right }
            | CsgOp::Difference { left, right }
            | CsgOp::Intersection { left, right } => vec![*left, *right],
            CsgOp::Translate { child, .. }
            | CsgOp::Rotate { child, .. }
            | CsgOp::Scale { child, .. }
            | CsgOp::Reverse { child } => vec![*child],
            CsgOp::Compound { children } => children.clone(),
            CsgOp::Cube { .. }
            | CsgOp::Cylinder { .. }
            | CsgOp::Cone { .. }
            | CsgOp::Sphere { .. }
            | CsgOp::Plane { .. } => Vec::new(),
        }
    }
}

/// A node in the model graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier.
    pub id: NodeId,
    /// Optional human-readable name.
    pub name: Option<String>,
    /// The operation this node represents.
    pub op: CsgOp,
}

/// Shaded material used when the model is exported to a scene format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDef {
    /// Material name.
    pub name: String,
    /// Base color as `[r, g, b]` in 0.0..1.0.
    pub color: [f64; 3],
    /// Metallic factor (0.0 = dielectric, 1.0 = metal).
    pub metallic: f64,
    /// Roughness factor (0.0 = mirror, 1.0 = diffuse).
    pub roughness: f64,
}

impl Default for MaterialDef {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            color: [0.8, 0.8, 0.8],
            metallic: 0.0,
            roughness: 0.5,
        }
    }
}

/// The shape a model returns, with an optional material key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntry {
    /// Root node of the returned shape.
    pub root: NodeId,
    /// Material key referencing a [`MaterialDef::name`].
    #[serde(default)]
    pub material: Option<String>,
}

/// Structural problems in a document graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// A node references an id that is not in the document.
    #[error("node {from} references missing node {missing}")]
    MissingNode {
        /// Referencing node.
        from: NodeId,
        /// Id that could not be found.
        missing: NodeId,
    },
    /// The graph reachable from the root is not acyclic.
    #[error("cycle detected at node {0}")]
    Cycle(NodeId),
}

/// A cadbench model document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Format version string.
    pub version: String,
    /// All nodes in the graph, keyed by [`NodeId`].
    pub nodes: HashMap<NodeId, Node>,
    /// Material definitions, keyed by name.
    #[serde(default)]
    pub materials: HashMap<String, MaterialDef>,
    /// Returned shapes. The first entry is the model result.
    #[serde(default)]
    pub roots: Vec<SceneEntry>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            nodes: HashMap::new(),
            materials: HashMap::new(),
            roots: Vec::new(),
        }
    }
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The scene entry the model returns, if any.
    pub fn result(&self) -> Option<&SceneEntry> {
        self.roots.first()
    }

    /// Material of the returned shape, falling back to the default material.
    pub fn result_material(&self) -> MaterialDef {
        self.result()
            .and_then(|entry| entry.material.as_ref())
            .and_then(|key| self.materials.get(key))
            .cloned()
            .unwrap_or_default()
    }

    /// Nodes reachable from `root`, dependencies first.
    ///
    /// Fails on dangling references and cycles. The walk keeps its own
    /// stack, so graph depth is bounded by memory, not by the thread stack.
    pub fn evaluation_order(&self, root: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut in_progress = HashSet::new();
        // (node, its children, index of the next child to visit)
        let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = Vec::new();

        let enter = |id: NodeId,
                     parent: NodeId,
                     in_progress: &mut HashSet<NodeId>,
                     stack: &mut Vec<(NodeId, Vec<NodeId>, usize)>|
         -> Result<(), GraphError> {
            if !in_progress.insert(id) {
                return Err(GraphError::Cycle(id));
            }
            let node = self.nodes.get(&id).ok_or(GraphError::MissingNode {
                from: parent,
                missing: id,
            })?;
            stack.push((id, node.op.children(), 0));
            Ok(())
        };

        enter(root, root, &mut in_progress, &mut stack)?;
        while let Some((id, children, next)) = stack.last_mut() {
            if let Some(&child) = children.get(*next) {
                *next += 1;
                let parent = *id;
                if !done.contains(&child) {
                    enter(child, parent, &mut in_progress, &mut stack)?;
                }
            } else {
                let id = *id;
                stack.pop();
                in_progress.remove(&id);
                done.insert(id);
                order.push(id);
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: NodeId, op: CsgOp) -> Node {
        Node { id, name: None, op }
    }

    #[test]
    fn roundtrip_document() {
        let mut doc = Document::new();
        doc.nodes.insert(
            1,
            Node {
                id: 1,
                name: Some("box".to_string()),
                op: CsgOp::Cube {
                    size: Vec3::new(10.0, 20.0, 30.0),
                },
            },
        );
        doc.nodes.insert(
            2,
            node(
                2,
                CsgOp::Translate {
                    child: 1,
                    offset: Vec3::new(0.0, 0.0, 5.0),
                },
            ),
        );
        doc.materials.insert(
            "steel".to_string(),
            MaterialDef {
                name: "steel".to_string(),
                color: [0.6, 0.6, 0.65],
                metallic: 1.0,
                roughness: 0.3,
            },
        );
        doc.roots.push(SceneEntry {
            root: 2,
            material: Some("steel".to_string()),
        });

        let json = doc.to_json().expect("serialize");
        let restored = Document::from_json(&json).expect("deserialize");
        assert_eq!(doc, restored);
        assert_eq!(restored.result_material().name, "steel");
    }

    #[test]
    fn serde_tagged_enum() {
        let op = CsgOp::Plane {
            width: 1.0,
            height: 2.0,
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains(r#""type":"Plane""#));
        let restored: CsgOp = serde_json::from_str(&json).unwrap();
        assert_eq!(op, restored);
    }

    #[test]
    fn minimal_json_document_defaults() {
        let doc = Document::from_json(r#"{"version":"0.1","nodes":{}}"#).unwrap();
        assert!(doc.roots.is_empty());
        assert!(doc.result().is_none());
        assert_eq!(doc.result_material(), MaterialDef::default());
    }

    #[test]
    fn evaluation_order_puts_children_first() {
        let mut doc = Document::new();
        doc.nodes.insert(0, node(0, CsgOp::Sphere { radius: 5.0 }));
        doc.nodes.insert(
            1,
            node(
                1,
                CsgOp::Cube {
                    size: Vec3::new(1.0, 1.0, 1.0),
                },
            ),
        );
        doc.nodes.insert(2, node(2, CsgOp::Union { left: 0, right: 1 }));
        doc.nodes.insert(3, node(3, CsgOp::Reverse { child: 2 }));

        let order = doc.evaluation_order(3).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(*order.last().unwrap(), 3);
        let pos = |id| order.iter().position(|&n| n == id).unwrap();
        assert!(pos(0) < pos(2));
        assert!(pos(1) < pos(2));
    }

    #[test]
    fn evaluation_order_skips_unreachable_nodes() {
        let mut doc = Document::new();
        doc.nodes.insert(0, node(0, CsgOp::Sphere { radius: 5.0 }));
        doc.nodes.insert(1, node(1, CsgOp::Sphere { radius: 2.0 }));
        assert_eq!(doc.evaluation_order(1).unwrap(), vec![1]);
    }

    #[test]
    fn evaluation_order_rejects_dangling_reference() {
        let mut doc = Document::new();
        doc.nodes.insert(0, node(0, CsgOp::Reverse { child: 7 }));
        assert_eq!(
            doc.evaluation_order(0),
            Err(GraphError::MissingNode {
                from: 0,
                missing: 7
            })
        );
    }

    #[test]
    fn evaluation_order_rejects_cycle() {
        let mut doc = Document::new();
        doc.nodes.insert(0, node(0, CsgOp::Reverse { child: 1 }));
        doc.nodes.insert(1, node(1, CsgOp::Reverse { child: 0 }));
        assert!(matches!(
            doc.evaluation_order(0),
            Err(GraphError::Cycle(_))
        ));
    }

    #[test]
    fn evaluation_order_handles_deep_chains() {
        const DEPTH: NodeId = 100_000;
        let mut doc = Document::new();
        doc.nodes.insert(0, node(0, CsgOp::Plane { width: 1.0, height: 1.0 }));
        for id in 1..=DEPTH {
            doc.nodes.insert(id, node(id, CsgOp::Reverse { child: id - 1 }));
        }
        // Small stack, like a runtime worker thread.
        let order = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || doc.evaluation_order(DEPTH))
            .unwrap()
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(order.len(), DEPTH as usize + 1);
        assert_eq!(order[0], 0);
        assert_eq!(order[DEPTH as usize], DEPTH);
    }

    #[test]
    fn evaluation_order_visits_shared_nodes_once() {
        let mut doc = Document::new();
        doc.nodes.insert(0, node(0, CsgOp::Sphere { radius: 1.0 }));
        doc.nodes.insert(1, node(1, CsgOp::Union { left: 0, right: 0 }));
        doc.nodes.insert(2, node(2, CsgOp::Union { left: 1, right: 0 }));
        assert_eq!(doc.evaluation_order(2).unwrap(), vec![0, 1, 2]);
    }
}
