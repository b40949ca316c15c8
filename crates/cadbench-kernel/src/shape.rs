//! Shapes, faces and their triangulations.
//!
//! A [`Shape`] is a flat list of oriented faces. Each face carries an
//! analytic surface defined in its own local frame, a [`Location`] placing
//! that frame in model space, and, once meshed, a [`Triangulation`] in
//! local coordinates.

use crate::math::{Location, Point3};
use slotmap::new_key_type;

new_key_type! {
    /// Handle to a shape owned by a [`crate::Kernel`].
    pub struct ShapeId;
}

/// Orientation of a face relative to its surface's natural normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Outward side is the natural normal side.
    Forward,
    /// Outward side is opposite the natural normal.
    Reversed,
}

impl Orientation {
    /// The opposite orientation.
    pub fn flipped(self) -> Self {
        match self {
            Orientation::Forward => Orientation::Reversed,
            Orientation::Reversed => Orientation::Forward,
        }
    }
}

/// Analytic surface patch in face-local coordinates.
///
/// Natural normals: planar patches point along +Z, the others point away
/// from the Z axis (or the center for spheres).
#[derive(Debug, Clone, PartialEq)]
pub enum Surface {
    /// Rectangle `[0, width] x [0, height]` in the XY plane.
    Rectangle {
        /// Extent along X.
        width: f64,
        /// Extent along Y.
        height: f64,
    },
    /// Disk of the given radius in the XY plane, centered at the origin.
    Disk {
        /// Radius.
        radius: f64,
    },
    /// Lateral cylinder surface around +Z from `z = 0` to `z = height`.
    Cylinder {
        /// Radius.
        radius: f64,
        /// Height.
        height: f64,
    },
    /// Lateral cone surface around +Z from `z = 0` to `z = height`.
    Cone {
        /// Radius at `z = 0`.
        radius_bottom: f64,
        /// Radius at `z = height`.
        radius_top: f64,
        /// Height.
        height: f64,
    },
    /// Full sphere centered at the origin.
    Sphere {
        /// Radius.
        radius: f64,
    },
}

impl Surface {
    /// Whether the surface lies in a plane.
    pub fn is_planar(&self) -> bool {
        matches!(self, Surface::Rectangle { .. } | Surface::Disk { .. })
    }

    /// Largest local extent, used to detect sub-tolerance faces.
    pub fn extent(&self) -> f64 {
        match *self {
            Surface::Rectangle { width, height } => width.max(height),
            Surface::Disk { radius } | Surface::Sphere { radius } => radius,
            Surface::Cylinder { radius, height } => radius.max(height),
            Surface::Cone {
                radius_bottom,
                radius_top,
                height,
            } => radius_bottom.max(radius_top).max(height),
        }
    }
}

/// Mesh of one face in face-local coordinates.
///
/// Triangles wind counter-clockwise seen from the surface's natural normal.
#[derive(Debug, Clone, PartialEq)]
pub struct Triangulation {
    /// Mesh nodes.
    pub nodes: Vec<Point3>,
    /// Node index triples.
    pub triangles: Vec<[u32; 3]>,
    /// Linear deflection the mesh was built with.
    pub linear_deflection: f64,
    /// Angular deflection the mesh was built with.
    pub angular_deflection: f64,
}

impl Triangulation {
    /// Whether this mesh is at least as fine as the requested tolerances.
    pub fn satisfies(&self, linear: f64, angular: f64) -> bool {
        self.linear_deflection <= linear && self.angular_deflection <= angular
    }
}

/// An oriented face placed in model space.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub(crate) surface: Surface,
    pub(crate) location: Location,
    pub(crate) orientation: Orientation,
    pub(crate) triangulation: Option<Triangulation>,
}

impl Face {
    pub(crate) fn new(surface: Surface, location: Location, orientation: Orientation) -> Self {
        Self {
            surface,
            location,
            orientation,
            triangulation: None,
        }
    }

    /// The face's surface in local coordinates.
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Placement of the local frame in model space.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Orientation relative to the surface's natural normal.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Whether the face's outward side opposes the natural normal.
    pub fn is_reversed(&self) -> bool {
        self.orientation == Orientation::Reversed
    }

    /// The face mesh, if the face has been meshed.
    pub fn triangulation(&self) -> Option<&Triangulation> {
        self.triangulation.as_ref()
    }
}

/// Topological kind of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// A single face.
    Face,
    /// A closed solid.
    Solid,
    /// A collection of shapes.
    Compound,
}

/// A shape: its kind and its faces.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub(crate) kind: ShapeKind,
    pub(crate) faces: Vec<Face>,
}

impl Shape {
    pub(crate) fn new(kind: ShapeKind, faces: Vec<Face>) -> Self {
        Self { kind, faces }
    }

    /// Topological kind.
    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    /// Number of faces.
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Iterate over the faces of the shape.
    pub fn explore_faces(&self) -> FaceExplorer<'_> {
        FaceExplorer {
            faces: self.faces.iter(),
        }
    }

    /// Apply a placement on top of every face's own placement.
    ///
    /// Mirroring placements flip face orientations so outward sides stay outward.
    pub(crate) fn transformed(&self, location: &Location) -> Shape {
        let mirror = location.determinant() < 0.0;
        let faces = self
            .faces
            .iter()
            .map(|f| Face {
                surface: f.surface.clone(),
                location: location.then(&f.location),
                orientation: if mirror {
                    f.orientation.flipped()
                } else {
                    f.orientation
                },
                triangulation: f.triangulation.clone(),
            })
            .collect();
        Shape::new(self.kind, faces)
    }

    /// The same shape with every face orientation flipped.
    pub(crate) fn reversed(&self) -> Shape {
        let faces = self
            .faces
            .iter()
            .map(|f| Face {
                orientation: f.orientation.flipped(),
                ..f.clone()
            })
            .collect();
        Shape::new(self.kind, faces)
    }
}

/// Iterator over the faces of a shape.
#[derive(Debug, Clone)]
pub struct FaceExplorer<'a> {
    faces: std::slice::Iter<'a, Face>,
}

impl<'a> Iterator for FaceExplorer<'a> {
    type Item = &'a Face;

    fn next(&mut self) -> Option<Self::Item> {
        self.faces.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.faces.size_hint()
    }
}

impl ExactSizeIterator for FaceExplorer<'_> {}
