//! Incremental face mesher.
//!
//! Each face is meshed in its local frame. Curved surfaces are split into
//! `n` segments around their axis where `n` satisfies both the angular
//! deflection and the chord height (linear deflection) at the face's
//! world-space radius.

use crate::error::{KernelError, Result};
use crate::math::{Point3, CONFUSION};
use crate::shape::{Face, Shape, Surface, Triangulation};
use std::f64::consts::{PI, TAU};

/// Upper bound on segments per revolution before meshing is abandoned.
pub const MAX_SEGMENTS: usize = 4096;

/// Mesh every face that has no triangulation fine enough for the request.
///
/// Faces whose world-space extent is below [`CONFUSION`] stay untriangulated.
pub(crate) fn mesh_shape(shape: &Shape, linear: f64, angular: f64) -> Result<Shape> {
    if !(linear.is_finite() && linear > 0.0) {
        return Err(KernelError::MeshingFailed(format!(
            "linear deflection must be positive, got {linear}"
        )));
    }
    if !(angular.is_finite() && angular > 0.0) {
        return Err(KernelError::MeshingFailed(format!(
            "angular deflection must be positive, got {angular}"
        )));
    }

    let mut faces = Vec::with_capacity(shape.faces.len());
    for face in &shape.faces {
        let mut face = face.clone();
        let fine_enough = face
            .triangulation
            .as_ref()
            .is_some_and(|t| t.satisfies(linear, angular));
        if !fine_enough {
            face.triangulation = mesh_face(&face, linear, angular)?;
        }
        faces.push(face);
    }
    Ok(Shape::new(shape.kind, faces))
}

fn mesh_face(face: &Face, linear: f64, angular: f64) -> Result<Option<Triangulation>> {
    let scale = face.location.max_scale();
    if face.surface.extent() * scale < CONFUSION {
        return Ok(None);
    }

    let (nodes, triangles) = match face.surface {
        Surface::Rectangle { width, height } => rectangle(width, height),
        Surface::Disk { radius } => disk(radius, segments(radius * scale, linear, angular)?),
        Surface::Cylinder { radius, height } => {
            cylinder(radius, height, segments(radius * scale, linear, angular)?)
        }
        Surface::Cone {
            radius_bottom,
            radius_top,
            height,
        } => {
            let n = segments(radius_bottom.max(radius_top) * scale, linear, angular)?;
            cone(radius_bottom, radius_top, height, n)
        }
        Surface::Sphere { radius } => sphere(radius, segments(radius * scale, linear, angular)?),
    };

    Ok(Some(Triangulation {
        nodes,
        triangles,
        linear_deflection: linear,
        angular_deflection: angular,
    }))
}

/// Segments per full turn for a circle of world radius `radius`.
pub fn segments(radius: f64, linear: f64, angular: f64) -> Result<usize> {
    let by_angle = (TAU / angular).ceil();
    // Chord height r * (1 - cos(theta / 2)) must stay within `linear`.
    let cos_half = (1.0 - linear / radius).max(-1.0);
    let by_chord = (PI / cos_half.acos()).ceil();
    let n = by_angle.max(by_chord).max(3.0);
    if !n.is_finite() || n > MAX_SEGMENTS as f64 {
        return Err(KernelError::MeshingFailed(format!(
            "{n} segments needed for radius {radius} (limit {MAX_SEGMENTS})"
        )));
    }
    Ok(n as usize)
}

type Mesh = (Vec<Point3>, Vec<[u32; 3]>);

fn ring(radius: f64, z: f64, n: usize, closed: bool) -> impl Iterator<Item = Point3> {
    let count = if closed { n + 1 } else { n };
    (0..count).map(move |j| {
        let theta = TAU * j as f64 / n as f64;
        Point3::new(radius * theta.cos(), radius * theta.sin(), z)
    })
}

fn rectangle(width: f64, height: f64) -> Mesh {
    let nodes = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(width, 0.0, 0.0),
        Point3::new(width, height, 0.0),
        Point3::new(0.0, height, 0.0),
    ];
    (nodes, vec![[0, 1, 2], [0, 2, 3]])
}

fn disk(radius: f64, n: usize) -> Mesh {
    let mut nodes = vec![Point3::origin()];
    nodes.extend(ring(radius, 0.0, n, false));
    let n = n as u32;
    let triangles = (1..=n).map(|i| [0, i, i % n + 1]).collect();
    (nodes, triangles)
}

/// Band between two rings of `n + 1` nodes (seam duplicated).
fn band(triangles: &mut Vec<[u32; 3]>, lower: u32, upper: u32, n: u32) {
    for j in 0..n {
        let (b0, b1) = (lower + j, lower + j + 1);
        let (t0, t1) = (upper + j, upper + j + 1);
        triangles.push([b0, b1, t1]);
        triangles.push([b0, t1, t0]);
    }
}

fn cylinder(radius: f64, height: f64, n: usize) -> Mesh {
    cone(radius, radius, height, n)
}

fn cone(radius_bottom: f64, radius_top: f64, height: f64, n: usize) -> Mesh {
    let mut nodes = Vec::new();
    let mut triangles = Vec::new();
    let seg = n as u32;

    if radius_top == 0.0 {
        nodes.extend(ring(radius_bottom, 0.0, n, true));
        let apex = nodes.len() as u32;
        nodes.push(Point3::new(0.0, 0.0, height));
        triangles.extend((0..seg).map(|j| [j, j + 1, apex]));
    } else if radius_bottom == 0.0 {
        nodes.push(Point3::origin());
        nodes.extend(ring(radius_top, height, n, true));
        triangles.extend((0..seg).map(|j| [0, j + 2, j + 1]));
    } else {
        nodes.extend(ring(radius_bottom, 0.0, n, true));
        nodes.extend(ring(radius_top, height, n, true));
        band(&mut triangles, 0, seg + 1, seg);
    }
    (nodes, triangles)
}

fn sphere(radius: f64, n: usize) -> Mesh {
    let n_lat = n.div_ceil(2).max(2);
    let seg = n as u32;

    let mut nodes = vec![Point3::new(0.0, 0.0, radius)];
    for i in 1..n_lat {
        let phi = PI * i as f64 / n_lat as f64;
        nodes.extend(ring(radius * phi.sin(), radius * phi.cos(), n, true));
    }
    let south = nodes.len() as u32;
    nodes.push(Point3::new(0.0, 0.0, -radius));

    let ring_start = |i: usize| 1 + (i as u32 - 1) * (seg + 1);
    let mut triangles = Vec::new();

    let first = ring_start(1);
    triangles.extend((0..seg).map(|j| [0, first + j, first + j + 1]));
    for i in 1..n_lat - 1 {
        // Rings run north to south, so the later ring is the lower one.
        let (upper, lower) = (ring_start(i), ring_start(i + 1));
        for j in 0..seg {
            triangles.push([upper + j, lower + j, lower + j + 1]);
            triangles.push([upper + j, lower + j + 1, upper + j + 1]);
        }
    }
    let last = ring_start(n_lat - 1);
    triangles.extend((0..seg).map(|j| [south, last + j + 1, last + j]));

    (nodes, triangles)
}
