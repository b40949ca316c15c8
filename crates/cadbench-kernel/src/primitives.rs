//! Analytic primitive construction.
//!
//! Every primitive is corner- or base-aligned at the origin: boxes span
//! `[0, sx] x [0, sy] x [0, sz]`, cylinders and cones stand on the XY plane
//! around +Z, spheres are centered at the origin.

use crate::error::{KernelError, Result};
use crate::math::Location;
use crate::shape::{Face, Orientation, Shape, ShapeKind, Surface};
use std::f64::consts::FRAC_PI_2;

fn positive(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(KernelError::InvalidParameter(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

fn non_negative(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(KernelError::InvalidParameter(format!(
            "{name} must not be negative, got {value}"
        )))
    }
}

/// Box with six planar faces, outward oriented.
pub(crate) fn make_box(sx: f64, sy: f64, sz: f64) -> Result<Shape> {
    let sx = positive("box width", sx)?;
    let sy = positive("box depth", sy)?;
    let sz = positive("box height", sz)?;

    // Natural normal of a rectangle is +Z; rot_x(90) sends it to -Y, rot_y(-90) to -X.
    let front = Location::rotation_x(FRAC_PI_2);
    let left = Location::rotation_y(-FRAC_PI_2);
    let rect = |width, height| Surface::Rectangle { width, height };

    let faces = vec![
        Face::new(rect(sx, sy), Location::identity(), Orientation::Reversed),
        Face::new(
            rect(sx, sy),
            Location::translation(0.0, 0.0, sz),
            Orientation::Forward,
        ),
        Face::new(rect(sx, sz), front.clone(), Orientation::Forward),
        Face::new(
            rect(sx, sz),
            Location::translation(0.0, sy, 0.0).then(&front),
            Orientation::Reversed,
        ),
        Face::new(rect(sz, sy), left.clone(), Orientation::Forward),
        Face::new(
            rect(sz, sy),
            Location::translation(sx, 0.0, 0.0).then(&left),
            Orientation::Reversed,
        ),
    ];
    Ok(Shape::new(ShapeKind::Solid, faces))
}

/// Cylinder standing on the XY plane: lateral face plus two caps.
pub(crate) fn make_cylinder(radius: f64, height: f64) -> Result<Shape> {
    let radius = positive("cylinder radius", radius)?;
    let height = positive("cylinder height", height)?;
    let faces = vec![
        Face::new(
            Surface::Cylinder { radius, height },
            Location::identity(),
            Orientation::Forward,
        ),
        Face::new(
            Surface::Disk { radius },
            Location::identity(),
            Orientation::Reversed,
        ),
        Face::new(
            Surface::Disk { radius },
            Location::translation(0.0, 0.0, height),
            Orientation::Forward,
        ),
    ];
    Ok(Shape::new(ShapeKind::Solid, faces))
}

/// Cone or frustum standing on the XY plane.
///
/// A zero radius at either end produces an apex and no cap there. Equal
/// radii produce a cylinder.
pub(crate) fn make_cone(radius_bottom: f64, radius_top: f64, height: f64) -> Result<Shape> {
    let rb = non_negative("cone bottom radius", radius_bottom)?;
    let rt = non_negative("cone top radius", radius_top)?;
    let height = positive("cone height", height)?;
    if rb == 0.0 && rt == 0.0 {
        return Err(KernelError::InvalidParameter(
            "cone needs at least one non-zero radius".into(),
        ));
    }
    if rb == rt {
        return make_cylinder(rb, height);
    }

    let mut faces = vec![Face::new(
        Surface::Cone {
            radius_bottom: rb,
            radius_top: rt,
            height,
        },
        Location::identity(),
        Orientation::Forward,
    )];
    if rb > 0.0 {
        faces.push(Face::new(
            Surface::Disk { radius: rb },
            Location::identity(),
            Orientation::Reversed,
        ));
    }
    if rt > 0.0 {
        faces.push(Face::new(
            Surface::Disk { radius: rt },
            Location::translation(0.0, 0.0, height),
            Orientation::Forward,
        ));
    }
    Ok(Shape::new(ShapeKind::Solid, faces))
}

/// Sphere centered at the origin.
pub(crate) fn make_sphere(radius: f64) -> Result<Shape> {
    let radius = positive("sphere radius", radius)?;
    Ok(Shape::new(
        ShapeKind::Solid,
        vec![Face::new(
            Surface::Sphere { radius },
            Location::identity(),
            Orientation::Forward,
        )],
    ))
}

/// Rectangular planar face `[0, width] x [0, height]` facing +Z.
pub(crate) fn make_plane_face(width: f64, height: f64) -> Result<Shape> {
    let width = positive("face width", width)?;
    let height = positive("face height", height)?;
    Ok(Shape::new(
        ShapeKind::Face,
        vec![Face::new(
            Surface::Rectangle { width, height },
            Location::identity(),
            Orientation::Forward,
        )],
    ))
}
