//! Math types for the reference kernel.
//!
//! Thin wrappers around nalgebra: points, vectors and the affine
//! [`Location`] that places a face in model space.

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// Distance below which two points are considered coincident.
pub const CONFUSION: f64 = 1e-7;

/// Affine placement of a face or shape in model space.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// The underlying 4x4 matrix.
    pub matrix: Matrix4<f64>,
}

impl Location {
    /// Identity placement.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            matrix: Matrix4::new_translation(&Vec3::new(dx, dy, dz)),
        }
    }

    /// Non-uniform scale by `(sx, sy, sz)` about the origin.
    pub fn scale(sx: f64, sy: f64, sz: f64) -> Self {
        Self {
            matrix: Matrix4::new_nonuniform_scaling(&Vec3::new(sx, sy, sz)),
        }
    }

    /// Rotation about the X axis by `angle` radians.
    pub fn rotation_x(angle: f64) -> Self {
        Self {
            matrix: Matrix4::from_axis_angle(&Vec3::x_axis(), angle),
        }
    }

    /// Rotation about the Y axis by `angle` radians.
    pub fn rotation_y(angle: f64) -> Self {
        Self {
            matrix: Matrix4::from_axis_angle(&Vec3::y_axis(), angle),
        }
    }

    /// Rotation about the Z axis by `angle` radians.
    pub fn rotation_z(angle: f64) -> Self {
        Self {
            matrix: Matrix4::from_axis_angle(&Vec3::z_axis(), angle),
        }
    }

    /// Euler rotation in degrees, applied X first, then Y, then Z.
    pub fn rotation_euler_degrees(rx: f64, ry: f64, rz: f64) -> Self {
        Self::rotation_z(rz.to_radians())
            .then(&Self::rotation_y(ry.to_radians()))
            .then(&Self::rotation_x(rx.to_radians()))
    }

    /// Compose: the result applies `other` first, then `self`.
    pub fn then(&self, other: &Location) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        let v = self.matrix * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v.x, v.y, v.z)
    }

    /// Transform a direction vector (translation ignored).
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        self.linear() * v
    }

    /// Upper-left 3x3 block.
    pub fn linear(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Determinant of the linear part. Negative for mirroring placements.
    pub fn determinant(&self) -> f64 {
        self.linear().determinant()
    }

    /// Length scale along each local axis.
    pub fn axis_scales(&self) -> [f64; 3] {
        let m = self.linear();
        [m.column(0).norm(), m.column(1).norm(), m.column(2).norm()]
    }

    /// Largest length scale of the placement.
    pub fn max_scale(&self) -> f64 {
        let [a, b, c] = self.axis_scales();
        a.max(b).max(c)
    }

    /// The common scale factor if the linear part is a similarity
    /// (rotation/mirror times a uniform scale).
    pub fn uniform_scale(&self) -> Option<f64> {
        let m = self.linear();
        let [a, b, c] = self.axis_scales();
        let s = (a + b + c) / 3.0;
        if s <= 0.0 {
            return None;
        }
        let tol = 1e-9 * s;
        let orthogonal = m.column(0).dot(&m.column(1)).abs() < tol * s
            && m.column(1).dot(&m.column(2)).abs() < tol * s
            && m.column(0).dot(&m.column(2)).abs() < tol * s;
        ((a - s).abs() < tol && (b - s).abs() < tol && (c - s).abs() < tol && orthogonal)
            .then_some(s)
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_translation() {
        let p = Location::translation(10.0, 20.0, 30.0).apply_point(&Point3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(p, Point3::new(11.0, 22.0, 33.0), epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_x_maps_plane_normal_to_minus_y() {
        let n = Location::rotation_x(FRAC_PI_2).apply_vec(&Vec3::z());
        assert_relative_eq!(n, -Vec3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_euler_order_x_then_z() {
        // X first: (0,1,0) -> (0,0,1); Z does not move +Z.
        let p = Location::rotation_euler_degrees(90.0, 0.0, 90.0).apply_vec(&Vec3::y());
        assert_relative_eq!(p, Vec3::z(), epsilon = 1e-12);
        // Z last: (1,0,0) stays under X, then goes to +Y.
        let q = Location::rotation_euler_degrees(90.0, 0.0, 90.0).apply_vec(&Vec3::x());
        assert_relative_eq!(q, Vec3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_compose_applies_right_operand_first() {
        let loc = Location::scale(2.0, 2.0, 2.0).then(&Location::translation(1.0, 0.0, 0.0));
        assert_relative_eq!(loc.apply_point(&Point3::origin()), Point3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_mirror_has_negative_determinant() {
        assert!(Location::scale(-1.0, 1.0, 1.0).determinant() < 0.0);
        assert!(Location::rotation_z(1.0).determinant() > 0.0);
    }

    #[test]
    fn test_uniform_scale_detection() {
        let similar = Location::rotation_z(0.3).then(&Location::scale(2.0, 2.0, 2.0));
        assert_relative_eq!(similar.uniform_scale().unwrap(), 2.0, epsilon = 1e-12);
        assert!(Location::scale(1.0, 2.0, 1.0).uniform_scale().is_none());
        assert_relative_eq!(Location::scale(1.0, 3.0, 1.0).max_scale(), 3.0);
    }
}
