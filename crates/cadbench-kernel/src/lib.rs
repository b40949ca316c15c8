#![warn(missing_docs)]

//! Reference B-rep kernel for cadbench.
//!
//! The [`Kernel`] owns every shape it creates and hands out [`ShapeId`]
//! handles. Shapes are immutable `Arc` snapshots: operations read a shape,
//! build a new one outside the lock and store it under a fresh handle.
//! Meshing is the one operation that updates a shape in place, attaching
//! triangulations to its faces.
//!
//! The surface mirrors what cadbench needs from a geometry kernel:
//! primitives, placements, compounds, incremental meshing, a face
//! explorer, a STEP writer and a virtual filesystem. Loading is
//! asynchronous and cached per process, see [`initialize`].

pub mod cache;
pub mod error;
pub mod math;
pub mod mesh;
pub mod primitives;
pub mod shape;
pub mod step;
pub mod vfs;

pub use cache::{global_cache, initialize, loaded, AssetCache, KernelCache, KernelOptions};
pub use error::{KernelError, Result};
pub use math::{Location, Point3, Vec3, CONFUSION};
pub use shape::{Face, FaceExplorer, Orientation, Shape, ShapeId, ShapeKind, Surface, Triangulation};
pub use step::{ReturnStatus, StepModelType, StepWriter};
pub use vfs::VirtualFs;

use slotmap::SlotMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// A geometry kernel instance.
#[derive(Debug, Default)]
pub struct Kernel {
    shapes: RwLock<SlotMap<ShapeId, Arc<Shape>>>,
    fs: VirtualFs,
    step_files: Mutex<()>,
}

impl Kernel {
    /// Create a kernel with no shapes and an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, shape: Shape) -> ShapeId {
        self.shapes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Arc::new(shape))
    }

    /// Snapshot of a live shape.
    pub fn shape(&self, id: ShapeId) -> Result<Arc<Shape>> {
        self.shapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or(KernelError::UnknownShape)
    }

    /// Release a shape. Returns whether the handle was live.
    pub fn release(&self, id: ShapeId) -> bool {
        self.shapes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Number of live shapes.
    pub fn live_shapes(&self) -> usize {
        self.shapes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// The kernel's virtual filesystem.
    pub fn fs(&self) -> &VirtualFs {
        &self.fs
    }

    /// Exclusive use of the STEP writer and its VFS files.
    ///
    /// Hold the guard from the stale-file cleanup until the written file has
    /// been read back and removed.
    pub fn lock_step_files(&self) -> MutexGuard<'_, ()> {
        self.step_files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A fresh STEP writer bound to this kernel.
    pub fn step_writer(&self) -> StepWriter<'_> {
        StepWriter::new(self)
    }

    /// Iterate over the faces of a shape.
    ///
    /// Returns the snapshot; call [`Shape::explore_faces`] on it.
    pub fn faces(&self, id: ShapeId) -> Result<Arc<Shape>> {
        self.shape(id)
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    /// Box spanning `[0, sx] x [0, sy] x [0, sz]`.
    pub fn make_box(&self, sx: f64, sy: f64, sz: f64) -> Result<ShapeId> {
        Ok(self.insert(primitives::make_box(sx, sy, sz)?))
    }

    /// Cylinder around +Z standing on the XY plane.
    pub fn make_cylinder(&self, radius: f64, height: f64) -> Result<ShapeId> {
        Ok(self.insert(primitives::make_cylinder(radius, height)?))
    }

    /// Cone or frustum around +Z standing on the XY plane.
    pub fn make_cone(&self, radius_bottom: f64, radius_top: f64, height: f64) -> Result<ShapeId> {
        Ok(self.insert(primitives::make_cone(radius_bottom, radius_top, height)?))
    }

    /// Sphere centered at the origin.
    pub fn make_sphere(&self, radius: f64) -> Result<ShapeId> {
        Ok(self.insert(primitives::make_sphere(radius)?))
    }

    /// Rectangular face `[0, width] x [0, height]` facing +Z.
    pub fn make_plane_face(&self, width: f64, height: f64) -> Result<ShapeId> {
        Ok(self.insert(primitives::make_plane_face(width, height)?))
    }

    // =========================================================================
    // Placements
    // =========================================================================

    /// Place a copy of `id` under `location`.
    pub fn transform(&self, id: ShapeId, location: &Location) -> Result<ShapeId> {
        if !location.matrix.iter().all(|v| v.is_finite()) {
            return Err(KernelError::InvalidParameter(
                "placement must be finite".into(),
            ));
        }
        let shape = self.shape(id)?;
        Ok(self.insert(shape.transformed(location)))
    }

    /// Translated copy.
    pub fn translate(&self, id: ShapeId, dx: f64, dy: f64, dz: f64) -> Result<ShapeId> {
        self.transform(id, &Location::translation(dx, dy, dz))
    }

    /// Rotated copy. Angles in degrees, applied about X, then Y, then Z.
    pub fn rotate(&self, id: ShapeId, rx: f64, ry: f64, rz: f64) -> Result<ShapeId> {
        self.transform(id, &Location::rotation_euler_degrees(rx, ry, rz))
    }

    /// Scaled copy. Negative factors mirror; zero factors are rejected.
    pub fn scale(&self, id: ShapeId, sx: f64, sy: f64, sz: f64) -> Result<ShapeId> {
        if [sx, sy, sz].iter().any(|s| *s == 0.0) {
            return Err(KernelError::InvalidParameter(
                "scale factors must be non-zero".into(),
            ));
        }
        self.transform(id, &Location::scale(sx, sy, sz))
    }

    /// Copy with every face orientation flipped.
    pub fn reversed(&self, id: ShapeId) -> Result<ShapeId> {
        let shape = self.shape(id)?;
        Ok(self.insert(shape.reversed()))
    }

    // =========================================================================
    // Combination
    // =========================================================================

    /// Compound of the given shapes.
    pub fn compound(&self, ids: &[ShapeId]) -> Result<ShapeId> {
        if ids.is_empty() {
            return Err(KernelError::InvalidParameter(
                "compound needs at least one shape".into(),
            ));
        }
        let mut faces = Vec::new();
        for &id in ids {
            faces.extend(self.shape(id)?.faces.iter().cloned());
        }
        Ok(self.insert(Shape::new(ShapeKind::Compound, faces)))
    }

    /// Union of two shapes.
    ///
    /// Built as an assembly: the faces of both operands are kept, overlapping
    /// volumes are not merged.
    pub fn fuse(&self, a: ShapeId, b: ShapeId) -> Result<ShapeId> {
        self.compound(&[a, b])
    }

    /// Difference `a - b`. Not available in this kernel.
    pub fn cut(&self, a: ShapeId, b: ShapeId) -> Result<ShapeId> {
        self.shape(a)?;
        self.shape(b)?;
        Err(KernelError::Unsupported("cut".into()))
    }

    /// Intersection of two shapes. Not available in this kernel.
    pub fn common(&self, a: ShapeId, b: ShapeId) -> Result<ShapeId> {
        self.shape(a)?;
        self.shape(b)?;
        Err(KernelError::Unsupported("common".into()))
    }

    // =========================================================================
    // Meshing
    // =========================================================================

    /// Attach triangulations to every face of `id` that lacks one fine
    /// enough for the given deflections.
    pub fn incremental_mesh(&self, id: ShapeId, linear: f64, angular: f64) -> Result<()> {
        let shape = self.shape(id)?;
        let meshed = mesh::mesh_shape(&shape, linear, angular)?;
        let mut shapes = self.shapes.write().unwrap_or_else(PoisonError::into_inner);
        let slot = shapes.get_mut(id).ok_or(KernelError::UnknownShape)?;
        *slot = Arc::new(meshed);
        Ok(())
    }
}
