//! STEP (ISO 10303-21, AP214) writer.
//!
//! Shapes are first transferred into the writer, which checks that they can
//! be represented, then written as one Part 21 file into the kernel's
//! virtual filesystem. Writer operations report a [`ReturnStatus`]; callers
//! must treat anything but [`ReturnStatus::Done`] as failure.

use crate::math::{Point3, Vec3};
use crate::shape::{Face, Orientation, Shape, ShapeId, ShapeKind, Surface};
use crate::Kernel;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Outcome of a writer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnStatus {
    /// Nothing to do.
    Void,
    /// Completed.
    Done,
    /// Invalid request.
    Error,
    /// The data could not be processed.
    Fail,
    /// Aborted.
    Stop,
}

/// How a shape is represented in the STEP model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepModelType {
    /// Solids as manifold solid B-reps, everything else as surface models.
    #[default]
    AsIs,
    /// Only solids are accepted.
    ManifoldSolidBrep,
    /// Everything as a shell-based surface model.
    ShellBasedSurfaceModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Solid,
    Surface,
}

/// Accumulates transferred shapes and writes them as a STEP file.
pub struct StepWriter<'k> {
    kernel: &'k Kernel,
    roots: Vec<(Arc<Shape>, Item)>,
}

impl<'k> StepWriter<'k> {
    /// Create an empty writer bound to `kernel`.
    pub fn new(kernel: &'k Kernel) -> Self {
        Self {
            kernel,
            roots: Vec::new(),
        }
    }

    /// Number of shapes transferred so far.
    pub fn num_roots(&self) -> usize {
        self.roots.len()
    }

    /// Add a shape to the model.
    pub fn transfer(&mut self, id: ShapeId, mode: StepModelType) -> ReturnStatus {
        let Ok(shape) = self.kernel.shape(id) else {
            return ReturnStatus::Fail;
        };
        if shape.num_faces() == 0 {
            return ReturnStatus::Void;
        }
        let item = match (mode, shape.kind()) {
            (StepModelType::ShellBasedSurfaceModel, _) => Item::Surface,
            (_, ShapeKind::Solid) => Item::Solid,
            (StepModelType::ManifoldSolidBrep, kind) => {
                tracing::debug!(?kind, "not a solid, refusing manifold transfer");
                return ReturnStatus::Fail;
            }
            (StepModelType::AsIs, _) => Item::Surface,
        };
        if !shape.explore_faces().all(representable) {
            tracing::debug!("curved face under non-uniform scale cannot be written");
            return ReturnStatus::Fail;
        }
        self.roots.push((shape, item));
        ReturnStatus::Done
    }

    /// Write every transferred shape to `path` in the virtual filesystem.
    pub fn write(&self, path: &str) -> ReturnStatus {
        if self.roots.is_empty() {
            return ReturnStatus::Void;
        }
        if path.is_empty() {
            return ReturnStatus::Error;
        }
        let name = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model");
        let text = self.encode(name);
        tracing::debug!(path, bytes = text.len(), "STEP file written");
        self.kernel.fs().write_file(path, text.into_bytes());
        ReturnStatus::Done
    }

    fn encode(&self, name: &str) -> String {
        let name = escape(name);
        let mut data = StepData::default();
        let (shape_definition, context) = data.product(&name);

        let mut items = Vec::with_capacity(self.roots.len());
        for (shape, item) in &self.roots {
            let faces: Vec<u64> = shape.explore_faces().map(|f| data.face(f)).collect();
            let id = match item {
                Item::Solid => {
                    let shell = data.add(format!("CLOSED_SHELL('', ({}))", refs(&faces)));
                    data.add(format!("MANIFOLD_SOLID_BREP('{name}', #{shell})"))
                }
                Item::Surface => {
                    let shell = data.add(format!("OPEN_SHELL('', ({}))", refs(&faces)));
                    data.add(format!("SHELL_BASED_SURFACE_MODEL('{name}', (#{shell}))"))
                }
            };
            items.push(id);
        }

        let representation = if self.roots.iter().all(|(_, i)| *i == Item::Solid) {
            "ADVANCED_BREP_SHAPE_REPRESENTATION"
        } else if self.roots.iter().all(|(_, i)| *i == Item::Surface) {
            "MANIFOLD_SURFACE_SHAPE_REPRESENTATION"
        } else {
            "SHAPE_REPRESENTATION"
        };
        let origin = data.placement(&Point3::origin(), &Vec3::z(), &Vec3::x());
        items.push(origin);
        let rep = data.add(format!(
            "{representation}('{name}', ({}), #{context})",
            refs(&items)
        ));
        data.add(format!(
            "SHAPE_DEFINITION_REPRESENTATION(#{shape_definition}, #{rep})"
        ));

        let mut out = String::new();
        out.push_str("ISO-10303-21;\nHEADER;\n");
        out.push_str("FILE_DESCRIPTION(('cadbench model'), '2;1');\n");
        out.push_str(&format!(
            "FILE_NAME('{name}', '', (''), (''), 'cadbench', 'cadbench', '');\n"
        ));
        out.push_str("FILE_SCHEMA(('AUTOMOTIVE_DESIGN { 1 0 10303 214 1 1 1 1 }'));\n");
        out.push_str("ENDSEC;\nDATA;\n");
        for (i, entity) in data.entities.iter().enumerate() {
            out.push_str(&format!("#{} = {};\n", i + 1, entity));
        }
        out.push_str("ENDSEC;\nEND-ISO-10303-21;\n");
        out
    }
}

/// Curved surfaces stay analytic only under similarity placements.
fn representable(face: &Face) -> bool {
    matches!(face.surface(), Surface::Rectangle { .. }) || face.location().uniform_scale().is_some()
}

fn flag(value: bool) -> &'static str {
    if value {
        ".T."
    } else {
        ".F."
    }
}

fn refs(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape(text: &str) -> String {
    text.replace('\'', "''")
}

/// Rotation round-off like 6e-17 is written as zero.
fn clean(v: f64) -> f64 {
    if v.abs() < 1e-12 {
        0.0
    } else {
        v
    }
}

fn quantize(p: &Point3) -> [i64; 3] {
    [p.x, p.y, p.z].map(|c| (c * 1e6).round() as i64)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EdgeKey {
    Line(u64, u64),
    Circle {
        vertex: u64,
        center: [i64; 3],
        axis: [i64; 3],
        radius: i64,
    },
}

/// Entity list under construction. Vertices and edges are shared between
/// faces so solids come out as closed shells.
#[derive(Default)]
struct StepData {
    entities: Vec<String>,
    vertices: HashMap<[i64; 3], u64>,
    edges: HashMap<EdgeKey, (u64, u64)>,
}

impl StepData {
    fn add(&mut self, entity: String) -> u64 {
        self.entities.push(entity);
        self.entities.len() as u64
    }

    /// Product structure and geometric context. Returns the product
    /// definition shape and the representation context.
    fn product(&mut self, name: &str) -> (u64, u64) {
        let app = self.add("APPLICATION_CONTEXT('automotive_design')".into());
        self.add(format!(
            "APPLICATION_PROTOCOL_DEFINITION('draft international standard', 'automotive_design', 1998, #{app})"
        ));
        let product_context = self.add(format!("PRODUCT_CONTEXT('', #{app}, 'mechanical')"));
        let product = self.add(format!(
            "PRODUCT('{name}', '{name}', '', (#{product_context}))"
        ));
        let formation = self.add(format!("PRODUCT_DEFINITION_FORMATION('', '', #{product})"));
        let definition_context = self.add(format!(
            "PRODUCT_DEFINITION_CONTEXT('part definition', #{app}, 'design')"
        ));
        let definition = self.add(format!(
            "PRODUCT_DEFINITION('design', '', #{formation}, #{definition_context})"
        ));
        let shape = self.add(format!("PRODUCT_DEFINITION_SHAPE('', '', #{definition})"));

        let length = self.add("(LENGTH_UNIT() NAMED_UNIT(*) SI_UNIT(.MILLI.,.METRE.))".into());
        let angle = self.add("(NAMED_UNIT(*) PLANE_ANGLE_UNIT() SI_UNIT($,.RADIAN.))".into());
        let solid_angle = self.add("(NAMED_UNIT(*) SI_UNIT($,.STERADIAN.) SOLID_ANGLE_UNIT())".into());
        let uncertainty = self.add(format!(
            "UNCERTAINTY_MEASURE_WITH_UNIT(LENGTH_MEASURE(1.E-07), #{length}, 'distance_accuracy_value', 'confusion accuracy')"
        ));
        let context = self.add(format!(
            "(GEOMETRIC_REPRESENTATION_CONTEXT(3) GLOBAL_UNCERTAINTY_ASSIGNED_CONTEXT((#{uncertainty})) \
             GLOBAL_UNIT_ASSIGNED_CONTEXT((#{length}, #{angle}, #{solid_angle})) \
             REPRESENTATION_CONTEXT('Context #1', '3D Context with UNIT and UNCERTAINTY'))"
        ));
        (shape, context)
    }

    fn point(&mut self, p: &Point3) -> u64 {
        self.add(format!(
            "CARTESIAN_POINT('', ({:.15E}, {:.15E}, {:.15E}))",
            clean(p.x),
            clean(p.y),
            clean(p.z)
        ))
    }

    fn direction(&mut self, d: &Vec3) -> u64 {
        self.add(format!(
            "DIRECTION('', ({:.15E}, {:.15E}, {:.15E}))",
            clean(d.x),
            clean(d.y),
            clean(d.z)
        ))
    }

    fn placement(&mut self, origin: &Point3, axis: &Vec3, ref_dir: &Vec3) -> u64 {
        let p = self.point(origin);
        let a = self.direction(axis);
        let r = self.direction(ref_dir);
        self.add(format!("AXIS2_PLACEMENT_3D('', #{p}, #{a}, #{r})"))
    }

    fn vertex(&mut self, p: &Point3) -> u64 {
        let key = quantize(p);
        if let Some(&id) = self.vertices.get(&key) {
            return id;
        }
        let point = self.point(p);
        let id = self.add(format!("VERTEX_POINT('', #{point})"));
        self.vertices.insert(key, id);
        id
    }

    /// Oriented straight edge from `a` to `b`.
    fn line_edge(&mut self, a: &Point3, b: &Point3) -> u64 {
        let (va, vb) = (self.vertex(a), self.vertex(b));
        let key = EdgeKey::Line(va.min(vb), va.max(vb));
        let (edge, start) = match self.edges.get(&key) {
            Some(&entry) => entry,
            None => {
                let delta = b - a;
                let origin = self.point(a);
                let dir = self.direction(&delta.normalize());
                let vector = self.add(format!("VECTOR('', #{dir}, {:.15E})", delta.norm()));
                let line = self.add(format!("LINE('', #{origin}, #{vector})"));
                let edge = self.add(format!("EDGE_CURVE('', #{va}, #{vb}, #{line}, .T.)"));
                self.edges.insert(key, (edge, va));
                (edge, va)
            }
        };
        self.add(format!(
            "ORIENTED_EDGE('', *, *, #{edge}, {})",
            flag(start == va)
        ))
    }

    /// Oriented full-circle edge, counter-clockwise about `axis`.
    fn circle_edge(&mut self, center: &Point3, axis: &Vec3, ref_dir: &Vec3, radius: f64) -> u64 {
        let start = center + ref_dir * radius;
        let vertex = self.vertex(&start);
        let key = EdgeKey::Circle {
            vertex,
            center: quantize(center),
            axis: quantize(&Point3::from(*axis)),
            radius: (radius * 1e6).round() as i64,
        };
        let edge = match self.edges.get(&key) {
            Some(&(edge, _)) => edge,
            None => {
                let placement = self.placement(center, axis, ref_dir);
                let circle = self.add(format!("CIRCLE('', #{placement}, {radius:.15E})"));
                let edge = self.add(format!(
                    "EDGE_CURVE('', #{vertex}, #{vertex}, #{circle}, .T.)"
                ));
                self.edges.insert(key, (edge, vertex));
                edge
            }
        };
        self.add(format!("ORIENTED_EDGE('', *, *, #{edge}, .T.)"))
    }

    fn bound(&mut self, edges: &[u64], orientation: bool, outer: bool) -> u64 {
        let edge_loop = self.add(format!("EDGE_LOOP('', ({}))", refs(edges)));
        let kind = if outer { "FACE_OUTER_BOUND" } else { "FACE_BOUND" };
        self.add(format!("{kind}('', #{edge_loop}, {})", flag(orientation)))
    }

    fn vertex_bound(&mut self, p: &Point3) -> u64 {
        let vertex = self.vertex(p);
        let vertex_loop = self.add(format!("VERTEX_LOOP('', #{vertex})"));
        self.add(format!("FACE_BOUND('', #{vertex_loop}, .T.)"))
    }

    fn advanced_face(&mut self, bounds: &[u64], surface: u64, same_sense: bool) -> u64 {
        self.add(format!(
            "ADVANCED_FACE('', ({}), #{surface}, {})",
            refs(bounds),
            flag(same_sense)
        ))
    }

    fn face(&mut self, face: &Face) -> u64 {
        let loc = face.location();
        let forward = face.orientation() == Orientation::Forward;

        // Everything but rectangles uses the right-handed frame of the local
        // Z axis, whose normals point outward whatever the placement's handedness.
        // Rectangles take their normal from the placed edges instead.
        let scale = loc.uniform_scale().unwrap_or_else(|| loc.max_scale());
        let origin = loc.apply_point(&Point3::origin());
        let axis = loc.apply_vec(&Vec3::z()).normalize();
        let ref_dir = loc.apply_vec(&Vec3::x()).normalize();
        let same_sense = forward != (loc.determinant() < 0.0);
        // Bottom circles run counter-clockwise around the face interior.
        let circle_bound = |data: &mut StepData, z: f64, r: f64, bottom: bool| {
            let center = origin + axis * z;
            let edge = data.circle_edge(&center, &axis, &ref_dir, r);
            data.bound(&[edge], bottom == same_sense, true)
        };

        match *face.surface() {
            Surface::Rectangle { width, height } => {
                let corners = [(0.0, 0.0), (width, 0.0), (width, height), (0.0, height)]
                    .map(|(x, y)| loc.apply_point(&Point3::new(x, y, 0.0)));
                let ex = loc.apply_vec(&Vec3::x());
                let ey = loc.apply_vec(&Vec3::y());
                let normal = ex.cross(&ey).normalize();
                let placement = self.placement(&corners[0], &normal, &ex.normalize());
                let plane = self.add(format!("PLANE('', #{placement})"));
                let edges: Vec<u64> = (0..4)
                    .map(|i| self.line_edge(&corners[i], &corners[(i + 1) % 4]))
                    .collect();
                let bound = self.bound(&edges, forward, true);
                self.advanced_face(&[bound], plane, forward)
            }
            Surface::Disk { radius } => {
                let placement = self.placement(&origin, &axis, &ref_dir);
                let plane = self.add(format!("PLANE('', #{placement})"));
                let bound = circle_bound(self, 0.0, radius * scale, true);
                self.advanced_face(&[bound], plane, same_sense)
            }
            Surface::Cylinder { radius, height } => {
                let r = radius * scale;
                let placement = self.placement(&origin, &axis, &ref_dir);
                let surface = self.add(format!("CYLINDRICAL_SURFACE('', #{placement}, {r:.15E})"));
                let bottom = circle_bound(self, 0.0, r, true);
                let top = circle_bound(self, height * scale, r, false);
                self.advanced_face(&[bottom, top], surface, same_sense)
            }
            Surface::Cone {
                radius_bottom,
                radius_top,
                height,
            } => {
                let (rb, rt, h) = (radius_bottom * scale, radius_top * scale, height * scale);
                // The STEP cone widens along its axis, so narrow end first.
                let (apex_side, radius, cone_axis) = if rt > rb {
                    (origin, rb, axis)
                } else {
                    (origin + axis * h, rt, -axis)
                };
                let placement = self.placement(&apex_side, &cone_axis, &ref_dir);
                let semi_angle = ((rb - rt).abs() / h).atan();
                let surface = self.add(format!(
                    "CONICAL_SURFACE('', #{placement}, {radius:.15E}, {semi_angle:.15E})"
                ));
                let bottom = if rb > 0.0 {
                    circle_bound(self, 0.0, rb, true)
                } else {
                    self.vertex_bound(&origin)
                };
                let top = if rt > 0.0 {
                    circle_bound(self, h, rt, false)
                } else {
                    self.vertex_bound(&(origin + axis * h))
                };
                self.advanced_face(&[bottom, top], surface, same_sense)
            }
            Surface::Sphere { radius } => {
                let r = radius * scale;
                let placement = self.placement(&origin, &axis, &ref_dir);
                let surface = self.add(format!("SPHERICAL_SURFACE('', #{placement}, {r:.15E})"));
                let pole = self.vertex_bound(&(origin + axis * r));
                self.advanced_face(&[pole], surface, same_sense)
            }
        }
    }
}
