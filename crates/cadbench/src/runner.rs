//! Model script runner.
//!
//! A model is declarative: either a compact script or a JSON [`Document`].
//! It is parsed into the document DAG and evaluated against the kernel, so
//! the kernel is the only thing a model can reach.

use crate::error::WorkbenchError;
use cadbench_ir::{CsgOp, Document, NodeId};
use cadbench_kernel::{Kernel, ShapeId};
use std::collections::HashMap;
use std::fmt;

/// What went wrong while building a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildErrorKind {
    /// The source could not be parsed or its graph is malformed.
    Syntax,
    /// The kernel rejected an operation.
    Runtime,
    /// The model does not name a result.
    NoShapeReturned,
}

impl fmt::Display for BuildErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildErrorKind::Syntax => "syntax error",
            BuildErrorKind::Runtime => "runtime error",
            BuildErrorKind::NoShapeReturned => "no shape returned",
        })
    }
}

/// A model failed to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelBuildError {
    /// Error category.
    pub kind: BuildErrorKind,
    /// Human-readable description.
    pub message: String,
    /// 1-based source line, when known.
    pub line: Option<usize>,
}

impl ModelBuildError {
    fn new(kind: BuildErrorKind, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for ModelBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} at line {line}: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ModelBuildError {}

/// Parse model source. Text starting with `{` is a JSON document, anything
/// else a compact script.
pub fn parse_model(source: &str) -> Result<Document, ModelBuildError> {
    if source.trim_start().starts_with('{') {
        Document::from_json(source).map_err(|e| {
            ModelBuildError::new(BuildErrorKind::Syntax, e.to_string(), Some(e.line()))
        })
    } else {
        cadbench_ir::from_compact(source).map_err(|e| {
            ModelBuildError::new(BuildErrorKind::Syntax, e.message, Some(e.line))
        })
    }
}

/// Evaluate `doc` in `kernel` and return the handle of its result.
///
/// Intermediate shapes are released before returning, on success and on
/// failure, so the only shape left behind is the returned one.
pub fn build_model(kernel: &Kernel, doc: &Document) -> Result<ShapeId, ModelBuildError> {
    let entry = doc.result().ok_or_else(|| {
        ModelBuildError::new(
            BuildErrorKind::NoShapeReturned,
            "model did not return a shape",
            None,
        )
    })?;
    let order = doc
        .evaluation_order(entry.root)
        .map_err(|e| ModelBuildError::new(BuildErrorKind::Syntax, e.to_string(), None))?;

    let mut shapes: HashMap<NodeId, ShapeId> = HashMap::with_capacity(order.len());
    let mut outcome = Ok(());
    for id in order {
        // evaluation_order only yields ids present in the document
        let Some(node) = doc.nodes.get(&id) else {
            continue;
        };
        match eval_op(kernel, &node.op, &shapes) {
            Ok(shape) => {
                shapes.insert(id, shape);
            }
            Err(e) => {
                let label = match &node.name {
                    Some(name) => format!("node {id} ({name})"),
                    None => format!("node {id}"),
                };
                outcome = Err(ModelBuildError::new(
                    BuildErrorKind::Runtime,
                    format!("{label}: {e}"),
                    None,
                ));
                break;
            }
        }
    }

    let result = shapes.remove(&entry.root);
    for (_, shape) in shapes {
        kernel.release(shape);
    }
    match (outcome, result) {
        (Ok(()), Some(shape)) => Ok(shape),
        (Err(e), result) => {
            if let Some(shape) = result {
                kernel.release(shape);
            }
            Err(e)
        }
        (Ok(()), None) => Err(ModelBuildError::new(
            BuildErrorKind::NoShapeReturned,
            "model did not return a shape",
            None,
        )),
    }
}

fn eval_op(
    kernel: &Kernel,
    op: &CsgOp,
    shapes: &HashMap<NodeId, ShapeId>,
) -> cadbench_kernel::Result<ShapeId> {
    let get = |id: &NodeId| {
        shapes
            .get(id)
            .copied()
            .ok_or(cadbench_kernel::KernelError::UnknownShape)
    };
    match op {
        CsgOp::Cube { size } => kernel.make_box(size.x, size.y, size.z),
        CsgOp::Cylinder { radius, height } => kernel.make_cylinder(*radius, *height),
        CsgOp::Cone {
            radius_bottom,
            radius_top,
            height,
        } => kernel.make_cone(*radius_bottom, *radius_top, *height),
        CsgOp::Sphere { radius } => kernel.make_sphere(*radius),
        CsgOp::Plane { width, height } => kernel.make_plane_face(*width, *height),
        CsgOp::Union { left, right } => kernel.fuse(get(left)?, get(right)?),
        CsgOp::Difference { left, right } => kernel.cut(get(left)?, get(right)?),
        CsgOp::Intersection { left, right } => kernel.common(get(left)?, get(right)?),
        CsgOp::Compound { children } => {
            let ids = children.iter().map(get).collect::<Result<Vec<_>, _>>()?;
            kernel.compound(&ids)
        }
        CsgOp::Translate { child, offset } => {
            kernel.translate(get(child)?, offset.x, offset.y, offset.z)
        }
        CsgOp::Rotate { child, angles } => kernel.rotate(get(child)?, angles.x, angles.y, angles.z),
        CsgOp::Scale { child, factor } => kernel.scale(get(child)?, factor.x, factor.y, factor.z),
        CsgOp::Reverse { child } => kernel.reversed(get(child)?),
    }
}

/// Run model source against the loaded kernel.
///
/// Never releases any shape the caller already holds.
pub fn run_model(kernel: Option<&Kernel>, source: &str) -> Result<ShapeId, WorkbenchError> {
    let kernel = kernel.ok_or(WorkbenchError::KernelNotReady)?;
    let doc = parse_model(source)?;
    let shape = build_model(kernel, &doc)?;
    tracing::debug!(nodes = doc.nodes.len(), "model built");
    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_err(kernel: &Kernel, source: &str) -> ModelBuildError {
        match run_model(Some(kernel), source) {
            Err(WorkbenchError::ModelBuild(e)) => e,
            other => panic!("expected a build error, got {other:?}"),
        }
    }

    #[test]
    fn test_kernel_not_ready() {
        assert!(matches!(
            run_model(None, "C 1 1 1\nRETURN 0"),
            Err(WorkbenchError::KernelNotReady)
        ));
    }

    #[test]
    fn test_compact_model_leaves_one_shape() {
        let kernel = Kernel::new();
        let source = "C 50 30 5 \"Base\"\nY 5 10\nT 1 25 15 5\nU 0 2\nRETURN 3\n";
        let shape = run_model(Some(&kernel), source).unwrap();
        assert_eq!(kernel.live_shapes(), 1);
        // Box faces plus cylinder side and two caps.
        assert_eq!(kernel.shape(shape).unwrap().num_faces(), 6 + 3);
    }

    #[test]
    fn test_json_model() {
        let kernel = Kernel::new();
        let doc = parse_model("S 2\nRETURN 0").unwrap();
        let json = doc.to_json().unwrap();
        let shape = run_model(Some(&kernel), &json).unwrap();
        assert_eq!(kernel.shape(shape).unwrap().num_faces(), 1);
    }

    #[test]
    fn test_missing_return() {
        let kernel = Kernel::new();
        let err = build_err(&kernel, "C 1 1 1\n");
        assert_eq!(err.kind, BuildErrorKind::NoShapeReturned);
        assert!(err.message.contains("did not return a shape"));
        assert_eq!(kernel.live_shapes(), 0);
    }

    #[test]
    fn test_syntax_errors_carry_lines() {
        let kernel = Kernel::new();
        let err = build_err(&kernel, "C 1 1 1\nQ 3\nRETURN 0");
        assert_eq!(err.kind, BuildErrorKind::Syntax);
        assert_eq!(err.line, Some(2));

        let err = build_err(&kernel, "{ \"version\": ");
        assert_eq!(err.kind, BuildErrorKind::Syntax);
    }

    #[test]
    fn test_runtime_error_releases_intermediates() {
        let kernel = Kernel::new();
        let err = build_err(&kernel, "C 1 1 1\nS 1\nD 0 1 \"hole\"\nRETURN 2");
        assert_eq!(err.kind, BuildErrorKind::Runtime);
        assert!(err.message.contains("hole"));
        assert_eq!(kernel.live_shapes(), 0);

        let err = build_err(&kernel, "Y -1 2\nRETURN 0");
        assert_eq!(err.kind, BuildErrorKind::Runtime);
        assert_eq!(kernel.live_shapes(), 0);
    }

    #[test]
    fn test_existing_shapes_untouched() {
        let kernel = Kernel::new();
        let held = kernel.make_box(1.0, 1.0, 1.0).unwrap();
        let _ = run_model(Some(&kernel), "S -1\nRETURN 0");
        let _ = run_model(Some(&kernel), "P 1 1\nRETURN 0").unwrap();
        assert!(kernel.shape(held).is_ok());
        assert_eq!(kernel.live_shapes(), 2);
    }

    #[test]
    fn test_deep_chain_on_small_stack() {
        const DEPTH: usize = 100_000;
        let mut source = String::from("P 1 1\n");
        for i in 0..DEPTH {
            source.push_str(&format!("F {i}\n"));
        }
        source.push_str(&format!("RETURN {DEPTH}\n"));

        let live = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || {
                let kernel = Kernel::new();
                run_model(Some(&kernel), &source).map(|_| kernel.live_shapes())
            })
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(live.unwrap(), 1);
    }
}
