//! Compact line-based model script.
//!
//! One statement per line; the node id of a geometry statement is the
//! number of geometry statements before it, so the first shape is `0`.
//! Operands may only reference shapes defined on earlier lines.
//!
//! ```text
//! # cadbench 0.1
//! M name r g b metallic roughness   # Material
//! C sx sy sz ["name"]               # Box, corner at origin
//! Y r h ["name"]                    # Cylinder
//! K rb rt h ["name"]                # Cone / frustum
//! S r ["name"]                      # Sphere
//! P w h ["name"]                    # Rectangular planar face
//! U a b ["name"]                    # Fuse
//! D a b ["name"]                    # Cut
//! I a b ["name"]                    # Common
//! G a b ... ["name"]                # Compound
//! T n dx dy dz ["name"]             # Translate
//! R n rx ry rz ["name"]             # Rotate (degrees)
//! X n sx sy sz ["name"]             # Scale
//! F n ["name"]                      # Reverse orientation
//! RETURN n [material]               # Model result
//! ```
//!
//! A script without `RETURN` parses fine but returns no shape.
//!
//! # Example
//!
//! A 50x30x5 plate with a post on top:
//!
//! ```text
//! C 50 30 5 "Base Plate"
//! Y 5 10 "Post"
//! T 1 25 15 5
//! U 0 2 "Plate with Post"
//! RETURN 3
//! ```

use crate::{CsgOp, Document, MaterialDef, Node, NodeId, SceneEntry, Vec3};
use std::collections::HashMap;
use std::fmt::{self, Write as FmtWrite};

/// Current compact script version.
pub const COMPACT_VERSION: &str = "0.1";

/// Error type for compact script parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactParseError {
    /// Line number where the error occurred (1-indexed).
    pub line: usize,
    /// Description of the error.
    pub message: String,
}

impl CompactParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for CompactParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for CompactParseError {}

/// Parse a compact script into a [`Document`].
pub fn from_compact(s: &str) -> Result<Document, CompactParseError> {
    let mut doc = Document::new();
    let mut next_id: NodeId = 0;
    let mut returned: Option<(usize, SceneEntry)> = None;

    for (idx, raw) in s.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parts = split_line_respecting_quotes(trimmed);
        let Some(&opcode) = parts.first() else {
            continue;
        };

        match opcode {
            "M" => parse_material(&mut doc, &parts, line)?,
            "RETURN" => {
                if returned.is_some() {
                    return Err(CompactParseError::new(line, "multiple RETURN statements"));
                }
                returned = Some((line, parse_return(&parts, next_id, line)?));
            }
            _ => {
                let (args, name) = extract_trailing_name(&parts);
                let op = parse_geometry_opcode(opcode, &args, next_id, line)?;
                doc.nodes.insert(
                    next_id,
                    Node {
                        id: next_id,
                        name,
                        op,
                    },
                );
                next_id += 1;
            }
        }
    }

    if let Some((line, entry)) = returned {
        if let Some(material) = &entry.material {
            if !doc.materials.contains_key(material) {
                return Err(CompactParseError::new(
                    line,
                    format!("unknown material: {material}"),
                ));
            }
        }
        doc.roots.push(entry);
    }

    Ok(doc)
}

/// Convert a [`Document`] to a compact script.
///
/// Nodes are renumbered in dependency order so every operand refers to an
/// earlier line.
pub fn to_compact(doc: &Document) -> Result<String, CompactParseError> {
    let mut output = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(output, "# cadbench {COMPACT_VERSION}");

    let mut names: Vec<_> = doc.materials.keys().collect();
    names.sort();
    for name in names {
        let m = &doc.materials[name];
        let _ = writeln!(
            output,
            "M {} {} {} {} {} {}",
            m.name, m.color[0], m.color[1], m.color[2], m.metallic, m.roughness
        );
    }

    let mut ids: Vec<NodeId> = doc.nodes.keys().copied().collect();
    ids.sort_unstable();
    let mut sorted = Vec::new();
    for id in ids {
        if sorted.contains(&id) {
            continue;
        }
        let order = doc
            .evaluation_order(id)
            .map_err(|e| CompactParseError::new(0, e.to_string()))?;
        for n in order {
            if !sorted.contains(&n) {
                sorted.push(n);
            }
        }
    }

    let id_map: HashMap<NodeId, usize> = sorted.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    for id in &sorted {
        let node = &doc.nodes[id];
        let _ = writeln!(output, "{}", format_op(&node.op, &id_map, node.name.as_deref()));
    }

    if let Some(entry) = doc.result() {
        let root = id_map
            .get(&entry.root)
            .ok_or_else(|| CompactParseError::new(0, format!("missing root node {}", entry.root)))?;
        match &entry.material {
            Some(material) => {
                let _ = writeln!(output, "RETURN {root} {material}");
            }
            None => {
                let _ = writeln!(output, "RETURN {root}");
            }
        }
    }

    Ok(output)
}

fn format_op(op: &CsgOp, id_map: &HashMap<NodeId, usize>, name: Option<&str>) -> String {
    let r = |id: &NodeId| id_map[id];
    let body = match op {
        CsgOp::Cube { size } => format!("C {} {} {}", size.x, size.y, size.z),
        CsgOp::Cylinder { radius, height } => format!("Y {radius} {height}"),
        CsgOp::Cone {
            radius_bottom,
            radius_top,
            height,
        } => format!("K {radius_bottom} {radius_top} {height}"),
        CsgOp::Sphere { radius } => format!("S {radius}"),
        CsgOp::Plane { width, height } => format!("P {width} {height}"),
        CsgOp::Union { left, right } => format!("U {} {}", r(left), r(right)),
        CsgOp::Difference { left, right } => format!("D {} {}", r(left), r(right)),
        CsgOp::Intersection { left, right } => format!("I {} {}", r(left), r(right)),
        CsgOp::Compound { children } => {
            let ids: Vec<String> = children.iter().map(|c| r(c).to_string()).collect();
            format!("G {}", ids.join(" "))
        }
        CsgOp::Translate { child, offset } => {
            format!("T {} {} {} {}", r(child), offset.x, offset.y, offset.z)
        }
        CsgOp::Rotate { child, angles } => {
            format!("R {} {} {} {}", r(child), angles.x, angles.y, angles.z)
        }
        CsgOp::Scale { child, factor } => {
            format!("X {} {} {} {}", r(child), factor.x, factor.y, factor.z)
        }
        CsgOp::Reverse { child } => format!("F {}", r(child)),
    };
    match name {
        Some(n) => format!("{body} {}", format_quoted_string(n)),
        None => body,
    }
}

fn format_quoted_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Split a line by whitespace, but keep quoted strings together.
///
/// A trailing `#` outside quotes starts a comment.
fn split_line_respecting_quotes(line: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    let mut in_quotes = false;
    let mut prev = '\0';

    for (i, c) in line.char_indices() {
        if in_quotes {
            if c == '"' && prev != '\\' {
                if let Some(s) = start.take() {
                    parts.push(&line[s..=i]);
                }
                in_quotes = false;
            }
        } else if c == '"' {
            if let Some(s) = start.take() {
                parts.push(&line[s..i]);
            }
            start = Some(i);
            in_quotes = true;
        } else if c == '#' {
            if let Some(s) = start.take() {
                parts.push(&line[s..i]);
            }
            return parts;
        } else if c.is_whitespace() {
            if let Some(s) = start.take() {
                parts.push(&line[s..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
        prev = c;
    }

    if let Some(s) = start {
        parts.push(&line[s..]);
    }
    parts
}

fn parse_string_arg(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].replace("\\\"", "\"").replace("\\\\", "\\")
    } else {
        s.to_string()
    }
}

fn extract_trailing_name<'a>(parts: &[&'a str]) -> (Vec<&'a str>, Option<String>) {
    if let Some(last) = parts.last() {
        if parts.len() > 1 && last.starts_with('"') {
            return (parts[..parts.len() - 1].to_vec(), Some(parse_string_arg(last)));
        }
    }
    (parts.to_vec(), None)
}

fn parse_material(doc: &mut Document, parts: &[&str], line: usize) -> Result<(), CompactParseError> {
    expect_args("M", parts, 6, line)?;
    let name = parse_string_arg(parts[1]);
    doc.materials.insert(
        name.clone(),
        MaterialDef {
            name,
            color: [
                parse_unit(parts[2], line)?,
                parse_unit(parts[3], line)?,
                parse_unit(parts[4], line)?,
            ],
            metallic: parse_unit(parts[5], line)?,
            roughness: parse_unit(parts[6], line)?,
        },
    );
    Ok(())
}

fn parse_return(parts: &[&str], defined: NodeId, line: usize) -> Result<SceneEntry, CompactParseError> {
    if parts.len() != 2 && parts.len() != 3 {
        return Err(CompactParseError::new(
            line,
            format!("RETURN requires 1 or 2 args, got {}", parts.len() - 1),
        ));
    }
    Ok(SceneEntry {
        root: parse_ref(parts[1], defined, line)?,
        material: parts.get(2).map(|m| parse_string_arg(m)),
    })
}

fn parse_geometry_opcode(
    opcode: &str,
    parts: &[&str],
    defined: NodeId,
    line: usize,
) -> Result<CsgOp, CompactParseError> {
    let num = |i: usize| parse_f64(parts[i], line);
    let node = |i: usize| parse_ref(parts[i], defined, line);

    match opcode {
        "C" => {
            expect_args(opcode, parts, 3, line)?;
            Ok(CsgOp::Cube {
                size: Vec3::new(num(1)?, num(2)?, num(3)?),
            })
        }
        "Y" => {
            expect_args(opcode, parts, 2, line)?;
            Ok(CsgOp::Cylinder {
                radius: num(1)?,
                height: num(2)?,
            })
        }
        "K" => {
            expect_args(opcode, parts, 3, line)?;
            Ok(CsgOp::Cone {
                radius_bottom: num(1)?,
                radius_top: num(2)?,
                height: num(3)?,
            })
        }
        "S" => {
            expect_args(opcode, parts, 1, line)?;
            Ok(CsgOp::Sphere { radius: num(1)? })
        }
        "P" => {
            expect_args(opcode, parts, 2, line)?;
            Ok(CsgOp::Plane {
                width: num(1)?,
                height: num(2)?,
            })
        }
        "U" | "D" | "I" => {
            expect_args(opcode, parts, 2, line)?;
            let (left, right) = (node(1)?, node(2)?);
            Ok(match opcode {
                "U" => CsgOp::Union { left, right },
                "D" => CsgOp::Difference { left, right },
                _ => CsgOp::Intersection { left, right },
            })
        }
        "G" => {
            if parts.len() < 2 {
                return Err(CompactParseError::new(line, "G requires at least 1 arg, got 0"));
            }
            let children = (1..parts.len()).map(node).collect::<Result<Vec<_>, _>>()?;
            Ok(CsgOp::Compound { children })
        }
        "T" | "R" | "X" => {
            expect_args(opcode, parts, 4, line)?;
            let child = node(1)?;
            let v = Vec3::new(num(2)?, num(3)?, num(4)?);
            Ok(match opcode {
                "T" => CsgOp::Translate { child, offset: v },
                "R" => CsgOp::Rotate { child, angles: v },
                _ => CsgOp::Scale { child, factor: v },
            })
        }
        "F" => {
            expect_args(opcode, parts, 1, line)?;
            Ok(CsgOp::Reverse { child: node(1)? })
        }
        _ => Err(CompactParseError::new(line, format!("unknown opcode: {opcode}"))),
    }
}

fn expect_args(opcode: &str, parts: &[&str], count: usize, line: usize) -> Result<(), CompactParseError> {
    if parts.len() != count + 1 {
        return Err(CompactParseError::new(
            line,
            format!(
                "{opcode} requires {count} arg{}, got {}",
                if count == 1 { "" } else { "s" },
                parts.len() - 1
            ),
        ));
    }
    Ok(())
}

fn parse_f64(s: &str, line: usize) -> Result<f64, CompactParseError> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(CompactParseError::new(line, format!("invalid number: {s}"))),
    }
}

fn parse_unit(s: &str, line: usize) -> Result<f64, CompactParseError> {
    let v = parse_f64(s, line)?;
    if !(0.0..=1.0).contains(&v) {
        return Err(CompactParseError::new(line, format!("value out of range 0..1: {s}")));
    }
    Ok(v)
}

/// Parse a node reference; only shapes defined on earlier lines are visible.
fn parse_ref(s: &str, defined: NodeId, line: usize) -> Result<NodeId, CompactParseError> {
    let id: NodeId = s
        .parse()
        .map_err(|_| CompactParseError::new(line, format!("invalid node id: {s}")))?;
    if id >= defined {
        return Err(CompactParseError::new(line, format!("undefined node: {id}")));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_cube() {
        let doc = from_compact("C 50 30 5\nRETURN 0").unwrap();
        assert_eq!(doc.nodes.len(), 1);
        match &doc.nodes[&0].op {
            CsgOp::Cube { size } => {
                assert_eq!(size.x, 50.0);
                assert_eq!(size.y, 30.0);
                assert_eq!(size.z, 5.0);
            }
            other => panic!("expected Cube, got {other:?}"),
        }
        assert_eq!(doc.result().map(|e| e.root), Some(0));
    }

    #[test]
    fn test_plate_with_post() {
        let script = "C 50 30 5 \"Base Plate\"\nY 5 10\nT 1 25 15 5\nU 0 2 \"Plate with Post\"\nRETURN 3";
        let doc = from_compact(script).unwrap();
        assert_eq!(doc.nodes.len(), 4);
        assert_eq!(doc.nodes[&0].name.as_deref(), Some("Base Plate"));
        assert_eq!(doc.nodes[&3].op, CsgOp::Union { left: 0, right: 2 });
        assert_eq!(doc.evaluation_order(3).unwrap().len(), 4);
    }

    #[test]
    fn test_missing_return_yields_no_result() {
        let doc = from_compact("C 10 10 10").unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert!(doc.result().is_none());
    }

    #[test]
    fn test_comments_and_empty_lines() {
        let script = "# header\nC 10 10 10 # inline\n\n# another\nY 5 10\nRETURN 1";
        let doc = from_compact(script).unwrap();
        assert_eq!(doc.nodes.len(), 2);
        assert!(doc.nodes.contains_key(&1));
    }

    #[test]
    fn test_compound_and_reverse() {
        let doc = from_compact("P 1 1\nP 2 2\nG 0 1\nF 2\nRETURN 3").unwrap();
        assert_eq!(
            doc.nodes[&2].op,
            CsgOp::Compound {
                children: vec![0, 1]
            }
        );
        assert_eq!(doc.nodes[&3].op, CsgOp::Reverse { child: 2 });
    }

    #[test]
    fn test_material_on_return() {
        let doc = from_compact("M red 1 0 0 0 0.4\nS 3\nRETURN 0 red").unwrap();
        assert_eq!(doc.result_material().color, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_parse_error_unknown_material() {
        let err = from_compact("S 3\nRETURN 0 gold").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unknown material"));
    }

    #[test]
    fn test_parse_error_invalid_opcode() {
        let err = from_compact("Z 10 10 10").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("unknown opcode"));
    }

    #[test]
    fn test_parse_error_wrong_arg_count() {
        let err = from_compact("C 10 10").unwrap_err();
        assert!(err.message.contains("requires 3 args"));
    }

    #[test]
    fn test_parse_error_invalid_number() {
        let err = from_compact("\nC 10 abc 10").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("invalid number"));
    }

    #[test]
    fn test_parse_error_forward_reference() {
        let err = from_compact("C 1 1 1\nT 1 0 0 0").unwrap_err();
        assert!(err.message.contains("undefined node: 1"));
    }

    #[test]
    fn test_parse_error_double_return() {
        let err = from_compact("S 1\nRETURN 0\nRETURN 0").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_negative_and_fractional_numbers() {
        let doc = from_compact("C 10 10 10\nT 0 -5.5 -10 1e-3\nRETURN 1").unwrap();
        match &doc.nodes[&1].op {
            CsgOp::Translate { offset, .. } => {
                assert_eq!(offset.x, -5.5);
                assert_eq!(offset.z, 0.001);
            }
            other => panic!("expected Translate, got {other:?}"),
        }
    }

    #[test]
    fn test_to_compact_renumbers_dependencies_first() {
        let mut doc = Document::new();
        doc.nodes.insert(
            9,
            Node {
                id: 9,
                name: Some("tilted".into()),
                op: CsgOp::Rotate {
                    child: 4,
                    angles: Vec3::new(0.0, 0.0, 45.0),
                },
            },
        );
        doc.nodes.insert(
            4,
            Node {
                id: 4,
                name: None,
                op: CsgOp::Plane {
                    width: 2.0,
                    height: 3.0,
                },
            },
        );
        doc.roots.push(SceneEntry {
            root: 9,
            material: None,
        });

        let text = to_compact(&doc).unwrap();
        assert!(text.contains("P 2 3\n"));
        assert!(text.contains("R 0 0 0 45 \"tilted\"\n"));
        assert!(text.contains("RETURN 1\n"));

        let reparsed = from_compact(&text).unwrap();
        assert_eq!(reparsed.nodes.len(), 2);
        assert_eq!(reparsed.result().map(|e| e.root), Some(1));
    }
}
