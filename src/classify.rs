//! Field classification: requested name patterns → scalar / vector groups.
//!
//! Runs once when the exporter is built. Fields registered later are not
//! picked up; the groups are fixed for the lifetime of the exporter.

use crate::host::{FieldKind, FieldLookup, FieldRegistry};
use crate::mesh_error::MeshWriteError;
use regex::Regex;

/// Names selected for export, in registry order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldClassification {
    pub scalar_fields: Vec<String>,
    pub vector_fields: Vec<String>,
}

impl FieldClassification {
    /// Number of fields that will be written.
    pub fn matched(&self) -> usize {
        self.scalar_fields.len() + self.vector_fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matched() == 0
    }
}

/// Compiles `objectNames` entries as whole-name regular expressions.
pub fn compile_patterns(names: &[String]) -> Result<Vec<Regex>, MeshWriteError> {
    names
        .iter()
        .map(|name| {
            Regex::new(&format!("^(?:{name})$")).map_err(|e| {
                MeshWriteError::InvalidObjectPattern {
                    pattern: name.clone(),
                    reason: e.to_string(),
                }
            })
        })
        .collect()
}

#[derive(Debug, PartialEq)]
enum Verdict {
    Scalar,
    Vector,
    /// Listed by the registry but not a volume field (a cloud, a tensor).
    Skip,
    Unsupported(FieldKind),
}

fn verdict<R: FieldRegistry + ?Sized>(registry: &R, obj: &str) -> Verdict {
    match registry.lookup_field(obj) {
        FieldLookup::Scalar(_) => Verdict::Scalar,
        FieldLookup::Vector(_) => Verdict::Vector,
        FieldLookup::Unsupported(kind) if kind.is_tensor() => Verdict::Skip,
        FieldLookup::Unsupported(kind) => Verdict::Unsupported(kind.clone()),
        FieldLookup::NotFound => Verdict::Skip,
    }
}

/// Buckets every registry object matched by `requested` by its kind.
///
/// Tensor-family fields and listed objects that are not fields (clouds) are
/// dropped silently. Patterns matching nothing are reported as warnings
/// together with the list of available objects, objects of unknown type with
/// their type.
pub fn classify_fields<R>(
    requested: &[String],
    registry: &R,
) -> Result<FieldClassification, MeshWriteError>
where
    R: FieldRegistry + ?Sized,
{
    let patterns = compile_patterns(requested)?;
    let available = registry.object_names();
    let mut out = FieldClassification::default();

    for (pattern, name) in patterns.iter().zip(requested) {
        if !available.iter().any(|obj| pattern.is_match(obj)) {
            log::warn!(
                "Object {name} not found in database. Available objects: {:?}",
                available
            );
        }
    }

    for obj in available
        .iter()
        .filter(|obj| patterns.iter().any(|p| p.is_match(obj)))
    {
        match verdict(registry, obj) {
            Verdict::Scalar => out.scalar_fields.push(obj.clone()),
            Verdict::Vector => out.vector_fields.push(obj.clone()),
            Verdict::Skip => log::debug!("Object {obj} is not a volume field; skipped"),
            Verdict::Unsupported(kind) => {
                log::warn!("Object {obj} has unsupported type {kind:?}; not written");
            }
        }
    }
    Ok(out)
}
