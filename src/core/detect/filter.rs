use crate::core::catalog::{ClassCatalog, ClassId};
use crate::core::detect::detector::Detection;
use crate::core::error::{ExtractError, Result};
use std::collections::BTreeSet;

/// Classes the caller wants extracted. Every member is a catalog key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetClassSet {
    ids: BTreeSet<ClassId>,
}

impl TargetClassSet {
    pub fn contains(&self, class_id: ClassId) -> bool {
        self.ids.contains(&class_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Explicit ids when given and non-empty, otherwise every catalog class.
/// Ids missing from the catalog are rejected.
pub fn resolve_targets(catalog: &ClassCatalog, explicit: Option<&[ClassId]>) -> Result<TargetClassSet> {
    let explicit = match explicit {
        Some(ids) if !ids.is_empty() => ids,
        _ => {
            return Ok(TargetClassSet {
                ids: catalog.ids().collect(),
            })
        }
    };

    let unknown: BTreeSet<ClassId> = explicit
        .iter()
        .copied()
        .filter(|id| !catalog.contains(*id))
        .collect();
    if !unknown.is_empty() {
        return Err(ExtractError::Validation(format!(
            "unknown class ids: {:?}",
            unknown
        )));
    }

    Ok(TargetClassSet {
        ids: explicit.iter().copied().collect(),
    })
}

pub fn in_scope(detection: &Detection, targets: &TargetClassSet) -> bool {
    targets.contains(detection.class_id)
}
