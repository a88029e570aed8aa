//! Map a decision vector back onto the candidate primitives.
//!
//! Candidates are walked in the same two-level order the problem was built in.
//! SMALL primitives never own a slot and are always kept for later iterations;
//! every other primitive consumes the next slot and is kept (and tagged ACTIVE)
//! iff its value rounds to a positive integer. Slots past the last primitive
//! are auxiliary (cluster) variables.

use crate::error::StructuralMismatch;
use crate::primitive::{decided_count, Primitive, PrimitiveSet, Status};

/// Whether a decision value counts as "selected".
#[inline]
pub fn is_on(value: f64) -> bool {
    value.round() > 0.0
}

/// A primitive carried into the output, with the slot it consumed (None for SMALL).
#[derive(Clone, Debug, PartialEq)]
pub struct Kept {
    pub primitive: Primitive,
    pub slot: Option<usize>,
}

/// Result of mapping one decision vector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    /// Kept primitives in enumeration order.
    pub kept: Vec<Kept>,
    /// First slot not owned by a primitive.
    pub cluster_vars_start: usize,
}

impl Selection {
    /// Selected primitives with their slots.
    pub fn selected(&self) -> impl Iterator<Item = (usize, &Primitive)> + '_ {
        self.kept
            .iter()
            .filter_map(|k| k.slot.map(|s| (s, &k.primitive)))
    }

    /// SMALL primitives deferred to a later iteration.
    pub fn deferred(&self) -> impl Iterator<Item = &Primitive> + '_ {
        self.kept
            .iter()
            .filter(|k| k.slot.is_none())
            .map(|k| &k.primitive)
    }

    /// Output collection: one group, enumeration order.
    pub fn to_set(&self) -> PrimitiveSet {
        vec![self.kept.iter().map(|k| k.primitive.clone()).collect()]
    }
}

/// Apply `x` to `candidates`, retagging selected primitives ACTIVE in place.
///
/// Fails without touching `candidates` if `x` has fewer entries than there are
/// non-SMALL primitives.
pub fn apply(candidates: &mut PrimitiveSet, x: &[f64]) -> Result<Selection, StructuralMismatch> {
    let expected = decided_count(candidates);
    if x.len() < expected {
        return Err(StructuralMismatch {
            len: x.len(),
            expected,
            what: "the non-small candidates",
        });
    }

    let mut kept = Vec::new();
    let mut slot = 0usize;
    for group in candidates.iter_mut() {
        for prim in group.iter_mut() {
            if prim.is_small() {
                kept.push(Kept {
                    primitive: prim.clone(),
                    slot: None,
                });
                continue;
            }
            if is_on(x[slot]) {
                prim.status = Status::Active;
                kept.push(Kept {
                    primitive: prim.clone(),
                    slot: Some(slot),
                });
            }
            slot += 1;
        }
    }
    tracing::debug!(
        cluster_vars_start = slot,
        auxiliary = x.len() - slot,
        kept = kept.len(),
        "selection applied"
    );
    Ok(Selection {
        kept,
        cluster_vars_start: slot,
    })
}
