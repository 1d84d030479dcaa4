//! Default ordering rules for stage output.
//!
//! When a stage has no explicit sort, results are still given a stable,
//! useful order:
//!
//! 1. If any output field is a date/timestamp dimension, sort by the first
//!    such field descending ("newest first").
//! 2. Else, if any output field is a measure, sort by the first measure
//!    descending ("largest first").
//! 3. Else, preserve the field-definition order ascending.
//!
//! An explicit sort always overrides all three and defaults to ascending.

use crate::model::query::OrderDir;

use super::ir::{ColumnKind, OrderBySpec, OrderTarget, OutputColumn};

/// Compute the ordering for a stage's output columns when no explicit sort
/// was written.
pub fn default_ordering(columns: &[OutputColumn]) -> Vec<OrderBySpec> {
    // Rule 1: newest first
    if let Some(pos) = columns.iter().position(|c| {
        matches!(c.kind, ColumnKind::Dimension { .. }) && c.value_type.is_temporal()
    }) {
        return vec![OrderBySpec {
            target: OrderTarget::Ordinal(pos + 1),
            dir: OrderDir::Desc,
        }];
    }

    // Rule 2: largest first
    if let Some(pos) = columns
        .iter()
        .position(|c| matches!(c.kind, ColumnKind::Aggregate(_)))
    {
        return vec![OrderBySpec {
            target: OrderTarget::Ordinal(pos + 1),
            dir: OrderDir::Desc,
        }];
    }

    // Rule 3: definition order
    columns
        .iter()
        .enumerate()
        .filter(|(_, c)| !matches!(c.kind, ColumnKind::Turtle { .. }))
        .map(|(i, _)| OrderBySpec {
            target: OrderTarget::Ordinal(i + 1),
            dir: OrderDir::Asc,
        })
        .collect()
}
