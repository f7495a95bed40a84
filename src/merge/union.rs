//! Deterministic union merge for disjoint additive edits.
//!
//! When every divergent side of a file only ADDED code, and no two sides
//! touched the same structural scope, the merged file is reconstructed
//! directly from the base text plus each side's recorded additions:
//!
//! - new imports are spliced in after the base's last import (or after a
//!   Go package clause, or at the top of the file),
//! - functions that gained hook calls replace their base scope's text,
//! - new functions and classes are appended at the end, in side order.
//!
//! Any condition the reconstruction cannot prove safe (a non-additive
//! change, overlapping scopes, a missing scope span, an edit with no
//! recorded text) refuses with `None` and the caller escalates instead.
//! Given the same base and sides, the output is always byte-identical.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::analyze::{SemanticAnalyzer, source_layout};
use crate::model::change::{ChangeKind, SemanticChange};

/// Attempt a union merge of `sides` over `base`.
///
/// Returns the merged text, or `None` when the edits are not provably
/// disjoint additions.
pub(crate) fn additive_union(
    file_path: &Path,
    base: &str,
    sides: &[&str],
    analyzer: &SemanticAnalyzer,
) -> Option<String> {
    if sides.is_empty() {
        return None;
    }

    // Analyze each side against the base and check the union preconditions.
    let mut per_side_changes: Vec<Vec<SemanticChange>> = Vec::with_capacity(sides.len());
    for side in sides {
        if *side == base {
            per_side_changes.push(Vec::new());
            continue;
        }
        let analysis = analyzer.analyze(file_path, base, side);
        if analysis.changes.is_empty() {
            // Textually different but semantically silent (comment edits,
            // unsupported language): not reconstructable.
            return None;
        }
        if !analysis.is_additive_only() {
            return None;
        }
        per_side_changes.push(analysis.changes);
    }

    // Disjointness across sides: no scope may be touched twice.
    let mut seen_locations: BTreeSet<&str> = BTreeSet::new();
    for changes in &per_side_changes {
        let side_locations: BTreeSet<&str> =
            changes.iter().map(|c| c.location.as_str()).collect();
        for location in side_locations {
            if !seen_locations.insert(location) {
                return None;
            }
        }
    }

    let layout = source_layout(file_path, base)?;

    // Build the edit plan in base coordinates.
    let mut imports: Vec<&str> = Vec::new();
    let mut appends: Vec<&str> = Vec::new();
    let mut replacements: BTreeMap<(usize, usize), &str> = BTreeMap::new();

    for changes in &per_side_changes {
        for change in changes {
            let text = change.content_after.as_deref()?;
            match change.change_type {
                ChangeKind::AddImport => imports.push(text),
                ChangeKind::AddFunction | ChangeKind::AddClass => appends.push(text),
                ChangeKind::AddHookCall => {
                    let span = *layout.scopes.get(&change.location)?;
                    // Several hook calls in one scope share the same
                    // replacement text (the scope's full new content).
                    replacements.insert(span, text);
                }
                _ => return None,
            }
        }
    }

    Some(apply_plan(base, &layout, &imports, &appends, &replacements))
}

/// Apply the edit plan. Replacements run back-to-front so earlier spans
/// keep their base offsets; the import splice and appends follow.
fn apply_plan(
    base: &str,
    layout: &crate::analyze::SourceLayout,
    imports: &[&str],
    appends: &[&str],
    replacements: &BTreeMap<(usize, usize), &str>,
) -> String {
    let mut merged = base.to_owned();

    for (&(start, end), text) in replacements.iter().rev() {
        merged.replace_range(start..end, text);
    }

    // Offsets below the import point are unaffected by scope replacements
    // only when scopes sit after the imports, which holds for top-level
    // items; recompute the splice position on the merged text to be safe.
    if !imports.is_empty() {
        let at = import_splice_position(&merged, layout.import_insert_at);
        let mut block = imports.join("\n");
        block.push('\n');
        merged.insert_str(at, &block);
    }

    for text in appends {
        if !merged.ends_with('\n') {
            merged.push('\n');
        }
        merged.push('\n');
        merged.push_str(text.trim_end());
        merged.push('\n');
    }

    merged
}

/// Position in `merged` where the import block goes: the start of the line
/// following the base's last import (or package clause), or offset zero.
///
/// The text up to the insert point is unchanged by scope replacements
/// (imports precede every replaced scope), so the base offset stays valid.
fn import_splice_position(merged: &str, base_insert_at: usize) -> usize {
    if base_insert_at == 0 {
        return 0;
    }
    let anchor_end = base_insert_at.min(merged.len());
    merged[anchor_end..]
        .find('\n')
        .map_or(merged.len(), |i| anchor_end + i + 1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
