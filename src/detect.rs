//! Conflict detection over task snapshots.
//!
//! Given two or more [`TaskSnapshot`]s for the same file, the detector
//! decides whether the edits compose automatically. The decision procedure,
//! evaluated pairwise and reduced to the most severe verdict:
//!
//! 1. Either snapshot has no changes: [`ConflictVerdict::NoConflict`].
//! 2. Both snapshots are additive-only and no change in one overlaps any
//!    change in the other: [`ConflictVerdict::AutoMergeable`]. Disjoint
//!    additive edits compose safely by union.
//! 3. Any overlapping pair with a non-additive side:
//!    [`ConflictVerdict::RequiresResolution`].
//! 4. Overlapping but purely additive on both sides: still
//!    [`ConflictVerdict::RequiresResolution`]. Two additions at the same
//!    structural location cannot be ordered automatically; reordering
//!    effectful calls silently is worse than escalating.
//!
//! The additive-and-disjoint / additive-and-overlapping asymmetry is the
//! central correctness rule of the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::change::SemanticChange;
use crate::model::snapshot::TaskSnapshot;

// ---------------------------------------------------------------------------
// ConflictVerdict
// ---------------------------------------------------------------------------

/// The detector's decision for a set of snapshots of one file.
///
/// Ordered by severity: `NoConflict < AutoMergeable < RequiresResolution`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConflictVerdict {
    /// At most one side actually changed; nothing to reconcile.
    NoConflict,
    /// Disjoint additive edits; a deterministic union merge is safe.
    AutoMergeable,
    /// The edits cannot be combined automatically; escalate.
    RequiresResolution,
}

impl ConflictVerdict {
    /// Returns `true` when escalation to the external resolver is needed.
    #[must_use]
    pub const fn needs_resolution(self) -> bool {
        matches!(self, Self::RequiresResolution)
    }
}

impl fmt::Display for ConflictVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoConflict => write!(f, "no conflict"),
            Self::AutoMergeable => write!(f, "auto-mergeable"),
            Self::RequiresResolution => write!(f, "requires resolution"),
        }
    }
}

// ---------------------------------------------------------------------------
// ConflictDetector
// ---------------------------------------------------------------------------

/// Stateless decision procedure over read-only snapshot views.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    /// Create a detector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classify one pair of snapshots for the same file.
    #[must_use]
    pub fn classify_pair(&self, a: &TaskSnapshot, b: &TaskSnapshot) -> ConflictVerdict {
        if a.changes.is_empty() || b.changes.is_empty() {
            return ConflictVerdict::NoConflict;
        }

        let overlapping = Self::has_overlap(a, b);
        if !overlapping && a.is_additive_only() && b.is_additive_only() {
            return ConflictVerdict::AutoMergeable;
        }
        if overlapping {
            // Non-additive overlap and additive-but-overlapping both land
            // here; see the module docs for why the additive case is not
            // relaxed.
            return ConflictVerdict::RequiresResolution;
        }

        // Disjoint but with at least one non-additive side: the edits touch
        // different scopes, yet a modification or removal can invalidate
        // assumptions the other side relies on. Escalate.
        ConflictVerdict::RequiresResolution
    }

    /// Classify an N-way set of snapshots: the most severe pairwise verdict.
    ///
    /// Fewer than two snapshots is trivially [`ConflictVerdict::NoConflict`].
    #[must_use]
    pub fn classify(&self, snapshots: &[&TaskSnapshot]) -> ConflictVerdict {
        let mut verdict = ConflictVerdict::NoConflict;
        for (i, a) in snapshots.iter().enumerate() {
            for b in &snapshots[i + 1..] {
                verdict = verdict.max(self.classify_pair(a, b));
                if verdict == ConflictVerdict::RequiresResolution {
                    return verdict;
                }
            }
        }
        verdict
    }

    /// Collect the change pairs that overlap across two snapshots, for
    /// handing to the external resolver as conflict context.
    #[must_use]
    pub fn overlapping_changes<'a>(
        &self,
        a: &'a TaskSnapshot,
        b: &'a TaskSnapshot,
    ) -> Vec<(&'a SemanticChange, &'a SemanticChange)> {
        let mut pairs = Vec::new();
        for change_a in &a.changes {
            for change_b in &b.changes {
                if change_a.overlaps_with(change_b) {
                    pairs.push((change_a, change_b));
                }
            }
        }
        pairs
    }

    fn has_overlap(a: &TaskSnapshot, b: &TaskSnapshot) -> bool {
        a.changes
            .iter()
            .any(|ca| b.changes.iter().any(|cb| ca.overlaps_with(cb)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
