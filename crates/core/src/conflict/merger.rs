//! Three-way merge assembly.
//!
//! Takes a [`ThreeWayDiff`] plus one outcome per conflict region and
//! rebuilds the file: stable and one-sided hunks are copied verbatim,
//! resolved regions get their replacement text, and unresolved regions are
//! rendered with standard `<<<<<<<` / `=======` / `>>>>>>>` markers.

use tracing::{debug, info};

use super::diff3::{HunkKind, Side, ThreeWayDiff};
use super::markers::{scan_markers, ConflictMarker, MarkerStyle};

/// What happened to a single conflict region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionOutcome {
    /// Replacement text for the region.
    Resolved(String),
    /// Why the region could not be resolved.
    Unresolved(String),
}

impl RegionOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// The result of assembling a merge.
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// The merged content (contains conflict markers if `has_conflicts` is true).
    pub merged_content: String,
    /// Whether every region was resolved.
    pub has_conflicts: bool,
    /// Locations of conflict markers within the merged content.
    pub conflict_markers: Vec<ConflictMarker>,
}

/// Stateless merge assembly.
pub struct Merger;

impl Merger {
    /// Merges that need no diff at all.
    ///
    /// If either side is identical to base the other side wins; if both
    /// sides are identical there is nothing to merge.
    pub fn trivial_merge<'a>(base: &str, ours: &'a str, theirs: &'a str) -> Option<&'a str> {
        if ours == theirs {
            debug!("ours == theirs, identical content");
            return Some(ours);
        }
        if theirs == base {
            debug!("theirs == base, ours wins cleanly");
            return Some(ours);
        }
        if ours == base {
            debug!("ours == base, theirs wins cleanly");
            return Some(theirs);
        }
        None
    }

    /// Rebuild the file from `diff`, using `outcomes[i]` for conflict region `i`.
    ///
    /// Resolved text is normalised to `style.eol` and keeps a trailing
    /// terminator whenever more content follows it or the replaced side
    /// ended with one. Regions without an outcome are treated as unresolved.
    pub fn assemble(diff: &ThreeWayDiff<'_>, outcomes: &[RegionOutcome], style: &MarkerStyle<'_>) -> MergeResult {
        let hunks = diff.hunks();
        let mut out = String::new();
        let mut region = 0usize;
        let mut has_conflicts = false;

        for (pos, hunk) in hunks.iter().enumerate() {
            match hunk.kind {
                HunkKind::Stable | HunkKind::OursOnly | HunkKind::BothSame => {
                    out.push_str(&diff.text(Side::Ours, hunk.ours.clone()));
                }
                HunkKind::TheirsOnly => {
                    out.push_str(&diff.text(Side::Theirs, hunk.theirs.clone()));
                }
                HunkKind::Conflict => {
                    let ours = diff.text(Side::Ours, hunk.ours.clone());
                    let theirs = diff.text(Side::Theirs, hunk.theirs.clone());
                    match outcomes.get(region) {
                        Some(RegionOutcome::Resolved(text)) => {
                            let follows = hunks[pos + 1..]
                                .iter()
                                .any(|h| !h.ours.is_empty() || !h.theirs.is_empty());
                            let replaced = if ours.is_empty() { &theirs } else { &ours };
                            let terminate = follows || replaced.ends_with('\n');
                            out.push_str(&normalize_replacement(text, style.eol, terminate));
                        }
                        _ => {
                            has_conflicts = true;
                            let base = diff.text(Side::Base, hunk.base.clone());
                            style.render(&mut out, &base, &ours, &theirs);
                        }
                    }
                    region += 1;
                }
            }
        }

        let conflict_markers = if has_conflicts {
            scan_markers(&out, style.size)
        } else {
            Vec::new()
        };
        info!(
            regions = region,
            markers = conflict_markers.len(),
            "merge assembled"
        );

        MergeResult {
            merged_content: out,
            has_conflicts,
            conflict_markers,
        }
    }
}

/// Re-terminate replacement lines with `eol`.
pub fn normalize_replacement(text: &str, eol: &str, terminate: bool) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join(eol);
    if terminate {
        out.push_str(eol);
    }
    out
}
