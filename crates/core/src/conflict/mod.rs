//! Conflict detection and merge assembly.
//!
//! The conflict subsystem is responsible for:
//! 1. **Diffing** -- line-level two-way diffs and the three-way hunk split.
//! 2. **Detection** -- classifying hunks and exposing the conflict regions.
//! 3. **Assembly** -- splicing resolutions back in, or rendering markers.

pub mod diff;
pub mod diff3;
pub mod markers;
pub mod merger;

pub use diff3::{ConflictRegion, Hunk, HunkKind, Side, ThreeWayDiff};
pub use markers::{has_conflict_markers, scan_markers, ConflictMarker, MarkerStyle};
pub use merger::{MergeResult, Merger, RegionOutcome};
