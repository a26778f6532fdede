//! Three-way diff: splits base/ours/theirs into hunks and finds the
//! regions where both sides diverged from the base.

use std::ops::Range;

use tracing::debug;

use super::diff::{matching_lines, split_lines};

/// How a hunk relates to the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunkKind {
    /// Unchanged on both sides.
    Stable,
    /// Only ours changed; keep ours.
    OursOnly,
    /// Only theirs changed; take theirs.
    TheirsOnly,
    /// Both sides made the identical change.
    BothSame,
    /// Both sides changed the same span differently.
    Conflict,
}

impl std::fmt::Display for HunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stable => write!(f, "stable"),
            Self::OursOnly => write!(f, "ours-only"),
            Self::TheirsOnly => write!(f, "theirs-only"),
            Self::BothSame => write!(f, "both-same"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// A contiguous segment of the three-way diff. Ranges are 0-based line
/// offsets into the respective file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub kind: HunkKind,
    pub base: Range<usize>,
    pub ours: Range<usize>,
    pub theirs: Range<usize>,
}

/// A span where ours and theirs diverge from base in different ways.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRegion {
    /// Position among the file's conflict regions, starting at 0.
    pub index: usize,
    pub base: Range<usize>,
    pub ours: Range<usize>,
    pub theirs: Range<usize>,
}

/// Which version of the file a line range refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Base,
    Ours,
    Theirs,
}

/// Result of diffing the three versions of one file.
#[derive(Debug, Clone)]
pub struct ThreeWayDiff<'a> {
    base: Vec<&'a str>,
    ours: Vec<&'a str>,
    theirs: Vec<&'a str>,
    hunks: Vec<Hunk>,
}

impl<'a> ThreeWayDiff<'a> {
    /// Diff `ours` and `theirs` against `base`.
    pub fn compute(base: &'a str, ours: &'a str, theirs: &'a str) -> Self {
        let base_lines = split_lines(base);
        let ours_lines = split_lines(ours);
        let theirs_lines = split_lines(theirs);

        let mut in_ours = vec![None; base_lines.len()];
        for (b, o) in matching_lines(base, ours) {
            in_ours[b] = Some(o);
        }
        let mut in_theirs = vec![None; base_lines.len()];
        for (b, t) in matching_lines(base, theirs) {
            in_theirs[b] = Some(t);
        }

        let mut diff = Self {
            base: base_lines,
            ours: ours_lines,
            theirs: theirs_lines,
            hunks: Vec::new(),
        };

        let (mut b, mut o, mut t) = (0usize, 0usize, 0usize);
        loop {
            // Next base line present on both sides, or the end of all three.
            let anchor = (b..diff.base.len())
                .find_map(|i| Some((i, in_ours[i]?, in_theirs[i]?)))
                .unwrap_or((diff.base.len(), diff.ours.len(), diff.theirs.len()));
            let (nb, no, nt) = anchor;

            if nb > b || no > o || nt > t {
                let kind = diff.classify(b..nb, o..no, t..nt);
                diff.push(kind, b..nb, o..no, t..nt);
            }
            if nb == diff.base.len() {
                break;
            }
            diff.push(HunkKind::Stable, nb..nb + 1, no..no + 1, nt..nt + 1);
            b = nb + 1;
            o = no + 1;
            t = nt + 1;
        }

        debug!(
            hunks = diff.hunks.len(),
            conflicts = diff.conflict_count(),
            "three-way diff computed"
        );
        diff
    }

    fn classify(&self, base: Range<usize>, ours: Range<usize>, theirs: Range<usize>) -> HunkKind {
        let b = &self.base[base];
        let o = &self.ours[ours];
        let t = &self.theirs[theirs];
        if o == b {
            HunkKind::TheirsOnly
        } else if t == b {
            HunkKind::OursOnly
        } else if o == t {
            HunkKind::BothSame
        } else {
            HunkKind::Conflict
        }
    }

    /// Append a hunk, merging consecutive stable lines into one hunk.
    fn push(&mut self, kind: HunkKind, base: Range<usize>, ours: Range<usize>, theirs: Range<usize>) {
        if kind == HunkKind::Stable {
            if let Some(last) = self.hunks.last_mut() {
                if last.kind == HunkKind::Stable {
                    last.base.end = base.end;
                    last.ours.end = ours.end;
                    last.theirs.end = theirs.end;
                    return;
                }
            }
        }
        self.hunks.push(Hunk {
            kind,
            base,
            ours,
            theirs,
        });
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    pub fn conflict_count(&self) -> usize {
        self.hunks
            .iter()
            .filter(|h| h.kind == HunkKind::Conflict)
            .count()
    }

    /// `true` when no region needs outside judgment.
    pub fn is_clean(&self) -> bool {
        self.conflict_count() == 0
    }

    /// Conflict regions in file order.
    pub fn conflicts(&self) -> Vec<ConflictRegion> {
        self.hunks
            .iter()
            .filter(|h| h.kind == HunkKind::Conflict)
            .enumerate()
            .map(|(index, h)| ConflictRegion {
                index,
                base: h.base.clone(),
                ours: h.ours.clone(),
                theirs: h.theirs.clone(),
            })
            .collect()
    }

    /// All lines of one side.
    pub fn lines(&self, side: Side) -> &[&'a str] {
        match side {
            Side::Base => &self.base,
            Side::Ours => &self.ours,
            Side::Theirs => &self.theirs,
        }
    }

    /// Concatenated text of a line range on one side.
    pub fn text(&self, side: Side, range: Range<usize>) -> String {
        self.lines(side)[range].concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(diff: &ThreeWayDiff<'_>) -> Vec<HunkKind> {
        diff.hunks().iter().map(|h| h.kind).collect()
    }

    #[test]
    fn test_identical_files() {
        let text = "a\nb\nc\n";
        let diff = ThreeWayDiff::compute(text, text, text);
        assert_eq!(kinds(&diff), vec![HunkKind::Stable]);
        assert!(diff.is_clean());
    }

    #[test]
    fn test_non_overlapping_changes() {
        let base = "aaa\nbbb\nccc\nddd\neee\n";
        let ours = "AAA\nbbb\nccc\nddd\neee\n";
        let theirs = "aaa\nbbb\nccc\nddd\nEEE\n";
        let diff = ThreeWayDiff::compute(base, ours, theirs);
        assert_eq!(
            kinds(&diff),
            vec![HunkKind::OursOnly, HunkKind::Stable, HunkKind::TheirsOnly]
        );
        assert!(diff.is_clean());
    }

    #[test]
    fn test_adjacent_edits_conflict() {
        let diff = ThreeWayDiff::compute("a\nb\nc\n", "a\nB\nc\n", "a\nb\nC\n");
        assert_eq!(kinds(&diff), vec![HunkKind::Stable, HunkKind::Conflict]);

        let regions = diff.conflicts();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].base, 1..3);
        assert_eq!(regions[0].ours, 1..3);
        assert_eq!(regions[0].theirs, 1..3);
        assert_eq!(diff.text(Side::Ours, regions[0].ours.clone()), "B\nc\n");
        assert_eq!(diff.text(Side::Theirs, regions[0].theirs.clone()), "b\nC\n");
    }

    #[test]
    fn test_conflicting_changes() {
        let base = "line1\noriginal\nline3\n";
        let ours = "line1\nours_version\nline3\n";
        let theirs = "line1\ntheirs_version\nline3\n";
        let diff = ThreeWayDiff::compute(base, ours, theirs);
        assert_eq!(
            kinds(&diff),
            vec![HunkKind::Stable, HunkKind::Conflict, HunkKind::Stable]
        );
        let region = &diff.conflicts()[0];
        assert_eq!(region.base, 1..2);
        assert_eq!(diff.text(Side::Base, region.base.clone()), "original\n");
    }

    #[test]
    fn test_same_change_both_sides() {
        let diff = ThreeWayDiff::compute("x\nold\ny\n", "x\nnew\ny\n", "x\nnew\ny\n");
        assert_eq!(
            kinds(&diff),
            vec![HunkKind::Stable, HunkKind::BothSame, HunkKind::Stable]
        );
    }

    #[test]
    fn test_insertions_at_same_point_conflict() {
        let diff = ThreeWayDiff::compute("a\nz\n", "a\nours\nz\n", "a\ntheirs\nz\n");
        let regions = diff.conflicts();
        assert_eq!(regions.len(), 1);
        assert!(regions[0].base.is_empty());
        assert_eq!(regions[0].ours, 1..2);
        assert_eq!(regions[0].theirs, 1..2);
    }

    #[test]
    fn test_empty_base() {
        let diff = ThreeWayDiff::compute("", "ours\n", "theirs\n");
        assert_eq!(kinds(&diff), vec![HunkKind::Conflict]);
        let diff = ThreeWayDiff::compute("", "", "theirs\n");
        assert_eq!(kinds(&diff), vec![HunkKind::TheirsOnly]);
    }

    #[test]
    fn test_multiple_regions_are_indexed_in_order() {
        let base = "1\n2\n3\n4\n5\n6\n7\n";
        let ours = "1\nA\n3\n4\n5\nC\n7\n";
        let theirs = "1\nB\n3\n4\n5\nD\n7\n";
        let diff = ThreeWayDiff::compute(base, ours, theirs);
        let regions = diff.conflicts();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].index, 0);
        assert_eq!(regions[0].ours, 1..2);
        assert_eq!(regions[1].index, 1);
        assert_eq!(regions[1].ours, 5..6);
    }

    #[test]
    fn test_large_scattered_edits_stay_clean() {
        let base: String = (0..10_000).map(|i| format!("line {i}\n")).collect();
        let ours: String = (0..10_000)
            .map(|i| {
                if i % 4 == 3 {
                    format!("ours {i}\n")
                } else {
                    format!("line {i}\n")
                }
            })
            .collect();
        let theirs = base.replacen("line 1\n", "theirs 1\n", 1);

        let diff = ThreeWayDiff::compute(&base, &ours, &theirs);
        assert!(diff.is_clean(), "unexpected conflicts: {:?}", diff.conflicts());
        assert_eq!(
            diff.hunks()
                .iter()
                .filter(|h| h.kind == HunkKind::TheirsOnly)
                .count(),
            1
        );
        assert_eq!(
            diff.hunks()
                .iter()
                .filter(|h| h.kind == HunkKind::OursOnly)
                .count(),
            2_500
        );
    }

    #[test]
    fn test_hunks_cover_every_line() {
        let base = "a\nb\nc\nd\ne\n";
        let ours = "a\nx\nc\ne\nf\n";
        let theirs = "q\na\nb\nc\nd\ne\n";
        let diff = ThreeWayDiff::compute(base, ours, theirs);
        let mut next = (0, 0, 0);
        for h in diff.hunks() {
            assert_eq!((h.base.start, h.ours.start, h.theirs.start), next);
            next = (h.base.end, h.ours.end, h.theirs.end);
        }
        assert_eq!(next, (5, 5, 6));
    }
}
