//! Line-level two-way diff.
//!
//! Uses `diffy` to diff two texts and reads the matched line pairs back out
//! of the patch: with a context window as large as the files, the patch
//! holds a single hunk whose `Context` lines are exactly the lines common
//! to both sides. Lines are compared verbatim, terminators included.

use diffy::{DiffOptions, Line};

/// Split text into lines, each keeping its `\n` (and `\r\n`) terminator.
///
/// This is the same line split `diffy` performs, so indices line up with
/// its hunks.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Matched `(a_index, b_index)` line pairs between `a` and `b`, strictly
/// increasing in both indices.
pub fn matching_lines(a: &str, b: &str) -> Vec<(usize, usize)> {
    let a_len = split_lines(a).len();
    let b_len = split_lines(b).len();

    let patch = DiffOptions::new()
        .set_context_len(a_len.max(b_len))
        .create_patch(a, b);

    let mut matches = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    for hunk in patch.hunks() {
        // Lines before the hunk are unchanged on both sides.
        let range = hunk.old_range();
        let start = if range.is_empty() {
            range.start()
        } else {
            range.start() - 1
        };
        while i < start {
            matches.push((i, j));
            i += 1;
            j += 1;
        }
        for line in hunk.lines() {
            match line {
                Line::Context(_) => {
                    matches.push((i, j));
                    i += 1;
                    j += 1;
                }
                Line::Delete(_) => i += 1,
                Line::Insert(_) => j += 1,
            }
        }
    }
    while i < a_len && j < b_len {
        matches.push((i, j));
        i += 1;
        j += 1;
    }
    matches
}
