//! Git-style conflict markers: rendering unresolved regions and scanning
//! text for leftover marker blocks.

use crate::input::SideLabels;

/// Location of one marker block inside a text. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictMarker {
    /// Line of the `<<<<<<<` marker.
    pub start_line: usize,
    /// Line of the `|||||||` marker, for diff3-style blocks.
    pub base_line: Option<usize>,
    /// Line of the `=======` separator.
    pub separator_line: usize,
    /// Line of the `>>>>>>>` marker.
    pub end_line: usize,
}

/// Renders conflict blocks with a fixed marker width.
#[derive(Debug, Clone)]
pub struct MarkerStyle<'a> {
    pub size: usize,
    pub labels: &'a SideLabels,
    /// Emit the `|||||||` base section.
    pub diff3: bool,
    pub eol: &'a str,
}

impl MarkerStyle<'_> {
    /// Append one conflict block to `out`.
    pub fn render(&self, out: &mut String, base: &str, ours: &str, theirs: &str) {
        self.marker_line(out, '<', &self.labels.ours);
        self.section(out, ours);
        if self.diff3 {
            self.marker_line(out, '|', &self.labels.base);
            self.section(out, base);
        }
        self.marker_line(out, '=', "");
        self.section(out, theirs);
        self.marker_line(out, '>', &self.labels.theirs);
    }

    fn marker_line(&self, out: &mut String, ch: char, label: &str) {
        out.extend(std::iter::repeat(ch).take(self.size));
        if !label.is_empty() {
            out.push(' ');
            out.push_str(label);
        }
        out.push_str(self.eol);
    }

    fn section(&self, out: &mut String, text: &str) {
        out.push_str(text);
        if !text.is_empty() && !text.ends_with('\n') {
            out.push_str(self.eol);
        }
    }
}

/// `true` if `line` is a marker of `ch` repeated exactly `size` times,
/// optionally followed by a space and a label.
fn is_marker(line: &str, ch: char, size: usize) -> bool {
    let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
    let run = line.chars().take_while(|&c| c == ch).count();
    if run != size {
        return false;
    }
    let rest = &line[run * ch.len_utf8()..];
    rest.is_empty() || rest.starts_with(' ')
}

/// Find every complete marker block in `text`.
pub fn scan_markers(text: &str, size: usize) -> Vec<ConflictMarker> {
    let mut found = Vec::new();
    let mut start = None;
    let mut base_line = None;
    let mut separator = None;

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        if is_marker(line, '<', size) {
            start = Some(lineno);
            base_line = None;
            separator = None;
        } else if start.is_some() && separator.is_none() && is_marker(line, '|', size) {
            base_line = Some(lineno);
        } else if start.is_some() && is_marker(line, '=', size) {
            separator = Some(lineno);
        } else if is_marker(line, '>', size) {
            if let (Some(start_line), Some(separator_line)) = (start, separator) {
                found.push(ConflictMarker {
                    start_line,
                    base_line,
                    separator_line,
                    end_line: lineno,
                });
            }
            start = None;
            base_line = None;
            separator = None;
        }
    }
    found
}

/// `true` if the text still contains a start or end marker line.
pub fn has_conflict_markers(text: &str, size: usize) -> bool {
    text.lines()
        .any(|line| is_marker(line, '<', size) || is_marker(line, '>', size))
}
