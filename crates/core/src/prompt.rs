//! Prompt construction for a single conflict region.
//!
//! A prompt carries the three versions of the region, a window of
//! unchanged `ours` lines around it, and optionally unified diffs of each
//! side against the base. Its size is bounded by
//! [`PromptConfig::max_prompt_bytes`]: diffs go first, then the context
//! window is halved until it fits or reaches zero.

use std::path::Path;

use tracing::debug;

use crate::config::PromptConfig;
use crate::conflict::{ConflictRegion, Side, ThreeWayDiff};

const SYSTEM_PROMPT: &str = "\
You are an expert software engineer resolving a merge conflict in a Git repository.

You receive one conflicting region of a file in three versions: BASE (the common \
ancestor), OURS (the current branch) and THEIRS (the incoming branch), plus some \
unchanged lines around it for orientation. Write the region as it should read after \
the merge, applying the changes of both OURS and THEIRS on top of BASE.

Reply with the merged lines of the region only, without the surrounding context \
lines, inside a single fenced code block. If the two changes cannot be reconciled, \
reply with a single line `UNRESOLVABLE: <reason>` instead. A short explanation may \
follow the code block.";

/// Text sent to a completion backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Size in bytes of the system and user text together.
    pub fn len(&self) -> usize {
        self.system.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds bounded prompts for the regions of one file.
#[derive(Debug, Clone)]
pub struct PromptBuilder<'a> {
    config: &'a PromptConfig,
    file_name: Option<&'a str>,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(config: &'a PromptConfig, file_name: Option<&'a str>) -> Self {
        Self { config, file_name }
    }

    /// Build the prompt for `region`, or `None` if even the bare region
    /// does not fit the byte budget.
    pub fn build(&self, diff: &ThreeWayDiff<'_>, region: &ConflictRegion, total: usize) -> Option<Prompt> {
        let mut context = self.config.context_lines;
        let mut with_diffs = self.config.include_diffs;

        loop {
            let prompt = Prompt {
                system: SYSTEM_PROMPT.to_string(),
                user: self.render(diff, region, total, context, with_diffs),
            };
            if prompt.len() <= self.config.max_prompt_bytes {
                debug!(
                    region = region.index,
                    bytes = prompt.len(),
                    context,
                    with_diffs,
                    "prompt built"
                );
                return Some(prompt);
            }
            if with_diffs {
                with_diffs = false;
            } else if context > 0 {
                context /= 2;
            } else {
                debug!(
                    region = region.index,
                    bytes = prompt.len(),
                    budget = self.config.max_prompt_bytes,
                    "region does not fit prompt budget"
                );
                return None;
            }
        }
    }

    fn render(
        &self,
        diff: &ThreeWayDiff<'_>,
        region: &ConflictRegion,
        total: usize,
        context: usize,
        with_diffs: bool,
    ) -> String {
        let lang = self
            .file_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .unwrap_or("");
        let ours_len = diff.lines(Side::Ours).len();
        let before = region.ours.start.saturating_sub(context)..region.ours.start;
        let after = region.ours.end..(region.ours.end + context).min(ours_len);

        let base = diff.text(Side::Base, region.base.clone());
        let ours = diff.text(Side::Ours, region.ours.clone());
        let theirs = diff.text(Side::Theirs, region.theirs.clone());

        let mut user = String::new();
        if let Some(name) = self.file_name {
            user.push_str(&format!("File: {name}\n"));
        }
        user.push_str(&format!(
            "Conflict {} of {}: BASE {}, OURS {}, THEIRS {}.\n",
            region.index + 1,
            total,
            describe_lines(&region.base),
            describe_lines(&region.ours),
            describe_lines(&region.theirs),
        ));

        if !before.is_empty() {
            push_block(&mut user, "Context before the region (unchanged)", lang, &diff.text(Side::Ours, before));
        }
        push_block(&mut user, "BASE", lang, &base);
        push_block(&mut user, "OURS", lang, &ours);
        push_block(&mut user, "THEIRS", lang, &theirs);
        if !after.is_empty() {
            push_block(&mut user, "Context after the region (unchanged)", lang, &diff.text(Side::Ours, after));
        }
        if with_diffs {
            push_block(&mut user, "Diff BASE -> OURS", "diff", &diffy::create_patch(&base, &ours).to_string());
            push_block(&mut user, "Diff BASE -> THEIRS", "diff", &diffy::create_patch(&base, &theirs).to_string());
        }
        user
    }
}

/// Human-readable 1-based line span.
fn describe_lines(range: &std::ops::Range<usize>) -> String {
    if range.is_empty() {
        format!("no lines (insertion point before line {})", range.start + 1)
    } else if range.len() == 1 {
        format!("line {}", range.start + 1)
    } else {
        format!("lines {}-{}", range.start + 1, range.end)
    }
}

/// Append a titled fenced block, picking a fence longer than any backtick
/// run inside `body`.
fn push_block(out: &mut String, title: &str, lang: &str, body: &str) {
    let fence = "`".repeat(longest_backtick_run(body).max(2) + 1);
    out.push('\n');
    out.push_str(title);
    out.push_str(":\n");
    out.push_str(&fence);
    out.push_str(lang);
    out.push('\n');
    out.push_str(body);
    if !body.is_empty() && !body.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&fence);
    out.push('\n');
}

fn longest_backtick_run(text: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    for c in text.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "1\n2\n3\n4\n5\nold\n7\n8\n9\n10\n11\n";
    const OURS: &str = "1\n2\n3\n4\n5\nmine\n7\n8\n9\n10\n11\n";
    const THEIRS: &str = "1\n2\n3\n4\n5\nyours\n7\n8\n9\n10\n11\n";

    fn config(context_lines: usize, max_prompt_bytes: usize, include_diffs: bool) -> PromptConfig {
        PromptConfig {
            context_lines,
            max_prompt_bytes,
            include_diffs,
        }
    }

    #[test]
    fn test_prompt_contains_all_versions_and_context() {
        let diff = ThreeWayDiff::compute(BASE, OURS, THEIRS);
        let region = &diff.conflicts()[0];
        let cfg = config(2, 48_000, true);
        let prompt = PromptBuilder::new(&cfg, Some("src/app.py"))
            .build(&diff, region, 1)
            .unwrap();

        assert!(prompt.system.contains("UNRESOLVABLE"));
        assert!(prompt.user.starts_with("File: src/app.py\n"));
        assert!(prompt.user.contains("Conflict 1 of 1: BASE line 6, OURS line 6, THEIRS line 6."));
        assert!(prompt.user.contains("BASE:\n```py\nold\n```\n"));
        assert!(prompt.user.contains("OURS:\n```py\nmine\n```\n"));
        assert!(prompt.user.contains("THEIRS:\n```py\nyours\n```\n"));
        assert!(prompt.user.contains("Context before the region (unchanged):\n```py\n4\n5\n```\n"));
        assert!(prompt.user.contains("Context after the region (unchanged):\n```py\n7\n8\n```\n"));
        assert!(prompt.user.contains("-old\n+mine\n"));
        // Lines outside the window never reach the backend.
        assert!(!prompt.user.contains("\n3\n"));
    }

    #[test]
    fn test_budget_drops_diffs_then_context() {
        let diff = ThreeWayDiff::compute(BASE, OURS, THEIRS);
        let region = &diff.conflicts()[0];

        let roomy = PromptBuilder::new(&config(5, 48_000, true), None)
            .build(&diff, region, 1)
            .unwrap();
        let without_diffs = PromptBuilder::new(&config(5, 48_000, false), None)
            .build(&diff, region, 1)
            .unwrap();
        assert!(without_diffs.len() < roomy.len());

        let cfg = config(5, without_diffs.len(), true);
        let fitted = PromptBuilder::new(&cfg, None).build(&diff, region, 1).unwrap();
        assert_eq!(fitted, without_diffs);

        let cfg = config(5, without_diffs.len() - 1, true);
        let shrunk = PromptBuilder::new(&cfg, None).build(&diff, region, 1).unwrap();
        assert!(shrunk.len() < without_diffs.len());
        assert!(!shrunk.user.contains("Diff BASE"));
    }

    #[test]
    fn test_region_over_budget_is_rejected() {
        let diff = ThreeWayDiff::compute(BASE, OURS, THEIRS);
        let region = &diff.conflicts()[0];
        let cfg = config(10, SYSTEM_PROMPT.len() + 10, true);
        assert!(PromptBuilder::new(&cfg, None).build(&diff, region, 1).is_none());
    }

    #[test]
    fn test_fence_outgrows_backticks_in_body() {
        let mut out = String::new();
        push_block(&mut out, "OURS", "md", "```rust\nfn f() {}\n```\n");
        assert!(out.starts_with("\nOURS:\n````md\n"));
        assert!(out.ends_with("```\n````\n"));
    }

    #[test]
    fn test_describe_lines() {
        assert_eq!(describe_lines(&(3..3)), "no lines (insertion point before line 4)");
        assert_eq!(describe_lines(&(0..1)), "line 1");
        assert_eq!(describe_lines(&(1..4)), "lines 2-4");
    }
}
