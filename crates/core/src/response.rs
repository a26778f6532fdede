//! Interpreting a backend reply as replacement text for a region.
//!
//! The expected reply is one fenced code block holding the merged lines,
//! optionally followed by an explanation, or a line of the form
//! `UNRESOLVABLE: <reason>`.

use std::sync::OnceLock;

use regex_lite::Regex;
use tracing::debug;

use crate::conflict::has_conflict_markers;
use crate::errors::BackendError;

fn opening_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*(`{3,})[^`\n]*$").expect("valid regex"))
}

fn unresolvable_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?mi)^\s*UNRESOLVABLE:\s*(.*)$").expect("valid regex"))
}

/// A parsed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// Merged lines for the region.
    pub code: String,
    /// Free text after the code block, if any.
    pub explanation: Option<String>,
}

/// Extract the replacement text from `reply`.
///
/// The code is everything between the first opening fence and the last
/// closing fence of the same length, so fences nested inside the code
/// survive. An `UNRESOLVABLE:` line anywhere outside the code block wins
/// over the block. Replies without a code block, or whose code still
/// carries conflict markers, are rejected.
pub fn parse_reply(reply: &str, marker_size: usize) -> Result<ParsedReply, BackendError> {
    let Some(open) = opening_fence().captures(reply) else {
        if let Some(reason) = declined_reason(reply) {
            return Err(BackendError::Declined(reason));
        }
        return Err(BackendError::Malformed("reply contains no fenced code block".into()));
    };

    let fence = open.get(1).map(|m| m.as_str()).unwrap_or("```");
    let (open_start, open_end) = open
        .get(0)
        .map(|m| (m.start(), m.end()))
        .unwrap_or((0, 0));
    // Skip the newline ending the opening fence line.
    let body_start = (open_end + 1).min(reply.len());
    let body = &reply[body_start..];

    let mut close = None;
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if line.trim() == fence {
            close = Some((offset, offset + line.len()));
        }
        offset += line.len();
    }

    let before = &reply[..open_start];
    let after = close.map(|(_, rest_start)| &body[rest_start..]).unwrap_or("");
    if let Some(reason) = declined_reason(before).or_else(|| declined_reason(after)) {
        return Err(BackendError::Declined(reason));
    }

    let Some((code_end, rest_start)) = close else {
        return Err(BackendError::Malformed("code block is not closed".into()));
    };

    let code = body[..code_end].to_string();
    if has_conflict_markers(&code, marker_size) {
        return Err(BackendError::Malformed(
            "reply still contains conflict markers".into(),
        ));
    }

    let explanation = body[rest_start..].trim();
    let explanation = (!explanation.is_empty()).then(|| explanation.to_string());
    if let Some(ref text) = explanation {
        debug!(explanation = %text, "backend explanation");
    }

    Ok(ParsedReply { code, explanation })
}

/// Reason given on an `UNRESOLVABLE:` line in `text`, if there is one.
fn declined_reason(text: &str) -> Option<String> {
    let caps = unresolvable_line().captures(text)?;
    let reason = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
    Some(if reason.is_empty() {
        "no reason given".to_string()
    } else {
        reason.to_string()
    })
}
