//! Terminal styling for driver and subcommand output.
//!
//! The merge driver only writes to stderr (Git relays it to the user), so
//! its styles check stderr for color support. `init` and `validate`
//! report on stdout.

use console::Style;

/// `error: <msg>` in red, for stderr.
pub fn error(msg: &str) -> String {
    let style = Style::new().for_stderr().red().bold();
    format!("{} {}", style.apply_to("error:"), msg)
}

/// A per-file driver notice, `<file>: <msg>`, with the file name in yellow.
pub fn notice(file: &str, msg: &str) -> String {
    let style = Style::new().for_stderr().yellow();
    format!("{}: {}", style.apply_to(file), msg)
}

/// A validation check line: `[OK]` in green or `[FAIL]` in red.
pub fn check(ok: bool, msg: &str) -> String {
    let tag = if ok {
        Style::new().green().apply_to("[OK]")
    } else {
        Style::new().red().apply_to("[FAIL]")
    };
    format!("  {} {}", tag, msg)
}

/// Credential state of one backend for the `validate` summary.
pub fn credential(api_key_env: Option<&str>, resolved: bool) -> String {
    match (api_key_env, resolved) {
        (None, _) => Style::new().dim().apply_to("no auth").to_string(),
        (Some(var), true) => format!("{} set", var),
        (Some(var), false) => Style::new().red().apply_to(format!("{} NOT SET", var)).to_string(),
    }
}

pub fn section(title: &str) -> String {
    Style::new().bold().apply_to(title).to_string()
}

pub fn success(msg: &str) -> String {
    format!("{} {}", Style::new().green().apply_to("✓"), msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_without_colors() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
        assert_eq!(error("no backends"), "error: no backends");
        assert_eq!(notice("src/a.py", "output left unchanged"), "src/a.py: output left unchanged");
        assert_eq!(check(true, "TOML structure is valid"), "  [OK] TOML structure is valid");
        assert_eq!(check(false, "missing key"), "  [FAIL] missing key");
        assert_eq!(section("Backends (in order):"), "Backends (in order):");
        assert_eq!(success("written"), "✓ written");
    }

    #[test]
    fn test_credential_states() {
        console::set_colors_enabled(false);
        assert_eq!(credential(None, false), "no auth");
        assert_eq!(credential(Some("OPENAI_API_KEY"), true), "OPENAI_API_KEY set");
        assert_eq!(credential(Some("OPENAI_API_KEY"), false), "OPENAI_API_KEY NOT SET");
    }
}
