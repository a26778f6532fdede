//! Atomic file replacement.
//!
//! Content is written to a temporary file in the destination's directory,
//! flushed, and renamed over the destination. Readers see either the old
//! file or the complete new one. A temp file that is never committed is
//! removed when dropped.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::ResolveError;

/// Replace `path` with `contents` atomically.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), ResolveError> {
    write_atomic_with(path, contents, |tmp, dest| {
        tmp.persist(dest).map(|_| ()).map_err(|e| e.error)
    })
}

/// Like [`write_atomic`], with the final rename supplied by the caller.
fn write_atomic_with<F>(path: &Path, contents: &str, commit: F) -> Result<(), ResolveError>
where
    F: FnOnce(NamedTempFile, &Path) -> io::Result<()>,
{
    let failed = |source: io::Error| ResolveError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(failed)?;
    tmp.write_all(contents.as_bytes()).map_err(failed)?;
    tmp.as_file().sync_all().map_err(failed)?;

    // Keep the mode of the file being replaced (e.g. an executable script).
    if let Ok(meta) = std::fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(failed)?;
    }

    debug!(tmp = %tmp.path().display(), dest = %path.display(), "committing atomic write");
    commit(tmp, path).map_err(failed)
}
