//! The file triple Git hands to a merge driver, and loading it as text.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{ContentError, CoreError, ResolveError};

/// Default width of conflict markers (Git's `%L`).
pub const DEFAULT_MARKER_SIZE: usize = 7;

/// Labels written after `<<<<<<<`, `|||||||` and `>>>>>>>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideLabels {
    pub base: String,
    pub ours: String,
    pub theirs: String,
}

impl Default for SideLabels {
    fn default() -> Self {
        Self {
            base: "base".into(),
            ours: "ours".into(),
            theirs: "theirs".into(),
        }
    }
}

/// One merge-driver invocation for a single conflicted file.
#[derive(Debug, Clone)]
pub struct MergeInvocation {
    /// Common ancestor (`%O`).
    pub base: PathBuf,
    /// Current branch version (`%A`); also the default output.
    pub ours: PathBuf,
    /// Incoming branch version (`%B`).
    pub theirs: PathBuf,
    /// Where the merged result goes.
    pub output: PathBuf,
    /// Repository path of the file being merged (`%P`), for prompts and logs.
    pub path_name: Option<String>,
    pub marker_size: usize,
    pub labels: SideLabels,
}

impl MergeInvocation {
    /// Invocation writing the result back to `ours`, as Git expects.
    pub fn new(base: impl Into<PathBuf>, ours: impl Into<PathBuf>, theirs: impl Into<PathBuf>) -> Self {
        let ours = ours.into();
        Self {
            base: base.into(),
            output: ours.clone(),
            ours,
            theirs: theirs.into(),
            path_name: None,
            marker_size: DEFAULT_MARKER_SIZE,
            labels: SideLabels::default(),
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_path_name(mut self, name: impl Into<String>) -> Self {
        self.path_name = Some(name.into());
        self
    }

    pub fn with_marker_size(mut self, size: usize) -> Self {
        self.marker_size = size;
        self
    }

    pub fn with_labels(mut self, labels: SideLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Name shown to the model and in logs.
    pub fn display_name(&self) -> String {
        self.path_name
            .clone()
            .unwrap_or_else(|| self.ours.display().to_string())
    }

    /// Read and validate all three versions.
    pub fn read_inputs(&self) -> Result<MergeInputs, CoreError> {
        Ok(MergeInputs {
            base: read_text(&self.base)?,
            ours: read_text(&self.ours)?,
            theirs: read_text(&self.theirs)?,
        })
    }
}

/// Text content of the three versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInputs {
    pub base: String,
    pub ours: String,
    pub theirs: String,
}

impl MergeInputs {
    /// Line terminator the output should use: CRLF when `ours` has any.
    pub fn line_ending(&self) -> &'static str {
        if self.ours.contains("\r\n") {
            "\r\n"
        } else {
            "\n"
        }
    }
}

/// Read a file and reject anything that is not plain UTF-8 text.
fn read_text(path: &Path) -> Result<String, CoreError> {
    let bytes = std::fs::read(path).map_err(|source| ResolveError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    ensure_text(path, bytes).map_err(CoreError::from)
}

/// Validate raw bytes as mergeable text.
pub fn ensure_text(path: &Path, bytes: Vec<u8>) -> Result<String, ContentError> {
    if bytes.contains(&0) {
        debug!(path = %path.display(), "NUL byte found, treating as binary");
        return Err(ContentError::Binary {
            path: path.to_path_buf(),
        });
    }
    String::from_utf8(bytes).map_err(|_| ContentError::NotUtf8 {
        path: path.to_path_buf(),
    })
}
