//! Per-image units of work.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Directory next to the source image holding every task's output root.
pub const OUTPUT_DIR_NAME: &str = "output";

/// Unique identifier for a tiling run, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters, for log lines.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One image to tile. Fields are private so a task cannot change after
/// the resolver builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTask {
    source: PathBuf,
    logical_name: String,
    output_root: PathBuf,
}

impl ImageTask {
    /// Build a task whose output root is `<source parent>/output/<logical name>`.
    ///
    /// Logical names are unique within a run, so two images in the same
    /// directory never share an output root.
    pub fn new(source: impl Into<PathBuf>, logical_name: impl Into<String>) -> Self {
        let source = source.into();
        let logical_name = logical_name.into();
        let output_root = source
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(OUTPUT_DIR_NAME)
            .join(&logical_name);
        Self {
            source,
            logical_name,
            output_root,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Name used to namespace this image's tiles in the archive.
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// File stem of the source; the tool names its output after this.
    pub fn source_stem(&self) -> String {
        file_stem(&self.source)
    }
}

/// Strip directories and the last extension from a display name or path.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
