//! Finds the tiles the tool produced for an image.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::task::ImageTask;
use crate::Result;

/// Extension of produced tiles.
pub const TILE_EXTENSION: &str = "png";

/// Where the tool leaves tiles under an output root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLayout {
    /// `<output_root>/<stem>/<stem>_tiles/`
    #[default]
    Nested,
    /// Tiles directly in `<output_root>/`.
    Flat,
}

impl OutputLayout {
    pub fn tile_dir(&self, output_root: &Path, stem: &str) -> PathBuf {
        match self {
            OutputLayout::Nested => output_root.join(stem).join(format!("{}_tiles", stem)),
            OutputLayout::Flat => output_root.to_path_buf(),
        }
    }
}

/// Expected tile directory for `task` under `layout`.
pub fn expected_dir(layout: OutputLayout, task: &ImageTask) -> PathBuf {
    layout.tile_dir(task.output_root(), &task.source_stem())
}

/// Result of looking for tiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// At least one tile, sorted by path.
    Tiles { dir: PathBuf, tiles: Vec<PathBuf> },
    /// The directory is absent or holds no tiles.
    NoTiles { dir: PathBuf },
}

impl Located {
    pub fn tile_count(&self) -> usize {
        match self {
            Located::Tiles { tiles, .. } => tiles.len(),
            Located::NoTiles { .. } => 0,
        }
    }
}

/// Look in `dir` for tile files. A missing directory is `NoTiles`, not an error.
pub fn locate(dir: &Path) -> Result<Located> {
    if !dir.is_dir() {
        return Ok(Located::NoTiles {
            dir: dir.to_path_buf(),
        });
    }

    let mut tiles = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_tile = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(TILE_EXTENSION))
                .unwrap_or(false);
        if is_tile {
            tiles.push(path);
        }
    }
    tiles.sort();

    if tiles.is_empty() {
        Ok(Located::NoTiles {
            dir: dir.to_path_buf(),
        })
    } else {
        Ok(Located::Tiles {
            dir: dir.to_path_buf(),
            tiles,
        })
    }
}
